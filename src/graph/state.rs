// Workflow state
// Mutable record threaded through every node of one consultation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::assessment::EthicsAssessment;
use crate::models::chat::UserContext;
use crate::rag::{RetrievalStrategy, RetrievedChunk};
use crate::tools::search::{SearchKind, SearchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    CollectingContext,
    Planning,
    Retrieving,
    Searching,
    Combining,
    Assessing,
    Finalized,
    Failed,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::CollectingContext => "collecting_context",
            WorkflowStage::Planning => "planning",
            WorkflowStage::Retrieving => "retrieving",
            WorkflowStage::Searching => "searching",
            WorkflowStage::Combining => "combining",
            WorkflowStage::Assessing => "assessing",
            WorkflowStage::Finalized => "finalized",
            WorkflowStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStage::Finalized | WorkflowStage::Failed)
    }
}

/// One independent slot per search branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub general: Vec<SearchResult>,
    pub penalties: Vec<SearchResult>,
    pub guidance: Vec<SearchResult>,
}

impl SearchResults {
    pub fn slot(&self, kind: SearchKind) -> &[SearchResult] {
        match kind {
            SearchKind::General => &self.general,
            SearchKind::Penalties => &self.penalties,
            SearchKind::Guidance => &self.guidance,
        }
    }

    pub fn set(&mut self, kind: SearchKind, results: Vec<SearchResult>) {
        match kind {
            SearchKind::General => self.general = results,
            SearchKind::Penalties => self.penalties = results,
            SearchKind::Guidance => self.guidance = results,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty() && self.penalties.is_empty() && self.guidance.is_empty()
    }

    pub fn len(&self) -> usize {
        self.general.len() + self.penalties.len() + self.guidance.len()
    }

    /// Every hit tagged with its branch, in general / penalties / guidance order.
    pub fn iter_tagged(&self) -> impl Iterator<Item = (SearchKind, &SearchResult)> {
        SearchKind::ALL
            .into_iter()
            .flat_map(move |kind| self.slot(kind).iter().map(move |r| (kind, r)))
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub question: String,
    pub user_context: UserContext,
    pub plan: Option<String>,
    pub retrieval_strategy: RetrievalStrategy,
    pub retrieved_chunks: Vec<RetrievedChunk>,
    pub search_results: SearchResults,
    /// Combined view of the three slots, deduplicated by URL.
    pub web_results: Vec<SearchResult>,
    pub assessment: Option<EthicsAssessment>,
    pub narrative: Option<String>,
    pub timings: BTreeMap<String, f64>,
    pub stage: WorkflowStage,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>, user_context: Option<UserContext>) -> Self {
        Self {
            question: question.into(),
            user_context: user_context.unwrap_or_default(),
            plan: None,
            retrieval_strategy: RetrievalStrategy::default(),
            retrieved_chunks: Vec::new(),
            search_results: SearchResults::default(),
            web_results: Vec::new(),
            assessment: None,
            narrative: None,
            timings: BTreeMap::new(),
            stage: WorkflowStage::CollectingContext,
        }
    }

    pub fn record_timing(&mut self, step: &str, seconds: f64) {
        self.timings.insert(step.to_string(), seconds);
    }
}
