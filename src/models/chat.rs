use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::graph::state::{WorkflowState, WorkflowStage};
use crate::models::assessment::EthicsAssessment;
use crate::rag::RetrievedChunk;
use crate::tools::search::SearchResult;

pub const MAX_QUESTION_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    FederalEmployee,
    Contractor,
    SeniorExecutive,
    ProcurementOfficer,
    EthicsOfficial,
}

impl UserRole {
    pub fn label(&self) -> &'static str {
        match self {
            UserRole::FederalEmployee => "federal employee",
            UserRole::Contractor => "contractor",
            UserRole::SeniorExecutive => "senior executive",
            UserRole::ProcurementOfficer => "procurement officer",
            UserRole::EthicsOfficial => "ethics official",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityClearance {
    #[default]
    None,
    PublicTrust,
    Secret,
    TopSecret,
}

impl SecurityClearance {
    pub fn label(&self) -> &'static str {
        match self {
            SecurityClearance::None => "none",
            SecurityClearance::PublicTrust => "public trust",
            SecurityClearance::Secret => "secret",
            SecurityClearance::TopSecret => "top secret",
        }
    }
}

fn default_seniority() -> Option<String> {
    Some("mid_level".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default = "default_seniority")]
    pub seniority: Option<String>,
    #[serde(default)]
    pub clearance: SecurityClearance,
    #[serde(default)]
    pub grade_level: Option<String>,
}

impl Default for UserContext {
    fn default() -> Self {
        Self {
            role: UserRole::default(),
            agency: None,
            seniority: default_seniority(),
            clearance: SecurityClearance::default(),
            grade_level: None,
        }
    }
}

impl fmt::Display for UserContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role: {}", self.role.label())?;
        if let Some(agency) = self.agency.as_deref().filter(|a| !a.trim().is_empty()) {
            write!(f, "; Agency: {}", agency.trim())?;
        }
        if let Some(seniority) = self.seniority.as_deref().filter(|s| !s.trim().is_empty()) {
            write!(f, "; Seniority: {}", seniority.trim().replace('_', " "))?;
        }
        write!(f, "; Clearance: {}", self.clearance.label())?;
        if let Some(grade) = self.grade_level.as_deref().filter(|g| !g.trim().is_empty()) {
            write!(f, "; Grade: {}", grade.trim())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub user_context: Option<UserContext>,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>, user_context: Option<UserContext>) -> Self {
        Self {
            question: question.into(),
            user_context,
        }
    }

    /// Trims the question and rejects empty or oversized input.
    pub fn validate(mut self) -> Result<Self, ApiError> {
        let trimmed = self.question.trim();
        if trimmed.is_empty() {
            return Err(ApiError::BadRequest("question must not be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_QUESTION_CHARS {
            return Err(ApiError::BadRequest(format!(
                "question exceeds {} characters",
                MAX_QUESTION_CHARS
            )));
        }
        self.question = trimmed.to_string();
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebSource {
    pub search_type: &'static str,
    #[serde(flatten)]
    pub result: SearchResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sources {
    pub federal_law_chunks: usize,
    pub web_sources: usize,
    pub chunks: Vec<RetrievedChunk>,
    pub web: Vec<WebSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub question: String,
    pub response: String,
    pub assessment: Option<EthicsAssessment>,
    pub sources: Sources,
    pub search_plan: Option<String>,
    pub retrieval_strategy: String,
    pub stage: WorkflowStage,
    pub processing_time_seconds: f64,
    pub timings: BTreeMap<String, f64>,
}

impl ChatResponse {
    pub fn from_state(state: &WorkflowState, processing_time_seconds: f64) -> Self {
        let web: Vec<WebSource> = state
            .search_results
            .iter_tagged()
            .map(|(kind, result)| WebSource {
                search_type: kind.as_str(),
                result: result.clone(),
            })
            .collect();

        Self {
            question: state.question.clone(),
            response: state.narrative.clone().unwrap_or_default(),
            assessment: state.assessment.clone(),
            sources: Sources {
                federal_law_chunks: state.retrieved_chunks.len(),
                web_sources: web.len(),
                chunks: state.retrieved_chunks.clone(),
                web,
            },
            search_plan: state.plan.clone(),
            retrieval_strategy: state.retrieval_strategy.as_str().to_string(),
            stage: state.stage,
            processing_time_seconds,
            timings: state.timings.clone(),
        }
    }
}
