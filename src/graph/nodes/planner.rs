// Planner Node
// Turns the question and caller profile into a research plan on the
// lightweight planning model, and picks the retrieval strategy.

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{WorkflowStage, WorkflowState};
use crate::llm::ChatMessage;
use crate::rag::RetrievalStrategy;

const PLANNING_SYSTEM_PROMPT: &str = "You are a federal ethics research planning agent. \
Analyze the user's question to develop a comprehensive search and analysis strategy.";

pub struct PlannerNode;

impl PlannerNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlannerNode {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_planning_prompt(state: &WorkflowState) -> String {
    format!(
        "USER QUESTION: {question}\n\
         USER CONTEXT: {context}\n\n\
         Create a structured research plan that includes:\n\
         1. **Key Ethics Areas**: What specific federal ethics laws/regulations to focus on\n\
         2. **Search Terms**: Targeted web search terms for current guidance\n\
         3. **Risk Factors**: Potential aggravating or mitigating circumstances\n\
         4. **Analysis Focus**: What aspects need the deepest investigation\n\n\
         Provide a concise but thorough research plan. End with a single line \
         `RETRIEVAL: <strategy>` choosing one of similarity, mmr, hybrid or rerank \
         for searching the federal ethics knowledge base.",
        question = state.question,
        context = state.user_context,
    )
}

/// Splits a trailing `RETRIEVAL: <strategy>` directive off the plan. The
/// last directive wins; an unknown strategy is ignored.
pub fn parse_plan(raw: &str) -> (String, Option<RetrievalStrategy>) {
    let mut strategy = None;
    let mut kept: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim().trim_matches(|c: char| c == '*' || c == '`').trim();
        let directive = trimmed
            .get(..10)
            .filter(|prefix| prefix.eq_ignore_ascii_case("retrieval:"))
            .map(|_| trimmed[10..].trim());

        match directive {
            Some(value) => match value.trim_matches('`').parse::<RetrievalStrategy>() {
                Ok(parsed) => strategy = Some(parsed),
                Err(e) => tracing::warn!("Ignoring plan directive: {}", e),
            },
            None => kept.push(line),
        }
    }

    (kept.join("\n").trim().to_string(), strategy)
}

#[async_trait]
impl Node for PlannerNode {
    fn id(&self) -> &'static str {
        "create_plan"
    }

    fn name(&self) -> &'static str {
        "Research planning"
    }

    fn stage(&self) -> WorkflowStage {
        WorkflowStage::Planning
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let messages = vec![
            ChatMessage::system(PLANNING_SYSTEM_PROMPT),
            ChatMessage::user(build_planning_prompt(state)),
        ];

        let raw = ctx
            .services
            .llm
            .chat_planning(messages)
            .await
            .map_err(|e| GraphError::service(self.id(), e))?;

        let (plan, strategy) = parse_plan(&raw);
        state.retrieval_strategy = strategy.unwrap_or(ctx.services.default_strategy);
        state.plan = Some(plan).filter(|p| !p.is_empty());

        tracing::debug!(
            "Plan ready ({} chars), retrieval strategy {}",
            state.plan.as_ref().map(|p| p.len()).unwrap_or(0),
            state.retrieval_strategy
        );
        Ok(NodeOutput::Continue(None))
    }
}
