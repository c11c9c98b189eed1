// Assessment Node
// Synthesizes the ethics assessment on the primary model and parses it.

use async_trait::async_trait;

use crate::graph::events::StepStatus;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{WorkflowStage, WorkflowState};
use crate::llm::ChatMessage;
use crate::models::assessment::EthicsAssessment;
use crate::tools::search::{SearchKind, SearchResult};

const ASSESSMENT_SYSTEM_PROMPT: &str = "You are a federal ethics compliance expert. \
Analyze the scenario using all available sources and provide a comprehensive assessment \
in clear markdown format.";

const ASSESSMENT_FORMAT: &str = "Provide a comprehensive ethics assessment with the following structure:

# Ethics Assessment

## Direct Answer
[Clear statement of whether ethics laws/regulations are violated and which specific ones]

## Severity Level
**[Minor/Moderate/Serious/No Violation]** - [Brief justification for severity level]

## Legal Foundation
[Specific federal statutes, regulations, and ethical standards that apply]

## Potential Penalties
[Criminal, civil, and administrative consequences with specifics]

## Immediate Actions Required
[Step-by-step corrective measures that should be taken immediately]

## Reporting Requirements
[Who to notify, deadlines, procedures, forms needed]

## Prevention Strategy
[Long-term compliance measures and best practices to avoid similar issues]

## Additional Context
[Any relevant precedents, guidance, or considerations based on user's role and agency]

Prioritize federal law accuracy, provide specific citations when possible, and tailor guidance to the user's context.";

pub struct AssessViolationNode;

impl AssessViolationNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AssessViolationNode {
    fn default() -> Self {
        Self::new()
    }
}

fn format_web_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results available.".to_string();
    }
    results
        .iter()
        .map(|r| format!("- {} ({}): {}", r.title, r.url, r.snippet.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_federal_context(state: &WorkflowState) -> String {
    if state.retrieved_chunks.is_empty() {
        return "No federal ethics passages were retrieved.".to_string();
    }
    state
        .retrieved_chunks
        .iter()
        .map(|chunk| format!("[{}]\n{}", chunk.source, chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_assessment_prompt(state: &WorkflowState) -> String {
    let results = &state.search_results;
    let plan = state
        .plan
        .as_deref()
        .map(|p| format!("RESEARCH PLAN:\n{}\n\n", p))
        .unwrap_or_default();

    format!(
        "USER CONTEXT: {context}\n\
         QUESTION: {question}\n\n\
         {plan}\
         FEDERAL ETHICS CONTEXT:\n{federal}\n\n\
         GENERAL ETHICS GUIDANCE:\n{general}\n\n\
         PENALTY INFORMATION:\n{penalties}\n\n\
         CURRENT GUIDANCE & PRECEDENTS:\n{guidance}\n\n\
         {format}",
        context = state.user_context,
        question = state.question,
        plan = plan,
        federal = format_federal_context(state),
        general = format_web_results(results.slot(SearchKind::General)),
        penalties = format_web_results(results.slot(SearchKind::Penalties)),
        guidance = format_web_results(results.slot(SearchKind::Guidance)),
        format = ASSESSMENT_FORMAT,
    )
}

#[async_trait]
impl Node for AssessViolationNode {
    fn id(&self) -> &'static str {
        "assess_violation"
    }

    fn name(&self) -> &'static str {
        "Ethics assessment"
    }

    fn stage(&self) -> WorkflowStage {
        WorkflowStage::Assessing
    }

    /// A narrative without a recognisable severity is requested again, up to
    /// the configured retry count. LLM failures have already been retried by
    /// the LLM service and fail the node.
    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let prompt = build_assessment_prompt(state);
        let attempts = ctx.services.assessment_retries + 1;

        for attempt in 1..=attempts {
            let messages = vec![
                ChatMessage::system(ASSESSMENT_SYSTEM_PROMPT),
                ChatMessage::user(prompt.clone()),
            ];
            let narrative = ctx
                .services
                .llm
                .chat_primary(messages)
                .await
                .map_err(|e| GraphError::service(self.id(), e))?;

            match EthicsAssessment::from_narrative(&narrative) {
                Ok(assessment) => {
                    tracing::info!(
                        "Assessment generated: severity {}, {} citations",
                        assessment.severity,
                        assessment.citations.len()
                    );
                    state.narrative = Some(narrative);
                    state.assessment = Some(assessment);
                    return Ok(NodeOutput::Continue(None));
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "Assessment attempt {}/{} unusable ({}), retrying",
                        attempt,
                        attempts,
                        e
                    );
                    ctx.events.step(
                        WorkflowStage::Assessing,
                        StepStatus::Degraded,
                        format!("Assessment unusable ({}), retrying", e),
                    );
                }
                Err(e) => {
                    return Err(GraphError::new(
                        self.id(),
                        format!("assessment unusable after {} attempts: {}", attempts, e),
                    ));
                }
            }
        }

        Err(GraphError::new(self.id(), "no assessment attempts were made"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ServiceError;
    use crate::graph::events::EventSink;
    use crate::graph::testing::{self, ScriptedLlm, GIFT_NARRATIVE};
    use crate::models::assessment::Severity;
    use crate::rag::RetrievedChunk;
    use std::sync::atomic::Ordering;

    async fn assess(llm: ScriptedLlm) -> (Result<NodeOutput, GraphError>, WorkflowState) {
        let services = testing::services(llm).await;
        let events = EventSink::disabled();
        let mut ctx = NodeContext {
            services: &services,
            events: &events,
        };
        let mut state = WorkflowState::new("Can I accept a $25 gift from a contractor?", None);
        let result = AssessViolationNode::new().execute(&mut state, &mut ctx).await;
        (result, state)
    }

    #[test]
    fn prompt_includes_every_source_section() {
        let mut state = WorkflowState::new("Can I accept a gift?", None);
        state.plan = Some("Check 5 CFR 2635".into());
        state.retrieved_chunks.push(RetrievedChunk {
            text: "Gifts of $20 or less".into(),
            source: "standards.pdf".into(),
            score: 0.9,
            document_id: None,
            chunk_index: None,
        });

        let prompt = build_assessment_prompt(&state);
        assert!(prompt.contains("RESEARCH PLAN:\nCheck 5 CFR 2635"));
        assert!(prompt.contains("[standards.pdf]\nGifts of $20 or less"));
        assert!(prompt.contains("PENALTY INFORMATION:\nNo results available."));
        assert!(prompt.contains("## Severity Level"));
    }

    #[tokio::test]
    async fn parses_assessment_from_narrative() {
        let (result, state) = assess(ScriptedLlm::default()).await;
        assert!(result.is_ok());
        let assessment = state.assessment.unwrap();
        assert_eq!(assessment.severity, Severity::Minor);
        assert!(!assessment.citations.is_empty());
        assert!(state.narrative.unwrap().starts_with("# Ethics Assessment"));
    }

    #[tokio::test]
    async fn retries_when_severity_is_missing() {
        let llm = ScriptedLlm {
            narratives: vec![Ok("## Direct Answer\nIt depends.".into()), Ok(GIFT_NARRATIVE.into())],
            ..Default::default()
        };
        let calls = llm.primary_calls.clone();
        let (result, state) = assess(llm).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(state.assessment.is_some());
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let llm = ScriptedLlm {
            narratives: vec![Ok("No structure at all.".into())],
            ..Default::default()
        };
        let calls = llm.primary_calls.clone();
        let (result, state) = assess(llm).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(state.assessment.is_none());
    }

    #[tokio::test]
    async fn llm_failure_fails_without_assessment() {
        let llm = ScriptedLlm {
            narratives: vec![Err(ServiceError::Status {
                service: "openai".into(),
                status: 400,
                body: "context length exceeded".into(),
            })],
            ..Default::default()
        };
        let (result, state) = assess(llm).await;
        assert_eq!(result.unwrap_err().node_id, "assess_violation");
        assert!(state.assessment.is_none());
        assert!(state.narrative.is_none());
    }
}
