use agent_flow::{Context, FlowError};
use tracing::debug;

use super::state_keys;
use crate::diff::format_changes;
use crate::error::AgentError;
use crate::llm::LlmGateway;
use crate::models::{AgentState, Change};

/// Fetch the request state from the graph context.
pub async fn get_state(context: &Context) -> agent_flow::Result<AgentState> {
    context
        .get(state_keys::STATE)
        .await
        .ok_or_else(|| FlowError::ContextError("agent state not found in context".to_string()))
}

/// Write the request state back to the graph context.
pub async fn put_state(context: &Context, state: &AgentState) {
    context.set(state_keys::STATE, state).await;
}

const SUMMARIZER_PREAMBLE: &str = "You summarize patient profile changes for an update log. \
Write a concise natural-language summary in a neutral first person \
(\"Updated sleep hours from 7 to 9\"). Each change contributes at most 20 words. \
Return only the summary text.";

/// Render a change list into a one-line human-readable summary.
///
/// An empty change list yields an empty string without an LLM call. Callers
/// fail open on error: no update entry is appended, the mutation stands.
pub async fn summarize_changes(
    llm: &LlmGateway,
    changes: &[Change],
) -> Result<String, AgentError> {
    if changes.is_empty() {
        return Ok(String::new());
    }

    let summary = llm
        .complete(SUMMARIZER_PREAMBLE, &format_changes(changes), 0.3)
        .await?;
    Ok(summary.trim().to_string())
}

/// Single-shot boolean judgment. Any output that is not an affirmative token
/// counts as "no", so callers fail closed on fuzzy completions too.
pub async fn yes_no(llm: &LlmGateway, system: &str, question: &str) -> Result<bool, AgentError> {
    let answer = llm.complete(system, question, 0.0).await?;
    let affirmative = answer.trim().to_lowercase().starts_with("yes");
    debug!(answer = %answer.trim(), affirmative, "boolean judgment");
    Ok(affirmative)
}
