use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::state_keys;
use super::utils::{get_state, put_state, yes_no};
use crate::embedding::EmbeddingIndex;
use crate::llm::LlmGateway;
use crate::models::{AnswerSource, MemoryEntry};

/// Top-K used by the precheck flow (the generic search operation uses 5).
const PRECHECK_TOP_K: usize = 3;

const PRECHECK_PREAMBLE: &str =
    "You answer strictly with yes or no for a healthcare assistant's memory precheck.";

/// TEXT-route entry: decides whether the utterance is about the profile,
/// answerable from stored memories, or worth remembering.
///
/// All three LLM judgments fail closed: on error the utterance is treated as
/// not profile-related, memories as not relevant, and nothing is stored.
pub struct MemoryPrecheckTask {
    llm: Arc<LlmGateway>,
    index: Arc<EmbeddingIndex>,
}

impl MemoryPrecheckTask {
    pub fn new(llm: Arc<LlmGateway>, index: Arc<EmbeddingIndex>) -> Self {
        Self { llm, index }
    }
}

#[async_trait]
impl Task for MemoryPrecheckTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        // 1. Utterances about the profile get no memory treatment at all.
        let profile_question = format!(
            "Patient profile:\n{}\n\nUtterance:\n{}\n\nDoes the utterance reference any field or value in the patient profile? Answer yes or no.",
            Value::Object(state.patient_profile.clone()),
            state.input
        );
        let references_profile = yes_no(&self.llm, PRECHECK_PREAMBLE, &profile_question)
            .await
            .unwrap_or(false);
        if references_profile {
            info!("utterance references the profile, skipping memory work");
            put_state(&context, &state).await;
            return Ok(TaskResult::new(None, NextAction::End));
        }

        // 2. Recall the closest stored memories.
        let corpus: Vec<String> = state.memory.iter().map(|m| m.text.clone()).collect();
        let recalled: Vec<MemoryEntry> = if corpus.is_empty() {
            Vec::new()
        } else {
            match self.index.top_k(&state.input, &corpus, PRECHECK_TOP_K).await {
                Ok(indices) => indices
                    .into_iter()
                    .filter_map(|i| state.memory.get(i).cloned())
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "memory search failed");
                    state.error = Some(e.to_string());
                    Vec::new()
                }
            }
        };

        // 3. If anything came back, ask whether it actually answers the user.
        if !recalled.is_empty() {
            let listing = recalled
                .iter()
                .map(|m| m.text.as_str())
                .collect::<Vec<_>>()
                .join("\n- ");
            let relevance_question = format!(
                "Utterance:\n{}\n\nStored memories:\n- {}\n\nAre any of these memories relevant to the utterance? Answer yes or no.",
                state.input, listing
            );
            let relevant = yes_no(&self.llm, PRECHECK_PREAMBLE, &relevance_question)
                .await
                .unwrap_or(false);

            if relevant {
                info!(recalled = recalled.len(), "answering from memory");
                context.emit(
                    "memory_recalled",
                    json!({ "memories": recalled.iter().map(|m| &m.text).collect::<Vec<_>>() }),
                );
                context.set(state_keys::RECALLED_MEMORIES, &recalled).await;
                state.final_answer = Some(format!(
                    "Here is what I remember that seems relevant:\n- {listing}"
                ));
                state.source = Some(AnswerSource::Memory);
                put_state(&context, &state).await;
                return Ok(TaskResult::new(None, NextAction::Continue));
            }
        }

        // 4. Nothing to answer with: store the utterance if it is worth keeping.
        let storage_question = format!(
            "Utterance:\n{}\n\nIs this utterance meaningful to store as a long-term memory? It is meaningful if it states a stable fact or preference about the user, or contains medical content. Answer yes or no.",
            state.input
        );
        let store = yes_no(&self.llm, PRECHECK_PREAMBLE, &storage_question)
            .await
            .unwrap_or(false);
        if store {
            info!("storing utterance in semantic memory");
            context.emit("memory_stored", json!({ "text": state.input }));
            state.memory.push(MemoryEntry::now(state.input.clone()));
        }

        put_state(&context, &state).await;
        Ok(TaskResult::new(None, NextAction::Continue))
    }
}
