use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::utils::{get_state, put_state};
use crate::llm::LlmGateway;
use crate::models::AnswerSource;

const POSTPROCESS_PREAMBLE: &str = "You rewrite an assistant message for delivery to the user. \
Keep every fact intact. Return only the rewritten message.";

/// Rewrites `final_answer` in place, conditioned on where it came from:
/// first-person voice for profile/memory answers, concise third-person
/// factual voice for web/medical answers. On LLM failure the original
/// message is kept.
pub struct PostprocessTask {
    llm: Arc<LlmGateway>,
}

impl PostprocessTask {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Task for PostprocessTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        let Some(answer) = state.final_answer.clone().filter(|a| !a.is_empty()) else {
            return Ok(TaskResult::new(None, NextAction::Continue));
        };

        let style = match state.source {
            Some(AnswerSource::Patient) | Some(AnswerSource::Memory) => {
                "Rewrite in a warm first person, as the user's own assistant speaking to them."
            }
            Some(AnswerSource::Web) | Some(AnswerSource::Medical) => {
                "Rewrite as concise, factual third-person prose."
            }
            _ => return Ok(TaskResult::new(None, NextAction::Continue)),
        };

        match self
            .llm
            .complete(
                POSTPROCESS_PREAMBLE,
                &format!("{style}\n\nMessage:\n{answer}"),
                0.3,
            )
            .await
        {
            Ok(rewritten) if !rewritten.is_empty() => {
                state.final_answer = Some(rewritten);
                put_state(&context, &state).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "postprocess failed, keeping original answer"),
        }

        Ok(TaskResult::new(None, NextAction::Continue))
    }
}
