use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::utils::{get_state, put_state};
use crate::voice::{VoiceBridge, VoiceUtterance};

/// Second voice invocation on the web/medical branches: streams the computed
/// answer with the `extra` tag and, unlike the detached tagger-time
/// invocation, completes before the branch reaches END.
pub struct VoiceStreamTask {
    voice: Arc<VoiceBridge>,
}

impl VoiceStreamTask {
    pub fn new(voice: Arc<VoiceBridge>) -> Self {
        Self { voice }
    }
}

#[async_trait]
impl Task for VoiceStreamTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        let text = state.final_answer.clone().unwrap_or_default();
        if !text.is_empty() {
            let utterance = VoiceUtterance {
                text,
                patient_profile: None,
                tag: "extra".to_string(),
            };
            if let Err(e) = self.voice.stream(utterance, context.event_sink()).await {
                warn!(error = %e, "extra voice invocation failed");
                state.error = Some(e.to_string());
                put_state(&context, &state).await;
            }
        }

        Ok(TaskResult::new(None, NextAction::End))
    }
}
