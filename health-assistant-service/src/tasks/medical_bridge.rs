use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::utils::{get_state, put_state};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::models::AnswerSource;

/// Synchronous POST to the external medical-reasoning endpoint. A failed
/// call yields a diagnostic answer; the node succeeds either way so the
/// branch still reaches the voice invocation and END.
pub struct MedicalBridgeTask {
    client: reqwest::Client,
    config: Arc<AppConfig>,
}

impl MedicalBridgeTask {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Task for MedicalBridgeTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        let answer = match reason(&self.client, &self.config, &state.input).await {
            Ok(text) => {
                info!(chars = text.len(), "medical reasoning answer received");
                text
            }
            Err(e) => {
                warn!(error = %e, "medical bridge failed");
                state.error = Some(e.to_string());
                format!("Medical reasoning is unavailable right now: {e}")
            }
        };

        context.emit("medical_answer", json!({ "answer": answer }));
        state.final_answer = Some(answer);
        state.source = Some(AnswerSource::Medical);

        put_state(&context, &state).await;
        Ok(TaskResult::new(None, NextAction::Continue))
    }
}

async fn reason(
    client: &reqwest::Client,
    config: &AppConfig,
    prompt: &str,
) -> Result<String, AgentError> {
    let response = client
        .post(&config.medical_endpoint_url)
        .timeout(Duration::from_secs(config.bridge_timeout_secs))
        .json(&json!({ "prompt": prompt }))
        .send()
        .await
        .map_err(|e| AgentError::MedicalBridgeFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(AgentError::MedicalBridgeFailed(format!(
            "endpoint returned {}",
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| AgentError::MedicalBridgeFailed(e.to_string()))
}
