use rig::completion::Prompt;
use rig::prelude::*;
use rig::providers::openrouter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::AgentError;

/// Uniform completion interface over the two configured chat providers.
///
/// A single configuration flag selects between the cloud provider and a
/// self-hosted instance; callers see one `complete` call with identical
/// temperature semantics either way.
pub struct LlmGateway {
    config: Arc<AppConfig>,
    client: reqwest::Client,
}

/// Request body for the self-hosted `/api/generate` endpoint.
#[derive(Serialize)]
struct LocalGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: serde_json::Value,
}

/// Response body from the self-hosted `/api/generate` endpoint.
#[derive(Deserialize)]
struct LocalGenerateResponse {
    response: String,
}

impl LlmGateway {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Run a (system, user) pair through the selected provider and return
    /// the textual completion. Transport failure or an empty completion
    /// after the configured attempts yields `LlmUnavailable`; fallback
    /// policy is the caller's decision.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> Result<String, AgentError> {
        let attempts = self.config.llm_max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = if self.config.use_local_llm {
                self.complete_local(system, user, temperature).await
            } else {
                self.complete_cloud(system, user, temperature).await
            };

            match result {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(attempt, chars = text.len(), "LLM completion received");
                    return Ok(text.trim().to_string());
                }
                Ok(_) => last_error = "empty completion".to_string(),
                Err(e) => last_error = e.to_string(),
            }
            warn!(attempt, error = %last_error, "LLM completion attempt failed");
        }

        Err(AgentError::LlmUnavailable(last_error))
    }

    async fn complete_cloud(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let api_key = self
            .config
            .openrouter_api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
        let client = openrouter::Client::new(api_key);
        let agent = client
            .agent(&self.config.openrouter_model)
            .preamble(system)
            .temperature(temperature)
            .build();
        Ok(agent.prompt(user).await?)
    }

    async fn complete_local(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let url = format!(
            "{}/api/generate",
            self.config.local_llm_base_url.trim_end_matches('/')
        );
        let body = LocalGenerateRequest {
            model: &self.config.local_llm_model,
            prompt: user,
            system,
            stream: false,
            options: json!({ "temperature": temperature }),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("local LLM returned {}", status);
        }

        let parsed: LocalGenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}
