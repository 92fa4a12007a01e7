use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::state_keys;
use super::utils::{get_state, put_state};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::models::{AnswerSource, SearchResult};

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Thin adapter over the programmable web search API. The first snippet
/// becomes the answer; a failed search leaves an empty answer and records
/// the error on state without breaking the branch.
pub struct WebSearchTask {
    client: reqwest::Client,
    config: Arc<AppConfig>,
}

impl WebSearchTask {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Task for WebSearchTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        match search(&self.client, &self.config, &state.input).await {
            Ok(results) => {
                info!(results = results.len(), "web search completed");
                context.emit(
                    "web_results",
                    json!({ "count": results.len(), "results": results }),
                );
                state.final_answer = Some(
                    results
                        .first()
                        .map(|r| r.snippet.clone())
                        .unwrap_or_default(),
                );
                context.set(state_keys::WEB_RESULTS, &results).await;
            }
            Err(e) => {
                warn!(error = %e, "web search failed");
                state.error = Some(e.to_string());
                state.final_answer = Some(String::new());
            }
        }

        state.source = Some(AnswerSource::Web);
        put_state(&context, &state).await;
        Ok(TaskResult::new(None, NextAction::Continue))
    }
}

async fn search(
    client: &reqwest::Client,
    config: &AppConfig,
    query: &str,
) -> Result<Vec<SearchResult>, AgentError> {
    let api_key = config
        .search_api_key
        .as_deref()
        .ok_or_else(|| AgentError::SearchFailed("SEARCH_API_KEY not set".to_string()))?;
    let engine_id = config
        .search_engine_id
        .as_deref()
        .ok_or_else(|| AgentError::SearchFailed("SEARCH_ENGINE_ID not set".to_string()))?;

    let response = client
        .get(SEARCH_ENDPOINT)
        .query(&[
            ("key", api_key),
            ("cx", engine_id),
            ("q", query),
            ("num", &config.search_max_results.to_string()),
        ])
        .send()
        .await
        .map_err(|e| AgentError::SearchFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(AgentError::SearchFailed(format!(
            "search API returned {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AgentError::SearchFailed(e.to_string()))?;

    let results = body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .take(config.search_max_results)
                .map(parse_item)
                .collect()
        })
        .unwrap_or_default();

    Ok(results)
}

fn parse_item(item: &Value) -> SearchResult {
    let text = |key: &str| {
        item[key]
            .as_str()
            .unwrap_or_default()
            .to_string()
    };
    SearchResult {
        title: text("title"),
        link: text("link"),
        snippet: text("snippet"),
        display_link: text("displayLink"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_parsing_tolerates_missing_fields() {
        let item = json!({ "title": "Bitcoin price", "snippet": "BTC is at..." });
        let parsed = parse_item(&item);
        assert_eq!(parsed.title, "Bitcoin price");
        assert_eq!(parsed.snippet, "BTC is at...");
        assert_eq!(parsed.link, "");
        assert_eq!(parsed.display_link, "");
    }
}
