use std::env;

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Cloud chat provider key (OpenRouter).
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    /// When set, route completions to the self-hosted model server instead
    /// of the cloud provider.
    pub use_local_llm: bool,
    pub local_llm_base_url: String,
    pub local_llm_model: String,
    pub search_api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub search_max_results: usize,
    pub medical_endpoint_url: String,
    pub voice_ws_url: String,
    pub llm_max_attempts: u32,
    pub bridge_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            openrouter_api_key: env::var("OPENROUTER_API_KEY").ok(),
            openrouter_model: env_or("OPENROUTER_MODEL", "openai/gpt-4o-mini"),
            use_local_llm: env_flag("USE_LOCAL_LLM"),
            local_llm_base_url: env_or("LOCAL_LLM_BASE_URL", "http://localhost:11434"),
            local_llm_model: env_or("LOCAL_LLM_MODEL", "llama3.1"),
            search_api_key: env::var("SEARCH_API_KEY").ok(),
            search_engine_id: env::var("SEARCH_ENGINE_ID").ok(),
            search_max_results: env_parse("SEARCH_MAX_RESULTS", 5),
            medical_endpoint_url: env_or("MEDICAL_ENDPOINT_URL", "http://localhost:5005/reason"),
            voice_ws_url: env_or("VOICE_WS_URL", "ws://localhost:8765/v1/realtime"),
            llm_max_attempts: env_parse("LLM_MAX_ATTEMPTS", 1),
            bridge_timeout_secs: env_parse("BRIDGE_TIMEOUT_SECS", 15),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
