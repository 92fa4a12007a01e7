use thiserror::Error;

/// Error kinds surfaced by the assistant core. Node failures are captured on
/// `AgentState.error` and never abort the graph; only `BadRequest` and
/// `Internal` reach the HTTP boundary as status codes.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Web search failed: {0}")]
    SearchFailed(String),

    #[error("Medical bridge failed: {0}")]
    MedicalBridgeFailed(String),

    #[error("Voice bridge failed: {0}")]
    VoiceBridgeFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
