use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
