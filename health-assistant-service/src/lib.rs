pub mod config;
pub mod diff;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod service;
pub mod tasks;
pub mod voice;
pub mod workflow;

pub use error::AgentError;
pub use models::*;
pub use service::{AppState, create_app};
pub use workflow::{AgentDeps, build_agent_graph, run_agent};
