pub mod classify_route;
pub mod medical_bridge;
pub mod memory_precheck;
pub mod memory_store;
pub mod postprocess;
pub mod profile_tool;
pub mod ui_change;
pub mod utils;
pub mod voice_stream;
pub mod web_search;

pub use classify_route::ClassifyRouteTask;
pub use medical_bridge::MedicalBridgeTask;
pub use memory_precheck::MemoryPrecheckTask;
pub use memory_store::MemoryStoreTask;
pub use postprocess::PostprocessTask;
pub use profile_tool::ProfileToolTask;
pub use ui_change::UiChangeTask;
pub use voice_stream::VoiceStreamTask;
pub use web_search::WebSearchTask;

/// Keys under which graph nodes share request-scoped data.
pub mod state_keys {
    pub const STATE: &str = "agent_state";
    pub const WEB_RESULTS: &str = "web_results";
    pub const RECALLED_MEMORIES: &str = "recalled_memories";
}
