use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::utils::{get_state, put_state};
use crate::models::MemoryEntry;

/// Append-only memory node on the medical branch: the utterance is always
/// recorded before the reasoning service sees it.
pub struct MemoryStoreTask;

#[async_trait]
impl Task for MemoryStoreTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        info!("appending utterance to semantic memory");
        context.emit("memory_stored", json!({ "text": state.input }));
        state.memory.push(MemoryEntry::now(state.input.clone()));

        put_state(&context, &state).await;
        Ok(TaskResult::new(None, NextAction::Continue))
    }
}
