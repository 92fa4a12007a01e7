use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::utils::{get_state, put_state};
use crate::models::{AnswerSource, RouteTag};

/// Terminal node for interface requests and non-medication treatment
/// additions: emits a directive string for the frontend and ends the run.
pub struct UiChangeTask;

#[async_trait]
impl Task for UiChangeTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        let directive = match state.route_tag {
            Some(RouteTag::AddTreatment) => "add-treatment",
            _ => "apply-ui-change",
        };

        info!(directive, "emitting UI directive");
        context.emit(
            "ui_directive",
            json!({ "directive": directive, "request": state.input }),
        );

        state.final_answer = Some(format!("ui-directive:{directive}"));
        state.source = Some(AnswerSource::Ui);

        put_state(&context, &state).await;
        Ok(TaskResult::new(None, NextAction::End))
    }
}
