pub mod context;
pub mod error;
pub mod graph;
pub mod task;

// Re-export commonly used types
pub use context::{Context, EventSink, StreamEnvelope};
pub use error::{FlowError, Result};
pub use graph::{Graph, GraphBuilder};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct TestTask {
        id: String,
    }

    #[async_trait]
    impl Task for TestTask {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            let input: String = context.get("input").await.unwrap_or_default();
            context.set("output", format!("Processed: {}", input)).await;

            Ok(TaskResult::new(
                Some("Task completed".to_string()),
                NextAction::End,
            ))
        }
    }

    /// Appends its own id to a trail so routing order can be asserted.
    struct TrailTask {
        id: String,
        next_action: NextAction,
    }

    #[async_trait]
    impl Task for TrailTask {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            let mut trail: Vec<String> = context.get("trail").await.unwrap_or_default();
            trail.push(self.id.clone());
            context.set("trail", trail).await;
            Ok(TaskResult::new(None, self.next_action.clone()))
        }
    }

    #[tokio::test]
    async fn test_simple_graph_execution() {
        let task = Arc::new(TestTask {
            id: "test_task".to_string(),
        });

        let graph = GraphBuilder::new("test_graph").add_task(task).build();

        let context = Context::new();
        context.set("input", "Hello, World!").await;

        let result = graph.execute("test_task", context.clone()).await.unwrap();

        assert!(result.response.is_some());
        assert!(matches!(result.next_action, NextAction::End));
        assert_eq!(result.task_id, "test_task");

        let output: String = context.get("output").await.unwrap();
        assert_eq!(output, "Processed: Hello, World!");
    }

    #[tokio::test]
    async fn test_conditional_edges_route_by_context() {
        let entry = Arc::new(TrailTask {
            id: "entry".to_string(),
            next_action: NextAction::Continue,
        });
        let left = Arc::new(TrailTask {
            id: "left".to_string(),
            next_action: NextAction::End,
        });
        let right = Arc::new(TrailTask {
            id: "right".to_string(),
            next_action: NextAction::End,
        });

        let graph = GraphBuilder::new("routing")
            .add_task(entry)
            .add_task(left)
            .add_task(right)
            .add_conditional_edge("entry", "left", |ctx| {
                ctx.get_sync::<String>("direction").as_deref() == Some("left")
            })
            .add_conditional_edge("entry", "right", |ctx| {
                ctx.get_sync::<String>("direction").as_deref() == Some("right")
            })
            .build();

        let context = Context::new();
        context.set("direction", "right").await;

        let result = graph.run(context.clone()).await.unwrap();
        assert_eq!(result.task_id, "right");

        let trail: Vec<String> = context.get("trail").await.unwrap();
        assert_eq!(trail, vec!["entry".to_string(), "right".to_string()]);
    }

    #[tokio::test]
    async fn test_unmatched_edges_end_the_run() {
        let entry = Arc::new(TrailTask {
            id: "entry".to_string(),
            next_action: NextAction::Continue,
        });
        let never = Arc::new(TrailTask {
            id: "never".to_string(),
            next_action: NextAction::End,
        });

        let graph = GraphBuilder::new("dead_end")
            .add_task(entry)
            .add_task(never)
            .add_conditional_edge("entry", "never", |_| false)
            .build();

        let result = graph.run(Context::new()).await.unwrap();
        assert_eq!(result.task_id, "entry");
    }

    #[tokio::test]
    async fn test_context_event_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let context = Context::with_events(tx);
        assert!(context.has_events());

        context.emit("step_one", json!({"n": 1}));
        context.emit("step_two", json!({"n": 2}));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, "step_one");
        assert_eq!(first.data, json!({"n": 1}));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, "step_two");

        // A context without a sink silently drops envelopes.
        let silent = Context::new();
        assert!(!silent.has_events());
        silent.emit("ignored", json!({}));
    }
}
