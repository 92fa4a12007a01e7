use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Envelope pushed to the per-request event sink by tasks that want to
/// narrate their progress to a streaming client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: String,
}

impl StreamEnvelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Sending half of a per-request event queue. The receiving half is drained
/// by whatever transport the caller chose (SSE, logs, nothing).
pub type EventSink = mpsc::UnboundedSender<StreamEnvelope>;

/// Context for sharing data between tasks in a graph execution.
///
/// The context is created per request and dropped with it. An optional event
/// sink can be attached so that tasks can emit progress envelopes without
/// knowing anything about the transport draining them.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    events: Option<EventSink>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            events: None,
        }
    }

    /// Create a context with an attached event sink.
    pub fn with_events(sink: EventSink) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            events: Some(sink),
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) {
        let value = serde_json::to_value(value).expect("Failed to serialize value");
        self.data.insert(key.into(), value);
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Synchronous getter, usable from edge condition closures.
    pub fn get_sync<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    /// Push a progress envelope to the request's event queue, if one is
    /// attached. A missing or closed sink is not an error: the graph result
    /// is authoritative, envelopes are best-effort narration.
    pub fn emit(&self, kind: impl Into<String>, data: Value) {
        if let Some(sink) = &self.events {
            let _ = sink.send(StreamEnvelope::new(kind, data));
        }
    }

    pub fn has_events(&self) -> bool {
        self.events.is_some()
    }

    /// Clone of the attached sink, for handing to detached work that should
    /// keep narrating after the task returns.
    pub fn event_sink(&self) -> Option<EventSink> {
        self.events.clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
