use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{
        IntoResponse, Json,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use agent_flow::{Graph, StreamEnvelope};

use crate::models::{AgentRequest, AgentResponse};
use crate::workflow::{AgentDeps, build_agent_graph, run_agent};

type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

/// How long the SSE drain waits on the queue before emitting a keepalive.
const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<Graph>,
}

pub fn create_app(deps: &AgentDeps) -> Router {
    let graph = Arc::new(build_agent_graph(deps));
    build_router(AppState { graph })
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/agent", post(run_agent_handler))
        .route("/api/agent/stream", post(stream_agent_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Healthcare Assistant Service",
        "version": "1.0.0",
        "description": "Conversational healthcare assistant with profile, memory, web, medical and voice branches",
        "endpoints": {
            "POST /api/agent": "Run one utterance through the assistant",
            "POST /api/agent/stream": "Same, with progress streamed as Server-Sent Events",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn parse_request(body: Value) -> Result<AgentRequest, ApiError> {
    let Some(object) = body.as_object() else {
        return Err(bad_request_error("request body must be a JSON object"));
    };
    match object.get("prompt").and_then(Value::as_str) {
        Some(prompt) if !prompt.trim().is_empty() => {}
        _ => return Err(bad_request_error("prompt is required")),
    }
    serde_json::from_value(body).map_err(|e| bad_request_error(&format!("malformed request: {e}")))
}

async fn run_agent_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<AgentResponse>, ApiError> {
    let request = parse_request(body)?;
    info!(prompt = %request.prompt, "agent request");

    match run_agent(&state.graph, request, None).await {
        Ok(final_state) => Ok(Json(AgentResponse::from(final_state))),
        Err(e) => {
            error!(error = %e, "agent run failed");
            Err(internal_error(&e.to_string()))
        }
    }
}

async fn stream_agent_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request = parse_request(body)?;
    info!(prompt = %request.prompt, "streaming agent request");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let graph = state.graph.clone();
    let sink = tx.clone();

    tokio::spawn(async move {
        let envelope = match run_agent(&graph, request, Some(sink)).await {
            Ok(final_state) => {
                let function = final_state
                    .route_tag
                    .map(|t| t.as_str())
                    .unwrap_or("text")
                    .to_string();
                let response = AgentResponse::from(final_state);
                let mut data = serde_json::to_value(&response).unwrap_or_else(|_| json!({}));
                data["function"] = json!(function);
                StreamEnvelope::new("final_result", data)
            }
            Err(e) => {
                error!(error = %e, "streaming agent run failed");
                StreamEnvelope::new("error", json!({ "error": e.to_string() }))
            }
        };
        let _ = tx.send(envelope);
    });

    let stream = async_stream::stream! {
        loop {
            match tokio::time::timeout(STREAM_POLL_INTERVAL, rx.recv()).await {
                Ok(Some(envelope)) => {
                    let terminal = envelope.kind == "final_result" || envelope.kind == "error";
                    yield Ok::<Event, Infallible>(
                        Event::default()
                            .json_data(&envelope)
                            .unwrap_or_else(|_| Event::default().data("{}")),
                    );
                    if terminal {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    yield Ok(Event::default()
                        .json_data(&json!({ "type": "keepalive" }))
                        .unwrap_or_else(|_| Event::default().data("{}")));
                }
            }
        }
    };

    Ok((
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        ),
    ))
}
