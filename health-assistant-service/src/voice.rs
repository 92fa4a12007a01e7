use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

use agent_flow::{EventSink, StreamEnvelope};

use crate::error::AgentError;

/// Wall-clock budget for draining the voice response.
const RESPONSE_BUDGET: Duration = Duration::from_secs(10);
/// Settle time between session init and the first conversation item.
const SESSION_SETTLE: Duration = Duration::from_millis(250);

/// One tagged utterance streamed to the realtime voice service.
#[derive(Debug, Clone)]
pub struct VoiceUtterance {
    pub text: String,
    pub patient_profile: Option<Value>,
    pub tag: String,
}

/// Side-effect-only client for the realtime voice WebSocket.
///
/// The bridge initializes a session, sends one tagged utterance, requests
/// response generation, and drains deltas until both the text and audio
/// streams are done, the socket closes, or the wall-clock budget elapses.
/// It reads request state but never writes any of it back.
pub struct VoiceBridge {
    url: String,
}

impl VoiceBridge {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub async fn stream(
        &self,
        utterance: VoiceUtterance,
        sink: Option<EventSink>,
    ) -> Result<(), AgentError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AgentError::VoiceBridgeFailed(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static("realtime"),
        );

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| AgentError::VoiceBridgeFailed(e.to_string()))?;
        let (mut writer, mut reader) = socket.split();

        info!(tag = %utterance.tag, "voice session opened");

        send_json(
            &mut writer,
            json!({
                "type": "session.update",
                "session": { "modalities": ["text", "audio"] }
            }),
        )
        .await?;
        sleep(SESSION_SETTLE).await;

        let mut item = json!({
            "type": "conversation.item.input_text",
            "text": utterance.text,
            "tag": utterance.tag,
        });
        if let Some(profile) = utterance.patient_profile {
            item["patientProfile"] = profile;
        }
        send_json(&mut writer, item).await?;
        send_json(&mut writer, json!({ "type": "response.create" })).await?;

        let deadline = Instant::now() + RESPONSE_BUDGET;
        let mut text_done = false;
        let mut audio_done = false;

        while !(text_done && audio_done) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("voice response budget elapsed");
                break;
            }

            let message = match timeout(remaining, reader.next()).await {
                Err(_) => {
                    warn!("voice response budget elapsed");
                    break;
                }
                Ok(None) => break,
                Ok(Some(message)) => message,
            };

            match message {
                Ok(Message::Text(text)) => {
                    let Ok(event) = serde_json::from_str::<Value>(&text) else {
                        debug!("undecodable voice message skipped");
                        continue;
                    };
                    match event["type"].as_str() {
                        Some("response.text.done") => text_done = true,
                        Some("response.audio.done") => audio_done = true,
                        Some("unmute.response.text.delta.ready")
                        | Some("response.audio.delta") => {
                            if let Some(sink) = &sink {
                                let _ = sink.send(StreamEnvelope::new("voice_delta", event));
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "voice socket error");
                    break;
                }
            }
        }

        let _ = writer.send(Message::Close(None)).await;
        info!(text_done, audio_done, "voice session drained");
        Ok(())
    }
}

type VoiceWriter = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

async fn send_json(writer: &mut VoiceWriter, value: Value) -> Result<(), AgentError> {
    writer
        .send(Message::Text(value.to_string()))
        .await
        .map_err(|e| AgentError::VoiceBridgeFailed(e.to_string()))
}
