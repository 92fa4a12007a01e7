use agent_flow::{Context, NextAction, Task, TaskResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::utils::{get_state, put_state};
use crate::llm::LlmGateway;
use crate::models::RouteTag;
use crate::voice::{VoiceBridge, VoiceUtterance};

const CLASSIFY_PREAMBLE: &str = r#"You classify a user utterance for a healthcare assistant into exactly one route tag.

Tags:
- text: greetings, casual chat, general knowledge, and anything about recommendations. Adding, updating, or removing recommendations is NEVER a profile operation.
- patient: reading or updating the patient profile (name, age, blood type, allergies, medications, daily checklist, appointment, sleep), excluding recommendations.
- web: real-time or volatile facts such as prices, weather, news, or schedules.
- medical: medical reasoning, verification of medical claims, drug interactions.
- ui_change: interface, theme, or layout requests.
- add_treatment: adding a non-medication treatment such as physiotherapy or occupational therapy.

Respond with exactly one lowercase tag token and nothing else."#;

/// Entry node: tags the utterance, then fans out. The voice branch is
/// detached here with a read-only snapshot and is never awaited by the
/// processing branch; routing continues through conditional edges on the
/// stored tag.
pub struct ClassifyRouteTask {
    llm: Arc<LlmGateway>,
    voice: Arc<VoiceBridge>,
}

impl ClassifyRouteTask {
    pub fn new(llm: Arc<LlmGateway>, voice: Arc<VoiceBridge>) -> Self {
        Self { llm, voice }
    }
}

#[async_trait]
impl Task for ClassifyRouteTask {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, context: Context) -> agent_flow::Result<TaskResult> {
        let mut state = get_state(&context).await?;

        let tag = match self.llm.complete(CLASSIFY_PREAMBLE, &state.input, 0.0).await {
            Ok(token) => RouteTag::parse(&token),
            Err(e) => {
                warn!(error = %e, "tagger failed, falling back to text route");
                state.error = Some(e.to_string());
                RouteTag::Text
            }
        };

        info!(tag = tag.as_str(), "utterance classified");
        context.emit("route_classified", json!({ "tag": tag.as_str() }));

        state.route_tag = Some(tag);
        put_state(&context, &state).await;

        let voice = self.voice.clone();
        let sink = context.event_sink();
        let utterance = VoiceUtterance {
            text: state.input.clone(),
            patient_profile: Some(Value::Object(state.patient_profile.clone())),
            tag: tag.voice_tag().to_string(),
        };
        tokio::spawn(async move {
            if let Err(e) = voice.stream(utterance, sink).await {
                warn!(error = %e, "voice branch failed");
            }
        });

        Ok(TaskResult::new(None, NextAction::Continue))
    }
}
