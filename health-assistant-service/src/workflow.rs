use agent_flow::{Context, EventSink, Graph, GraphBuilder, Task};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::embedding::EmbeddingIndex;
use crate::error::AgentError;
use crate::llm::LlmGateway;
use crate::models::{AgentRequest, AgentState, AnswerSource, RouteTag};
use crate::tasks::{
    ClassifyRouteTask, MedicalBridgeTask, MemoryPrecheckTask, MemoryStoreTask, PostprocessTask,
    ProfileToolTask, UiChangeTask, VoiceStreamTask, WebSearchTask, state_keys,
};
use crate::voice::VoiceBridge;

/// Shared dependencies handed to graph nodes at construction time. The graph
/// is built once; everything request-scoped travels in the [`Context`].
pub struct AgentDeps {
    pub config: Arc<AppConfig>,
    pub llm: Arc<LlmGateway>,
    pub embeddings: Arc<EmbeddingIndex>,
    pub voice: Arc<VoiceBridge>,
}

impl AgentDeps {
    pub fn from_config(config: AppConfig) -> Self {
        let config = Arc::new(config);
        Self {
            llm: Arc::new(LlmGateway::new(config.clone())),
            embeddings: Arc::new(EmbeddingIndex::new()),
            voice: Arc::new(VoiceBridge::new(config.voice_ws_url.clone())),
            config,
        }
    }
}

/// Wire the orchestration graph: the tagger fans out into the detached voice
/// branch and, via conditional edges on the stored route tag, into exactly
/// one processing branch per request.
pub fn build_agent_graph(deps: &AgentDeps) -> Graph {
    let classify = Arc::new(ClassifyRouteTask::new(deps.llm.clone(), deps.voice.clone()));
    let classify_id = classify.id().to_string();

    let precheck = Arc::new(MemoryPrecheckTask::new(
        deps.llm.clone(),
        deps.embeddings.clone(),
    ));
    let precheck_id = precheck.id().to_string();

    let profile_tool = Arc::new(ProfileToolTask::new(deps.llm.clone()));
    let profile_tool_id = profile_tool.id().to_string();

    let web_search = Arc::new(WebSearchTask::new(deps.config.clone()));
    let web_search_id = web_search.id().to_string();

    let memory_store = Arc::new(MemoryStoreTask);
    let memory_store_id = memory_store.id().to_string();

    let medical_bridge = Arc::new(MedicalBridgeTask::new(deps.config.clone()));
    let medical_bridge_id = medical_bridge.id().to_string();

    let postprocess = Arc::new(PostprocessTask::new(deps.llm.clone()));
    let postprocess_id = postprocess.id().to_string();

    let ui_change = Arc::new(UiChangeTask);
    let ui_change_id = ui_change.id().to_string();

    let voice_stream = Arc::new(VoiceStreamTask::new(deps.voice.clone()));
    let voice_stream_id = voice_stream.id().to_string();

    GraphBuilder::new("health_assistant")
        .add_task(classify)
        .add_task(precheck)
        .add_task(profile_tool)
        .add_task(web_search)
        .add_task(memory_store)
        .add_task(medical_bridge)
        .add_task(postprocess)
        .add_task(ui_change)
        .add_task(voice_stream)
        .set_start_task(&classify_id)
        .add_conditional_edge(&classify_id, &precheck_id, route_is(RouteTag::Text))
        .add_conditional_edge(&classify_id, &profile_tool_id, route_is(RouteTag::Patient))
        .add_conditional_edge(&classify_id, &web_search_id, route_is(RouteTag::Web))
        .add_conditional_edge(&classify_id, &memory_store_id, route_is(RouteTag::Medical))
        .add_conditional_edge(&classify_id, &ui_change_id, |ctx| {
            matches!(
                current_state(ctx).and_then(|s| s.route_tag),
                Some(RouteTag::UiChange) | Some(RouteTag::AddTreatment)
            )
        })
        // TEXT: a memory answer goes through postprocess, silence ends the run.
        .add_conditional_edge(&precheck_id, &postprocess_id, |ctx| {
            current_state(ctx).is_some_and(|s| s.final_answer.is_some())
        })
        // WEB: search -> postprocess -> extra voice invocation.
        .add_edge(&web_search_id, &postprocess_id)
        .add_conditional_edge(&postprocess_id, &voice_stream_id, |ctx| {
            current_state(ctx).and_then(|s| s.source) == Some(AnswerSource::Web)
        })
        // MEDICAL: append to memory -> bridge -> extra voice invocation.
        .add_edge(&memory_store_id, &medical_bridge_id)
        .add_edge(&medical_bridge_id, &voice_stream_id)
        .build()
}

fn route_is(tag: RouteTag) -> impl Fn(&Context) -> bool + Send + Sync + 'static {
    move |ctx| current_state(ctx).and_then(|s| s.route_tag) == Some(tag)
}

fn current_state(ctx: &Context) -> Option<AgentState> {
    ctx.get_sync(state_keys::STATE)
}

/// Run one request through the graph and return the final state. The
/// optional sink receives progress envelopes along the way.
pub async fn run_agent(
    graph: &Graph,
    request: AgentRequest,
    sink: Option<EventSink>,
) -> Result<AgentState, AgentError> {
    let request_id = Uuid::new_v4();
    let context = match sink {
        Some(sink) => Context::with_events(sink),
        None => Context::new(),
    };

    let state = AgentState::from_request(request);
    context.set(state_keys::STATE, &state).await;

    info!(%request_id, "agent run started");
    graph
        .run(context.clone())
        .await
        .map_err(|e| AgentError::Internal(e.to_string()))?;

    let final_state: AgentState = context
        .get(state_keys::STATE)
        .await
        .ok_or_else(|| AgentError::Internal("agent state missing after run".to_string()))?;

    info!(
        %request_id,
        route = final_state.route_tag.map(|t| t.as_str()).unwrap_or("unclassified"),
        answered = final_state.final_answer.is_some(),
        "agent run complete"
    );
    Ok(final_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_graph() -> Graph {
        build_agent_graph(&AgentDeps::from_config(AppConfig::from_env()))
    }

    async fn context_with(state: AgentState) -> Context {
        let context = Context::new();
        context.set(state_keys::STATE, &state).await;
        context
    }

    fn tagged(tag: RouteTag) -> AgentState {
        AgentState {
            route_tag: Some(tag),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn branch_selection_is_a_pure_function_of_the_tag() {
        let graph = test_graph();
        let classify_id = std::any::type_name::<ClassifyRouteTask>();

        let expectations = [
            (RouteTag::Text, std::any::type_name::<MemoryPrecheckTask>()),
            (RouteTag::Patient, std::any::type_name::<ProfileToolTask>()),
            (RouteTag::Web, std::any::type_name::<WebSearchTask>()),
            (RouteTag::Medical, std::any::type_name::<MemoryStoreTask>()),
            (RouteTag::UiChange, std::any::type_name::<UiChangeTask>()),
            (RouteTag::AddTreatment, std::any::type_name::<UiChangeTask>()),
        ];

        for (tag, expected) in expectations {
            let context = context_with(tagged(tag)).await;
            assert_eq!(
                graph.find_next_task(classify_id, &context).as_deref(),
                Some(expected),
                "tag {tag:?}"
            );
        }
    }

    #[tokio::test]
    async fn precheck_continues_to_postprocess_only_when_answered() {
        let graph = test_graph();
        let precheck_id = std::any::type_name::<MemoryPrecheckTask>();

        let silent = context_with(tagged(RouteTag::Text)).await;
        assert_eq!(graph.find_next_task(precheck_id, &silent), None);

        let mut answered_state = tagged(RouteTag::Text);
        answered_state.final_answer = Some("I remember roses".to_string());
        answered_state.source = Some(AnswerSource::Memory);
        let answered = context_with(answered_state).await;
        assert_eq!(
            graph.find_next_task(precheck_id, &answered).as_deref(),
            Some(std::any::type_name::<PostprocessTask>())
        );
    }

    #[tokio::test]
    async fn only_the_web_branch_reaches_the_extra_voice_invocation_after_postprocess() {
        let graph = test_graph();
        let postprocess_id = std::any::type_name::<PostprocessTask>();

        let mut web_state = tagged(RouteTag::Web);
        web_state.source = Some(AnswerSource::Web);
        web_state.final_answer = Some("snippet".to_string());
        let web = context_with(web_state).await;
        assert_eq!(
            graph.find_next_task(postprocess_id, &web).as_deref(),
            Some(std::any::type_name::<VoiceStreamTask>())
        );

        let mut memory_state = tagged(RouteTag::Text);
        memory_state.source = Some(AnswerSource::Memory);
        memory_state.final_answer = Some("recalled".to_string());
        let memory = context_with(memory_state).await;
        assert_eq!(graph.find_next_task(postprocess_id, &memory), None);
    }

    #[tokio::test]
    async fn medical_branch_is_sequenced_through_bridge_and_voice() {
        let graph = test_graph();
        let store_id = std::any::type_name::<MemoryStoreTask>();
        let bridge_id = std::any::type_name::<MedicalBridgeTask>();

        let context = context_with(tagged(RouteTag::Medical)).await;
        assert_eq!(
            graph.find_next_task(store_id, &context).as_deref(),
            Some(bridge_id)
        );
        assert_eq!(
            graph.find_next_task(bridge_id, &context).as_deref(),
            Some(std::any::type_name::<VoiceStreamTask>())
        );
    }
}
