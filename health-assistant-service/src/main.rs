use health_assistant_service::config::AppConfig;
use health_assistant_service::{AgentDeps, create_app};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "health_assistant_service=debug,agent_flow=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    if !config.use_local_llm && config.openrouter_api_key.is_none() {
        eprintln!(
            "Error: OPENROUTER_API_KEY environment variable is required (or set USE_LOCAL_LLM=true)"
        );
        std::process::exit(1);
    }

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);

    let deps = AgentDeps::from_config(config);
    let app = create_app(&deps);

    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let addr = listener.local_addr()?;

    info!("Healthcare assistant service starting on {}", addr);
    info!("Agent endpoint: POST http://{}/api/agent", addr);
    info!("Streaming endpoint: POST http://{}/api/agent/stream", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
