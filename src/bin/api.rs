use digital_twin_memory::{
    api::start_server, build_backend, AppConfig, ConversationService, GeminiGenerator,
    SessionLifecycleManager,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; answers will fall back to an apology message");
    }

    info!("Digital Twin - API Server");
    info!("Port: {}", config.port);

    // Create components
    let backend = build_backend(&config);
    let memory = Arc::new(SessionLifecycleManager::new(backend, config.memory.clone()));
    let generator = Arc::new(GeminiGenerator::new(
        config.gemini_api_key.clone(),
        config.memory.assistant_label.clone(),
    )?);
    let service = Arc::new(ConversationService::new(
        memory,
        generator,
        config.generation_timeout,
    ));

    info!("Conversation service initialized");

    // Start API server
    start_server(service, config.port).await?;

    Ok(())
}
