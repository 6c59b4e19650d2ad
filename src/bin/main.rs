use digital_twin_memory::{build_backend, AppConfig, SessionLifecycleManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One-shot sweep of expired sessions, meant to be run by an external scheduler.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let backend = build_backend(&config);
    let memory = SessionLifecycleManager::new(backend, config.memory.clone());

    info!("Session sweep starting");

    let removed = memory.cleanup().await;
    if let Some(fault) = removed.fault() {
        warn!("Sweep degraded ({:?}); nothing was removed", fault);
    }

    let stats = memory.statistics().await.into_value();

    println!("\n=== SESSION SWEEP ===");
    println!("Removed expired: {}", removed.value());
    println!("Total sessions:  {}", stats.total_sessions);
    println!("Active now:      {}", stats.current_active);
    println!("Active (24h):    {}", stats.active_last_24h);
    println!("Messages (est.): {}", stats.total_messages);
    println!("Sampled:         {}", stats.sampled);

    Ok(())
}
