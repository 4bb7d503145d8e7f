use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderdesk::bootstrap;
use orderdesk::config::Config;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,orderdesk=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("🚀 Starting order lifecycle daemon");

    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    let ctx = bootstrap::initialize_app_context(config).await?;

    // Headless operation signs with a seed from the environment; without
    // one the daemon idles until an operator unlocks the wallet
    if let Ok(seed) = std::env::var("WALLET_SEED") {
        let session = ctx.unlock(seed);
        ctx.pool
            .initialize(
                ctx.ledger.as_ref(),
                session.signer(),
                ctx.settings.pool_enabled(),
                &ctx.config.pool,
            )
            .await?;
    }

    let _tasks = bootstrap::spawn_background_tasks(ctx.clone());
    info!("🌐 Background loops started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
