use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::backend::BackendClient;
use crate::config::Config;
use crate::context::AppContext;
use crate::error::AppResult;
use crate::ledger::models::Address;
use crate::ledger::rest::RestLedger;
use crate::orders::ExtensionScheduler;
use crate::pool::{EscrowPool, JsonFileStore};
use crate::progress::InMemoryProgress;

pub async fn initialize_app_context(config: Config) -> AppResult<Arc<AppContext>> {
    info!("Initializing application components ...");

    let base_token = Address::parse(&config.base_token)?;
    let ledger = Arc::new(RestLedger::new(
        config.node_url.clone(),
        config.network,
        base_token,
    ));
    info!(node = %config.node_url, network = ?config.network, "✅ ledger client initialized");

    let pool = Arc::new(EscrowPool::new(Arc::new(JsonFileStore::new(
        &config.pool_state_path,
    ))));
    info!(path = %config.pool_state_path, size = pool.size().await?, "✅ escrow pool loaded");

    let backend = Arc::new(BackendClient::new(config.api_url.clone()));
    let progress = Arc::new(InMemoryProgress::new());

    Ok(Arc::new(AppContext::new(
        config, ledger, pool, backend, progress,
    )))
}

/// Start the periodic refill and extension loops
pub fn spawn_background_tasks(ctx: Arc<AppContext>) -> Vec<JoinHandle<()>> {
    let scheduler = Arc::new(ExtensionScheduler::new(ctx.clone()));
    vec![spawn_pool_refill_loop(ctx), scheduler.start()]
}

/// Refill ticks only do work while the wallet is unlocked; account
/// creation needs the signer
fn spawn_pool_refill_loop(ctx: Arc<AppContext>) -> JoinHandle<()> {
    let period = Duration::from_secs(ctx.config.pool.refill_period_secs);
    info!(period_secs = period.as_secs(), "starting pool refill loop");

    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let session = match ctx.session() {
                Ok(session) => session,
                Err(_) => continue,
            };
            match ctx
                .pool
                .refill(
                    ctx.ledger.as_ref(),
                    session.signer(),
                    ctx.settings.pool_enabled(),
                    &ctx.config.pool,
                )
                .await
            {
                Ok(outcome) if outcome.added > 0 => {
                    info!(added = outcome.added, total = outcome.total, "pool refilled");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "pool refill tick failed"),
            }
        }
    })
}
