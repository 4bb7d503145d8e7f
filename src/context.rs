use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::backend::SwapBackend;
use crate::config::Config;
use crate::error::{AppResult, OrderError};
use crate::ledger::client::LedgerClient;
use crate::ledger::models::{Account, Address, Network};
use crate::pool::EscrowPool;
use crate::progress::ProgressSink;

/// Signer material held in memory while the wallet is unlocked
pub struct WalletSession {
    seed: String,
    signer: Account,
    network: Network,
    last_activity: Mutex<DateTime<Utc>>,
}

impl WalletSession {
    fn new(seed: String, network: Network) -> Self {
        let signer = Account::from_seed(&seed, 0);
        Self {
            seed,
            signer,
            network,
            last_activity: Mutex::new(Utc::now()),
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn signer(&self) -> &Account {
        &self.signer
    }

    pub fn owner_address(&self) -> &Address {
        self.signer.address()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Stamp activity so the auto-lock timer does not fire mid-operation
    pub fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }
}

/// User-togglable behavior
pub struct Settings {
    auto_extend_orders: AtomicBool,
    pool_enabled: AtomicBool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_extend_orders: AtomicBool::new(true),
            pool_enabled: AtomicBool::new(false),
        }
    }
}

impl Settings {
    pub fn auto_extend_orders(&self) -> bool {
        self.auto_extend_orders.load(Ordering::Relaxed)
    }

    pub fn set_auto_extend_orders(&self, enabled: bool) {
        self.auto_extend_orders.store(enabled, Ordering::Relaxed);
    }

    pub fn pool_enabled(&self) -> bool {
        self.pool_enabled.load(Ordering::Relaxed)
    }

    pub fn set_pool_enabled(&self, enabled: bool) {
        self.pool_enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Explicit application context passed to the orchestrators.
///
/// Holds the collaborators that used to live behind module-level
/// singletons: the ledger session, escrow pool, backend client, progress
/// sink, settings, and the unlock-scoped wallet session.
pub struct AppContext {
    pub config: Config,
    pub ledger: Arc<dyn LedgerClient>,
    pub pool: Arc<EscrowPool>,
    pub backend: Arc<dyn SwapBackend>,
    pub progress: Arc<dyn ProgressSink>,
    pub settings: Settings,
    session: RwLock<Option<Arc<WalletSession>>>,
    currently_extending: Mutex<Option<String>>,
}

impl AppContext {
    pub fn new(
        config: Config,
        ledger: Arc<dyn LedgerClient>,
        pool: Arc<EscrowPool>,
        backend: Arc<dyn SwapBackend>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            ledger,
            pool,
            backend,
            progress,
            settings: Settings::default(),
            session: RwLock::new(None),
            currently_extending: Mutex::new(None),
        }
    }

    /// Install signer material; called on wallet unlock
    pub fn unlock(&self, seed: String) -> Arc<WalletSession> {
        let session = Arc::new(WalletSession::new(seed, self.config.network));
        info!(owner = %session.owner_address(), "wallet unlocked");
        *self.session.write() = Some(session.clone());
        session
    }

    /// Drop signer material; called on wallet lock
    pub fn lock(&self) {
        info!("wallet locked");
        *self.session.write() = None;
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.read().is_some()
    }

    pub fn session(&self) -> AppResult<Arc<WalletSession>> {
        self.session
            .read()
            .clone()
            .ok_or_else(|| OrderError::WalletLocked.into())
    }

    pub fn set_currently_extending(&self, order_id: Option<String>) {
        *self.currently_extending.lock() = order_id;
    }

    pub fn currently_extending(&self) -> Option<String> {
        self.currently_extending.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::config::Config;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::models::Address;
    use crate::pool::InMemoryStore;
    use crate::progress::InMemoryProgress;

    pub(crate) fn test_config() -> Config {
        Config {
            api_url: "http://localhost:8080".into(),
            node_url: "http://localhost:9090/api".into(),
            network: Network::Test,
            dex_address: "acct_0dex".into(),
            base_token: "tok_base".into(),
            pool_state_path: "unused.json".into(),
            pool: Default::default(),
            extension: Default::default(),
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let config = test_config();
        let base = Address::parse("tok_base").unwrap();
        let ctx = AppContext::new(
            config,
            Arc::new(InMemoryLedger::new(Network::Test, base)),
            Arc::new(EscrowPool::new(Arc::new(InMemoryStore::new()))),
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryProgress::new()),
        );

        assert!(ctx.session().is_err());

        let session = ctx.unlock("test seed".into());
        assert_eq!(
            ctx.session().unwrap().owner_address(),
            session.owner_address()
        );
        assert!(ctx.is_unlocked());

        ctx.lock();
        assert!(ctx.session().is_err());
    }
}
