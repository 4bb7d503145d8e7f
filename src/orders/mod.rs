//! Order lifecycle: creation with compensation, expiry-driven extension,
//! and fund recovery.

pub mod create;
pub mod extend;
pub mod models;
pub mod recover;
pub mod scheduler;
pub mod swap;
pub mod transfer;

pub use create::create_orders;
pub use extend::{check_and_extend_orders, extend_order, ExtensionStatusBoard};
pub use recover::recover_from_escrow_accounts;
pub use scheduler::ExtensionScheduler;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::backend::InMemoryBackend;
    use crate::config::Config;
    use crate::context::AppContext;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::models::{Address, Network};
    use crate::pool::{EscrowPool, InMemoryStore};
    use crate::progress::InMemoryProgress;

    /// An [`AppContext`] wired against in-memory collaborators, plus a
    /// handle to the underlying ledger for seeding and assertions
    pub(crate) async fn test_context() -> (AppContext, Arc<InMemoryLedger>) {
        let (ctx, ledger, _) = test_context_with_backend().await;
        (ctx, ledger)
    }

    /// As [`test_context`], also handing out the backend double for
    /// scripting open orders and asserting on uploads/registrations
    pub(crate) async fn test_context_with_backend(
    ) -> (AppContext, Arc<InMemoryLedger>, Arc<InMemoryBackend>) {
        let config = Config {
            api_url: "http://localhost:8080".into(),
            node_url: "http://localhost:9090/api".into(),
            network: Network::Test,
            dex_address: "acct_0dex".into(),
            base_token: "tok_base".into(),
            pool_state_path: "unused.json".into(),
            pool: Default::default(),
            extension: Default::default(),
        };
        let base = Address::parse(&config.base_token).unwrap();
        let ledger = Arc::new(InMemoryLedger::new(config.network, base));
        let pool = Arc::new(EscrowPool::new(Arc::new(InMemoryStore::new())));
        let backend = Arc::new(InMemoryBackend::new());
        let progress = Arc::new(InMemoryProgress::new());

        let ctx = AppContext::new(config, ledger.clone(), pool, backend.clone(), progress);
        (ctx, ledger, backend)
    }
}
