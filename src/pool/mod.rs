pub mod store;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::PoolSettings;
use crate::error::{AppResult, PoolError};
use crate::ledger::client::LedgerClient;
use crate::ledger::models::{Account, Address};

pub use store::{InMemoryStore, JsonFileStore, PoolStore};

/// Result of one refill invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefillOutcome {
    pub added: usize,
    pub total: usize,
}

/// Pool of pre-created escrow accounts
///
/// FIFO: refill appends at the back, allocation consumes from the front,
/// returned accounts are re-inserted at the front so the most recently
/// freed accounts are reused first.
///
/// INVARIANTS:
/// - No address appears twice.
/// - Every mutation is read-modify-write under one lock; two concurrent
///   allocations never hand out the same address.
pub struct EscrowPool {
    store: Arc<dyn PoolStore>,
    /// Serializes all read-modify-write cycles against the store
    lock: Mutex<()>,
    /// Refill must not run concurrently with itself
    refilling: AtomicBool,
}

impl EscrowPool {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            refilling: AtomicBool::new(false),
        }
    }

    pub async fn size(&self) -> Result<usize, PoolError> {
        let _guard = self.lock.lock().await;
        Ok(self.store.load().await?.len())
    }

    /// First `count` addresses without removing them. Allocation planning
    /// happens through peek; membership changes only via take/remove.
    pub async fn peek(&self, count: usize) -> Result<Vec<Address>, PoolError> {
        let _guard = self.lock.lock().await;
        let pool = self.store.load().await?;
        if pool.len() < count {
            return Err(PoolError::Insufficient {
                needed: count,
                available: pool.len(),
            });
        }
        Ok(pool[..count].to_vec())
    }

    /// Atomically remove and return the first `count` addresses
    pub async fn take(&self, count: usize) -> Result<Vec<Address>, PoolError> {
        let _guard = self.lock.lock().await;
        let mut pool = self.store.load().await?;
        if pool.len() < count {
            return Err(PoolError::Insufficient {
                needed: count,
                available: pool.len(),
            });
        }
        let taken: Vec<Address> = pool.drain(..count).collect();
        self.store.save(&pool).await?;
        info!(taken = count, remaining = pool.len(), "took accounts from pool");
        Ok(taken)
    }

    /// Permanently delete the given addresses from the pool
    pub async fn remove(&self, addresses: &[Address]) -> Result<(), PoolError> {
        if addresses.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut pool = self.store.load().await?;
        let drop_set: HashSet<&Address> = addresses.iter().collect();
        pool.retain(|addr| !drop_set.contains(addr));
        self.store.save(&pool).await?;
        info!(
            removed = addresses.len(),
            remaining = pool.len(),
            "removed accounts from pool"
        );
        Ok(())
    }

    /// Re-insert never-funded addresses at the front after a failed run
    pub async fn give_back(&self, addresses: &[Address]) -> Result<(), PoolError> {
        if addresses.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut pool = self.store.load().await?;
        let existing: HashSet<&Address> = pool.iter().collect();
        let mut updated: Vec<Address> = addresses
            .iter()
            .filter(|addr| !existing.contains(addr))
            .cloned()
            .collect();
        let returned = updated.len();
        updated.extend(pool);
        self.store.save(&updated).await?;
        info!(returned, total = updated.len(), "returned accounts to pool");
        Ok(())
    }

    /// Append freshly created addresses at the back
    pub async fn add(&self, addresses: &[Address]) -> Result<(), PoolError> {
        if addresses.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut pool = self.store.load().await?;
        let existing: HashSet<Address> = pool.iter().cloned().collect();
        let mut added = 0;
        for addr in addresses {
            if !existing.contains(addr) {
                pool.push(addr.clone());
                added += 1;
            }
        }
        self.store.save(&pool).await?;
        info!(added, total = pool.len(), "added accounts to pool");
        Ok(())
    }

    /// Top the pool up toward its target size with at most one batch of
    /// new escrow accounts, created in a single on-chain transaction.
    ///
    /// Callers re-invoke this on a timer until the pool reaches target;
    /// one bounded batch per invocation keeps any single cycle cheap. A
    /// tick that lands while a refill is already running is a no-op.
    pub async fn refill(
        &self,
        ledger: &dyn LedgerClient,
        creator: &Account,
        pool_enabled: bool,
        settings: &PoolSettings,
    ) -> AppResult<RefillOutcome> {
        if self.refilling.swap(true, Ordering::SeqCst) {
            warn!("refill already in progress, skipping tick");
            let total = self.size().await?;
            return Ok(RefillOutcome { added: 0, total });
        }
        let result = self.refill_once(ledger, creator, pool_enabled, settings).await;
        self.refilling.store(false, Ordering::SeqCst);
        result
    }

    async fn refill_once(
        &self,
        ledger: &dyn LedgerClient,
        creator: &Account,
        pool_enabled: bool,
        settings: &PoolSettings,
    ) -> AppResult<RefillOutcome> {
        let target = if pool_enabled {
            settings.max_pool_size
        } else {
            settings.min_pool_size
        };
        let current = self.size().await?;

        if current >= target {
            return Ok(RefillOutcome {
                added: 0,
                total: current,
            });
        }
        let needed = target - current;

        ledger.sync().await?;

        // Creating accounts costs base token; skip the cycle when broke
        let base_token = ledger.base_token();
        let balances = ledger.all_balances(creator.address()).await?;
        let base_balance = balances
            .iter()
            .find(|b| b.token == base_token)
            .map(|b| b.balance)
            .unwrap_or(0);
        if base_balance == 0 {
            warn!("no base token balance, skipping pool refill");
            return Ok(RefillOutcome {
                added: 0,
                total: current,
            });
        }

        let batch = needed.min(settings.refill_batch);
        info!(batch, needed, current, target, "creating escrow account batch");

        match ledger.create_escrow_accounts(creator, batch).await {
            Ok(addresses) => {
                self.add(&addresses).await?;
                Ok(RefillOutcome {
                    added: addresses.len(),
                    total: current + addresses.len(),
                })
            }
            Err(e) => {
                warn!(error = %e, "escrow account batch creation failed");
                Ok(RefillOutcome {
                    added: 0,
                    total: current,
                })
            }
        }
    }

    /// First-run initialization: refill once if the pool is empty
    pub async fn initialize(
        &self,
        ledger: &dyn LedgerClient,
        creator: &Account,
        pool_enabled: bool,
        settings: &PoolSettings,
    ) -> AppResult<()> {
        if self.size().await? == 0 {
            info!("initializing empty escrow pool");
            self.refill(ledger, creator, pool_enabled, settings).await?;
        }
        Ok(())
    }
}
