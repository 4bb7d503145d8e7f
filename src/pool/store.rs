use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PoolError;
use crate::ledger::models::Address;

/// Persistence for the ordered escrow-address list
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Address>, PoolError>;
    async fn save(&self, addresses: &[Address]) -> Result<(), PoolError>;
}

/// JSON-document store backing the runtime pool
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PoolStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Address>, PoolError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| PoolError::Store(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(PoolError::Store(e.to_string())),
        }
    }

    async fn save(&self, addresses: &[Address]) -> Result<(), PoolError> {
        let bytes =
            serde_json::to_vec_pretty(addresses).map_err(|e| PoolError::Store(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| PoolError::Store(e.to_string()))
    }
}

/// In-memory store used by tests
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Vec<Address>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for InMemoryStore {
    async fn load(&self) -> Result<Vec<Address>, PoolError> {
        Ok(self.inner.lock().clone())
    }

    async fn save(&self, addresses: &[Address]) -> Result<(), PoolError> {
        *self.inner.lock() = addresses.to_vec();
        Ok(())
    }
}
