use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Order lifecycle errors
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Invalid order input: {0}")]
    Validation(String),

    #[error("Insufficient escrow accounts: need {needed}, have {available}")]
    InsufficientPool { needed: usize, available: usize },

    #[error("Order {0} has no registered unsigned bytes")]
    MissingUnsignedBytes(String),

    #[error("Wallet is locked")]
    WalletLocked,
}

/// Errors surfaced by the ledger client facade
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Stale `previous` reference rejected by the network. Not retried here;
    /// the caller may resync and retry the whole operation.
    #[error("Head block conflict for {0}")]
    Conflict(String),

    #[error("Account {0} is not a token")]
    InvalidToken(String),

    #[error("Account {0} cannot sign (no key material)")]
    MissingKey(String),

    #[error("Insufficient balance on {account} for token {token}")]
    InsufficientBalance { account: String, token: String },

    #[error("No fee descriptor in vote staple")]
    MissingFeeDescriptor,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Block codec error: {0}")]
    Codec(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Escrow pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Insufficient accounts in pool: need {needed}, have {available}")]
    Insufficient { needed: usize, available: usize },

    #[error("Pool store error: {0}")]
    Store(String),
}

/// Structured error payload returned to external callers
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Order(OrderError::Validation(_)) => "VALIDATION_ERROR",
            AppError::Order(OrderError::InsufficientPool { .. })
            | AppError::Pool(PoolError::Insufficient { .. }) => "INSUFFICIENT_POOL",
            AppError::Order(OrderError::MissingUnsignedBytes(_)) => "MISSING_UNSIGNED_BYTES",
            AppError::Order(OrderError::WalletLocked) => "WALLET_LOCKED",
            AppError::Ledger(LedgerError::Conflict(_)) => "LEDGER_CONFLICT",
            AppError::Ledger(_) => "LEDGER_ERROR",
            AppError::Pool(_) => "POOL_ERROR",
            AppError::Backend(_) => "BACKEND_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Backend(format!("HTTP request error: {:?}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {:?}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(error: validator::ValidationErrors) -> Self {
        AppError::Order(OrderError::Validation(error.to_string()))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
