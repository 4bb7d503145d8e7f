pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod orders;
pub mod pool;
pub mod progress;

pub use context::AppContext;
pub use error::{AppError, AppResult};
