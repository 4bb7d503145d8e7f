pub mod block;
pub mod client;
pub mod memory;
pub mod models;
pub mod rest;

pub use block::{BlockBuilder, BlockHash, Operation, Previous, SealedBlock};
pub use client::LedgerClient;
pub use memory::InMemoryLedger;
pub use models::{Account, AccountKind, Address, FeeDescriptor, Network, TokenBalance};
pub use rest::RestLedger;
