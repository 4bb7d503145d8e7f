use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger::block::{BlockBuilder, BlockHash, Operation, Previous, SealedBlock};
use crate::ledger::models::{Account, Address, FeeDescriptor, Network, TokenBalance};

/// Ledger client facade
///
/// Everything the orchestrators do on-chain goes through this trait:
/// head lookups, balance queries, transmission, and batched escrow-account
/// creation. Implementations are per-network sessions.
///
/// INVARIANTS:
/// - `transmit` must reject a block whose `previous` is not the current
///   head of its account with `LedgerError::Conflict`.
/// - `create_escrow_accounts` must create the whole batch in one
///   transaction or fail as a unit.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn network(&self) -> Network;

    /// Native token of the ledger, used for fees
    fn base_token(&self) -> Address;

    /// Settle any pending client-side state with the network
    async fn sync(&self) -> Result<(), LedgerError>;

    /// Current head block of an account, or `None` for a fresh account
    async fn head(&self, account: &Address) -> Result<Option<BlockHash>, LedgerError>;

    async fn all_balances(&self, account: &Address) -> Result<Vec<TokenBalance>, LedgerError>;

    /// Transmit sealed blocks. If the network quotes a fee, a base-token
    /// fee block is built from `fee_payer` and attached.
    async fn transmit(
        &self,
        blocks: Vec<SealedBlock>,
        fee_payer: &Account,
    ) -> Result<(), LedgerError>;

    /// Create `count` escrow (storage) accounts with open hold/deposit
    /// permissions, signed by `creator`, in a single transaction.
    async fn create_escrow_accounts(
        &self,
        creator: &Account,
        count: usize,
    ) -> Result<Vec<Address>, LedgerError>;
}

/// Build the fee-payment block answering a network fee quote: a single
/// base-token SEND from the paying account to the quoted recipient.
pub fn build_fee_block(
    payer: &Account,
    network: Network,
    previous: Option<BlockHash>,
    base_token: Address,
    fee: &FeeDescriptor,
) -> Result<SealedBlock, LedgerError> {
    BlockBuilder::new(
        payer.address().clone(),
        payer.clone(),
        network,
        Previous::from(previous),
    )
    .add_operation(Operation::Send {
        to: fee.pay_to.clone(),
        amount: fee.amount,
        token: base_token,
    })
    .seal()
}
