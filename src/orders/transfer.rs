//! Plain SEND transfers: funding an escrow account from the signer, and
//! draining an escrow account under the signer's authority.

use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::block::{BlockBuilder, Operation, Previous, SealedBlock};
use crate::ledger::client::LedgerClient;
use crate::ledger::models::{Account, Address};

/// Build a single-SEND block for `from`, signed by `signer`
pub fn build_send_block(
    ledger: &dyn LedgerClient,
    from: &Address,
    signer: &Account,
    recipient: &Address,
    token: &Address,
    amount: u128,
    previous: Previous,
) -> Result<SealedBlock, LedgerError> {
    BlockBuilder::new(from.clone(), signer.clone(), ledger.network(), previous)
        .add_operation(Operation::Send {
            to: recipient.clone(),
            amount,
            token: token.clone(),
        })
        .seal()
}

/// Transfer `amount` of `token` from the signer's own account into an
/// escrow account. Shares the signer's head pointer: callers must issue
/// these sequentially, never concurrently.
pub async fn send_to_escrow(
    ledger: &dyn LedgerClient,
    signer: &Account,
    escrow: &Address,
    token: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    let previous = Previous::from(ledger.head(signer.address()).await?);
    let block = build_send_block(ledger, signer.address(), signer, escrow, token, amount, previous)?;
    debug!(%escrow, %token, amount, "funding escrow account");
    ledger.transmit(vec![block], signer).await
}

/// Send funds out of an escrow account using the signer's withdraw
/// authority over it
pub async fn send_from_escrow(
    ledger: &dyn LedgerClient,
    signer: &Account,
    escrow: &Address,
    recipient: &Address,
    token: &Address,
    amount: u128,
) -> Result<(), LedgerError> {
    let previous = Previous::from(ledger.head(escrow).await?);
    let block = build_send_block(ledger, escrow, signer, recipient, token, amount, previous)?;
    debug!(%escrow, %recipient, %token, amount, "draining escrow account");
    ledger.transmit(vec![block], signer).await
}
