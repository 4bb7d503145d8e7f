//! Atomic swap block construction and decoding.
//!
//! A swap block holds exactly two operations: a SEND (escrow pays the
//! counterparty a fixed amount of token A) and a conditional exact RECEIVE
//! (escrow accepts token B from the same counterparty, optionally
//! forwarding it onward). The block is valid from its embedded timestamp.

use crate::error::LedgerError;
use crate::ledger::block::{BlockBody, BlockBuilder, Operation, Previous, SealedBlock};
use crate::ledger::client::LedgerClient;
use crate::ledger::models::{Account, Address};

use borsh::BorshDeserialize;

/// The two legs of a swap commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTerms {
    pub send_token: Address,
    pub send_amount: u128,
    pub receive_token: Address,
    pub receive_amount: u128,
    pub forward: Option<Address>,
}

/// Terms recovered from a registered block's unsigned bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    pub escrow: Address,
    pub counterparty: Address,
    pub terms: SwapTerms,
}

/// Build one sealed swap block for `escrow`, signed by `creator`, with the
/// DEX `counterparty` on both legs.
///
/// `override_time_ms` mints a block valid at a future (or epoch-marker)
/// instant without touching any other field; `None` means "now".
pub fn build_swap_block(
    ledger: &dyn LedgerClient,
    escrow: &Address,
    creator: &Account,
    counterparty: &Address,
    terms: &SwapTerms,
    previous: Previous,
    override_time_ms: Option<u64>,
) -> Result<SealedBlock, LedgerError> {
    // Token references must be token-typed accounts; fail before building
    if !terms.send_token.is_token() {
        return Err(LedgerError::InvalidToken(terms.send_token.to_string()));
    }
    if !terms.receive_token.is_token() {
        return Err(LedgerError::InvalidToken(terms.receive_token.to_string()));
    }

    let mut builder = BlockBuilder::new(
        escrow.clone(),
        creator.clone(),
        ledger.network(),
        previous,
    );
    if let Some(ts) = override_time_ms {
        builder = builder.timestamp_ms(ts);
    }

    builder
        .add_operation(Operation::Send {
            to: counterparty.clone(),
            amount: terms.send_amount,
            token: terms.send_token.clone(),
        })
        .add_operation(Operation::Receive {
            from: counterparty.clone(),
            amount: terms.receive_amount,
            token: terms.receive_token.clone(),
            exact: true,
            forward: terms.forward.clone(),
        })
        .seal()
}

/// Build the first swap block of a fresh escrow account: no previous block,
/// epoch-marker timestamp so the commitment is immediately valid. Returns
/// the sealed bytes as hex for registration.
pub async fn build_first_swap_block(
    ledger: &dyn LedgerClient,
    escrow: &Address,
    creator: &Account,
    counterparty: &Address,
    terms: &SwapTerms,
) -> Result<String, LedgerError> {
    let previous = Previous::from(ledger.head(escrow).await?);
    let block = build_swap_block(
        ledger,
        escrow,
        creator,
        counterparty,
        terms,
        previous,
        Some(0),
    )?;
    Ok(hex::encode(block.to_bytes()?))
}

/// Recover the exact terms from a registered block's unsigned bytes.
///
/// Extension blocks must carry bit-identical amounts to the original
/// commitment, so the registration is decoded rather than recomputed.
pub fn decode_swap_block(unsigned_bytes: &[u8]) -> Result<DecodedSwap, LedgerError> {
    let body =
        BlockBody::try_from_slice(unsigned_bytes).map_err(|e| LedgerError::Codec(e.to_string()))?;

    let mut send: Option<(Address, Address, u128)> = None;
    let mut receive: Option<(Address, u128, Option<Address>)> = None;
    for operation in &body.operations {
        match operation {
            Operation::Send { to, amount, token } => {
                send = Some((to.clone(), token.clone(), *amount));
            }
            Operation::Receive {
                amount,
                token,
                forward,
                ..
            } => {
                receive = Some((token.clone(), *amount, forward.clone()));
            }
            Operation::CreateStorage { .. } => {}
        }
    }

    let (counterparty, send_token, send_amount) =
        send.ok_or_else(|| LedgerError::Codec("block has no SEND operation".into()))?;
    let (receive_token, receive_amount, forward) =
        receive.ok_or_else(|| LedgerError::Codec("block has no RECEIVE operation".into()))?;

    if !send_token.is_token() || !receive_token.is_token() {
        return Err(LedgerError::InvalidToken(
            "decoded block references a non-token account".into(),
        ));
    }
    if send_amount == 0 || receive_amount == 0 {
        return Err(LedgerError::Codec(
            "could not extract amounts from unsigned bytes".into(),
        ));
    }

    Ok(DecodedSwap {
        escrow: body.account,
        counterparty,
        terms: SwapTerms {
            send_token,
            send_amount,
            receive_token,
            receive_amount,
            forward,
        },
    })
}

/// Parse registered `unsignedBytes`, accepting an optional 0x prefix
pub fn unsigned_bytes_from_hex(raw: &str) -> Result<Vec<u8>, LedgerError> {
    let trimmed = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(trimmed).map_err(|e| LedgerError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::models::Network;

    fn fixture() -> (InMemoryLedger, Account, Address, Address, SwapTerms) {
        let base = Address::parse("tok_base").unwrap();
        let ledger = InMemoryLedger::new(Network::Test, base);
        let creator = Account::from_seed("creator", 0);
        let counterparty = Address::parse("acct_0dex").unwrap();
        let escrow = Address::parse("stor_e5c1").unwrap();
        let terms = SwapTerms {
            send_token: Address::parse("tok_aaaa").unwrap(),
            send_amount: 1000,
            receive_token: Address::parse("tok_bbbb").unwrap(),
            receive_amount: 2000,
            forward: Some(Address::parse("stor_f0f0").unwrap()),
        };
        (ledger, creator, counterparty, escrow, terms)
    }

    #[test]
    fn test_amount_fidelity() {
        let (ledger, creator, counterparty, escrow, terms) = fixture();
        let block = build_swap_block(
            &ledger,
            &escrow,
            &creator,
            &counterparty,
            &terms,
            Previous::None,
            Some(0),
        )
        .unwrap();

        assert_eq!(block.body.operations.len(), 2);
        assert_eq!(
            block.body.operations[0],
            Operation::Send {
                to: counterparty.clone(),
                amount: 1000,
                token: terms.send_token.clone(),
            }
        );
        assert_eq!(
            block.body.operations[1],
            Operation::Receive {
                from: counterparty,
                amount: 2000,
                token: terms.receive_token,
                exact: true,
                forward: terms.forward,
            }
        );
    }

    #[test]
    fn test_timestamp_override_does_not_alter_amounts() {
        let (ledger, creator, counterparty, escrow, terms) = fixture();
        let early = build_swap_block(
            &ledger,
            &escrow,
            &creator,
            &counterparty,
            &terms,
            Previous::None,
            Some(1_000),
        )
        .unwrap();
        let late = build_swap_block(
            &ledger,
            &escrow,
            &creator,
            &counterparty,
            &terms,
            Previous::None,
            Some(2_000),
        )
        .unwrap();

        assert_eq!(early.body.operations, late.body.operations);
        assert_eq!(early.body.timestamp_ms, 1_000);
        assert_eq!(late.body.timestamp_ms, 2_000);
    }

    #[test]
    fn test_non_token_reference_fails_fast() {
        let (ledger, creator, counterparty, escrow, mut terms) = fixture();
        terms.send_token = Address::parse("acct_nope").unwrap();

        let result = build_swap_block(
            &ledger,
            &escrow,
            &creator,
            &counterparty,
            &terms,
            Previous::None,
            None,
        );
        assert!(matches!(result, Err(LedgerError::InvalidToken(_))));
    }

    #[test]
    fn test_decode_recovers_exact_terms() {
        let (ledger, creator, counterparty, escrow, terms) = fixture();
        let block = build_swap_block(
            &ledger,
            &escrow,
            &creator,
            &counterparty,
            &terms,
            Previous::None,
            Some(0),
        )
        .unwrap();

        let decoded = decode_swap_block(&block.unsigned_bytes().unwrap()).unwrap();
        assert_eq!(decoded.escrow, escrow);
        assert_eq!(decoded.counterparty, counterparty);
        assert_eq!(decoded.terms, terms);
    }

    #[test]
    fn test_unsigned_bytes_hex_accepts_0x_prefix() {
        assert_eq!(unsigned_bytes_from_hex("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(unsigned_bytes_from_hex("dead").unwrap(), vec![0xde, 0xad]);
        assert!(unsigned_bytes_from_hex("zz").is_err());
    }
}
