use borsh::{BorshDeserialize, BorshSerialize};
use chrono::Utc;
use ed25519_dalek::Signer;
use sha2::{Digest, Sha256};

use crate::error::LedgerError;
use crate::ledger::models::{Account, Address, Network};

/// Hash of a sealed block, used as the `previous` reference of its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// `previous` reference of a block. `None` is the sentinel for the first
/// block of a brand-new account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Previous {
    None,
    Hash(BlockHash),
}

impl From<Option<BlockHash>> for Previous {
    fn from(hash: Option<BlockHash>) -> Self {
        match hash {
            Some(h) => Previous::Hash(h),
            None => Previous::None,
        }
    }
}

/// A single ledger operation inside a block
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Operation {
    Send {
        to: Address,
        amount: u128,
        token: Address,
    },
    Receive {
        from: Address,
        amount: u128,
        token: Address,
        /// Exact-amount receive: partial fills are rejected by the network
        exact: bool,
        /// Re-route received funds to this address on settlement
        forward: Option<Address>,
    },
    /// Create a derived storage account with open hold/deposit permissions
    CreateStorage { address: Address },
}

/// The signed-over portion of a block
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockBody {
    pub account: Address,
    pub signer: Address,
    pub network: String,
    pub previous: Previous,
    /// Milliseconds since the epoch; the block is valid from this instant
    pub timestamp_ms: u64,
    pub operations: Vec<Operation>,
}

/// An immutable, sealed block: body plus detached signature
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SealedBlock {
    pub body: BlockBody,
    pub signature: Vec<u8>,
}

impl SealedBlock {
    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        borsh::to_vec(self).map_err(|e| LedgerError::Codec(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        SealedBlock::try_from_slice(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
    }

    /// The body without its signature, as registered with the backend
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        borsh::to_vec(&self.body).map_err(|e| LedgerError::Codec(e.to_string()))
    }

    pub fn hash(&self) -> Result<BlockHash, LedgerError> {
        let unsigned = self.unsigned_bytes()?;
        let digest: [u8; 32] = Sha256::digest(&unsigned).into();
        Ok(BlockHash(digest))
    }
}

/// Builds and seals one block for one account
pub struct BlockBuilder {
    account: Address,
    signer: Account,
    network: Network,
    previous: Previous,
    timestamp_ms: u64,
    operations: Vec<Operation>,
}

impl BlockBuilder {
    pub fn new(account: Address, signer: Account, network: Network, previous: Previous) -> Self {
        Self {
            account,
            signer,
            network,
            previous,
            timestamp_ms: Utc::now().timestamp_millis() as u64,
            operations: Vec::new(),
        }
    }

    /// Override the block timestamp. Used to mint forward-dated blocks
    /// without altering any other field.
    pub fn timestamp_ms(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn add_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Sign the body with the signer's key and freeze the block
    pub fn seal(self) -> Result<SealedBlock, LedgerError> {
        let body = BlockBody {
            account: self.account,
            signer: self.signer.address().clone(),
            network: self.network.as_str().to_string(),
            previous: self.previous,
            timestamp_ms: self.timestamp_ms,
            operations: self.operations,
        };

        let unsigned = borsh::to_vec(&body).map_err(|e| LedgerError::Codec(e.to_string()))?;
        let signature = self.signer.signing_key()?.sign(&unsigned);

        Ok(SealedBlock {
            body,
            signature: signature.to_bytes().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(tag: &str) -> Address {
        Address::parse(&format!("tok_{tag}")).unwrap()
    }

    #[test]
    fn test_block_round_trips_through_bytes() {
        let signer = Account::from_seed("round-trip", 0);
        let escrow = Address::parse("stor_aa01").unwrap();

        let block = BlockBuilder::new(
            escrow.clone(),
            signer.clone(),
            Network::Test,
            Previous::None,
        )
        .timestamp_ms(1_700_000_000_000)
        .add_operation(Operation::Send {
            to: signer.address().clone(),
            amount: 1000,
            token: token("aaaa"),
        })
        .add_operation(Operation::Receive {
            from: signer.address().clone(),
            amount: 2000,
            token: token("bbbb"),
            exact: true,
            forward: Some(escrow.clone()),
        })
        .seal()
        .unwrap();

        let decoded = SealedBlock::from_bytes(&block.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.body.operations.len(), 2);
        assert_eq!(decoded.hash().unwrap(), block.hash().unwrap());
    }

    #[test]
    fn test_seal_requires_key_material() {
        let watch_only = Account::from_address(Address::parse("acct_cafe").unwrap());
        let escrow = Address::parse("stor_aa02").unwrap();

        let result = BlockBuilder::new(escrow, watch_only, Network::Test, Previous::None)
            .seal();
        assert!(matches!(result, Err(LedgerError::MissingKey(_))));
    }

    #[test]
    fn test_timestamp_override_changes_only_the_timestamp() {
        let signer = Account::from_seed("timestamps", 0);
        let escrow = Address::parse("stor_aa03").unwrap();
        let build = |ts: u64| {
            BlockBuilder::new(escrow.clone(), signer.clone(), Network::Test, Previous::None)
                .timestamp_ms(ts)
                .add_operation(Operation::Send {
                    to: signer.address().clone(),
                    amount: 42,
                    token: token("cccc"),
                })
                .seal()
                .unwrap()
        };

        let a = build(1_000);
        let b = build(2_000);
        assert_eq!(a.body.operations, b.body.operations);
        assert_ne!(a.body.timestamp_ms, b.body.timestamp_ms);
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }
}
