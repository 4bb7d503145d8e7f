use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::LedgerError;

/// Network the client operates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Test,
    Main,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Test => "test",
            Network::Main => "main",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account key class, encoded in the address prefix
///
/// Only `Network` accounts carry signing keys. `Storage` accounts are
/// derived identifiers that hold funds but sign nothing themselves;
/// `Token` accounts identify an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    Network,
    Storage,
    Token,
}

impl AccountKind {
    fn prefix(&self) -> &'static str {
        match self {
            AccountKind::Network => "acct_",
            AccountKind::Storage => "stor_",
            AccountKind::Token => "tok_",
        }
    }
}

/// Public address of an account on the ledger
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        let addr = Address(s.to_string());
        addr.kind().map(|_| addr)
    }

    pub fn from_key(kind: AccountKind, key_bytes: &[u8; 32]) -> Self {
        Address(format!("{}{}", kind.prefix(), hex::encode(key_bytes)))
    }

    pub fn kind(&self) -> Result<AccountKind, LedgerError> {
        if self.0.starts_with("acct_") {
            Ok(AccountKind::Network)
        } else if self.0.starts_with("stor_") {
            Ok(AccountKind::Storage)
        } else if self.0.starts_with("tok_") {
            Ok(AccountKind::Token)
        } else {
            Err(LedgerError::InvalidAddress(self.0.clone()))
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self.kind(), Ok(AccountKind::Token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account handle: an address plus optional signing material
#[derive(Clone)]
pub struct Account {
    address: Address,
    key: Option<SigningKey>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("has_key", &self.key.is_some())
            .finish()
    }
}

impl Account {
    /// Derive a signing account from a wallet seed at the given index
    pub fn from_seed(seed: &str, index: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(index.to_le_bytes());
        let digest: [u8; 32] = hasher.finalize().into();

        let key = SigningKey::from_bytes(&digest);
        let public: VerifyingKey = key.verifying_key();
        let address = Address::from_key(AccountKind::Network, public.as_bytes());

        Account {
            address,
            key: Some(key),
        }
    }

    /// Watch-only handle for an existing address
    pub fn from_address(address: Address) -> Self {
        Account { address, key: None }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn signing_key(&self) -> Result<&SigningKey, LedgerError> {
        self.key
            .as_ref()
            .ok_or_else(|| LedgerError::MissingKey(self.address.to_string()))
    }
}

/// Balance of a single token on an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: Address,
    pub balance: u128,
}

/// Fee quote attached to a vote staple by the network. The transmitting
/// client answers it with a base-token SEND from the paying account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDescriptor {
    pub pay_to: Address,
    pub amount: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_derivation_is_deterministic() {
        let a = Account::from_seed("seed-phrase", 0);
        let b = Account::from_seed("seed-phrase", 0);
        let c = Account::from_seed("seed-phrase", 1);

        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
        assert_eq!(a.address().kind().unwrap(), AccountKind::Network);
    }

    #[test]
    fn test_address_kind_from_prefix() {
        let token = Address::parse("tok_00ff").unwrap();
        let storage = Address::parse("stor_00ff").unwrap();

        assert!(token.is_token());
        assert!(!storage.is_token());
        assert_eq!(storage.kind().unwrap(), AccountKind::Storage);
        assert!(Address::parse("bogus_00ff").is_err());
    }
}
