use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::block::{BlockHash, Operation, Previous, SealedBlock};
use crate::ledger::client::{build_fee_block, LedgerClient};
use crate::ledger::models::{Account, AccountKind, Address, FeeDescriptor, Network, TokenBalance};

#[derive(Deserialize)]
struct HeadResponse {
    hash: Option<String>,
}

#[derive(Deserialize)]
struct BalanceEntry {
    token: String,
    balance: String,
}

#[derive(Deserialize)]
struct VoteResponse {
    fee: Option<FeeQuote>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeQuote {
    pay_to: String,
    amount: String,
}

/// Ledger client talking to a node's REST API
pub struct RestLedger {
    http: reqwest::Client,
    node_url: String,
    network: Network,
    base_token: Address,
}

impl RestLedger {
    pub fn new(node_url: String, network: Network, base_token: Address) -> Self {
        Self {
            http: reqwest::Client::new(),
            node_url: node_url.trim_end_matches('/').to_string(),
            network,
            base_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.node_url, path)
    }

    fn blocks_payload(blocks: &[SealedBlock]) -> Result<Vec<String>, LedgerError> {
        blocks
            .iter()
            .map(|b| b.to_bytes().map(hex::encode))
            .collect()
    }

    /// Ask the network to vote on the blocks; the response may carry a fee
    /// quote that must be answered with a fee block.
    async fn request_vote(&self, blocks: &[String]) -> Result<Option<FeeDescriptor>, LedgerError> {
        let response = self
            .http
            .post(self.url("/vote"))
            .json(&json!({ "blocks": blocks }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if response.status() == StatusCode::CONFLICT {
            return Err(LedgerError::Conflict("vote rejected: stale previous".into()));
        }
        let vote: VoteResponse = response
            .error_for_status()
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        vote.fee
            .map(|quote| {
                let amount = quote
                    .amount
                    .parse::<u128>()
                    .map_err(|e| LedgerError::Transport(format!("bad fee amount: {e}")))?;
                Ok(FeeDescriptor {
                    pay_to: Address::parse(&quote.pay_to)?,
                    amount,
                })
            })
            .transpose()
    }
}

/// The fee block must chain onto the payer's last block within the batch;
/// reading the pre-transmit head would have two blocks claim the same
/// `previous` whenever the payer also authored a main block.
fn fee_block_previous(
    blocks: &[SealedBlock],
    payer: &Address,
) -> Result<Option<BlockHash>, LedgerError> {
    blocks
        .iter()
        .rev()
        .find(|b| b.body.account == *payer)
        .map(|b| b.hash())
        .transpose()
}

#[async_trait]
impl LedgerClient for RestLedger {
    fn network(&self) -> Network {
        self.network
    }

    fn base_token(&self) -> Address {
        self.base_token.clone()
    }

    async fn sync(&self) -> Result<(), LedgerError> {
        self.http
            .post(self.url("/sync"))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn head(&self, account: &Address) -> Result<Option<BlockHash>, LedgerError> {
        let response = self
            .http
            .get(self.url(&format!("/accounts/{account}/head")))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let head: HeadResponse = response
            .error_for_status()
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        head.hash
            .map(|h| {
                let raw = hex::decode(&h)
                    .map_err(|e| LedgerError::Codec(format!("bad head hash: {e}")))?;
                let bytes: [u8; 32] = raw
                    .try_into()
                    .map_err(|_| LedgerError::Codec("head hash is not 32 bytes".into()))?;
                Ok(BlockHash(bytes))
            })
            .transpose()
    }

    async fn all_balances(&self, account: &Address) -> Result<Vec<TokenBalance>, LedgerError> {
        let entries: Vec<BalanceEntry> = self
            .http
            .get(self.url(&format!("/accounts/{account}/balances")))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        entries
            .into_iter()
            .map(|entry| {
                Ok(TokenBalance {
                    token: Address::parse(&entry.token)?,
                    balance: entry
                        .balance
                        .parse::<u128>()
                        .map_err(|e| LedgerError::Transport(format!("bad balance: {e}")))?,
                })
            })
            .collect()
    }

    async fn transmit(
        &self,
        blocks: Vec<SealedBlock>,
        fee_payer: &Account,
    ) -> Result<(), LedgerError> {
        let mut payload = Self::blocks_payload(&blocks)?;

        if let Some(fee) = self.request_vote(&payload).await? {
            debug!(amount = fee.amount, "attaching fee block");
            let previous = match fee_block_previous(&blocks, fee_payer.address())? {
                Some(hash) => Some(hash),
                None => self.head(fee_payer.address()).await?,
            };
            let fee_block = build_fee_block(
                fee_payer,
                self.network,
                previous,
                self.base_token.clone(),
                &fee,
            )?;
            payload.push(hex::encode(fee_block.to_bytes()?));
        }

        let response = self
            .http
            .post(self.url("/transmit"))
            .json(&json!({ "blocks": payload }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if response.status() == StatusCode::CONFLICT {
            return Err(LedgerError::Conflict("transmit rejected: stale previous".into()));
        }
        response
            .error_for_status()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn create_escrow_accounts(
        &self,
        creator: &Account,
        count: usize,
    ) -> Result<Vec<Address>, LedgerError> {
        let mut addresses = Vec::with_capacity(count);
        let previous = self.head(creator.address()).await?;
        let mut builder = crate::ledger::block::BlockBuilder::new(
            creator.address().clone(),
            creator.clone(),
            self.network,
            Previous::from(previous),
        );

        // One batched block creates the whole set of derived identifiers
        for _ in 0..count {
            let entropy: [u8; 32] = rand::random();
            let address = Address::from_key(AccountKind::Storage, &entropy);
            builder = builder.add_operation(Operation::CreateStorage {
                address: address.clone(),
            });
            addresses.push(address);
        }

        let block = builder.seal()?;
        self.transmit(vec![block], creator).await?;
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::block::BlockBuilder;
    use crate::ledger::memory::InMemoryLedger;

    fn send_block(from: &Account, to: &Address, token: &Address, previous: Previous) -> SealedBlock {
        BlockBuilder::new(from.address().clone(), from.clone(), Network::Test, previous)
            .add_operation(Operation::Send {
                to: to.clone(),
                amount: 1,
                token: token.clone(),
            })
            .seal()
            .unwrap()
    }

    #[test]
    fn test_fee_previous_is_the_payers_last_block_in_the_batch() {
        let payer = Account::from_seed("payer", 0);
        let other = Account::from_seed("other", 0);
        let token = Address::parse("tok_base").unwrap();
        let sink = Address::parse("stor_0001").unwrap();

        let first = send_block(&payer, &sink, &token, Previous::None);
        let second = send_block(&payer, &sink, &token, Previous::Hash(first.hash().unwrap()));
        let unrelated = send_block(&other, &sink, &token, Previous::None);

        let batch = vec![first, second.clone(), unrelated];
        let previous = fee_block_previous(&batch, payer.address()).unwrap();
        assert_eq!(previous, Some(second.hash().unwrap()));

        // A payer absent from the batch falls back to the head lookup
        let foreign = Account::from_seed("foreign", 0);
        assert_eq!(fee_block_previous(&batch, foreign.address()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fee_block_chained_within_the_batch_sequences_cleanly() {
        let base = Address::parse("tok_base").unwrap();
        let payer = Account::from_seed("payer", 0);
        let escrow = Address::parse("stor_e5c9").unwrap();
        let collector = Address::parse("acct_feec").unwrap();
        let fee = FeeDescriptor {
            pay_to: collector.clone(),
            amount: 3,
        };
        let main = send_block(&payer, &escrow, &base, Previous::None);

        // Both blocks claiming the pre-transmit head is a conflict
        let ledger = InMemoryLedger::new(Network::Test, base.clone());
        ledger.set_balance(payer.address(), &base, 100);
        let stale = build_fee_block(&payer, Network::Test, None, base.clone(), &fee).unwrap();
        let result = ledger.transmit(vec![main.clone(), stale], &payer).await;
        assert!(matches!(result, Err(LedgerError::Conflict(_))));

        // Chained onto the payer's last batch block it lands
        let ledger = InMemoryLedger::new(Network::Test, base.clone());
        ledger.set_balance(payer.address(), &base, 100);
        let previous = fee_block_previous(std::slice::from_ref(&main), payer.address()).unwrap();
        let chained = build_fee_block(&payer, Network::Test, previous, base.clone(), &fee).unwrap();
        ledger.transmit(vec![main, chained], &payer).await.unwrap();
        assert_eq!(ledger.balance_of(&collector, &base), 3);
        assert_eq!(ledger.balance_of(payer.address(), &base), 96);
    }
}
