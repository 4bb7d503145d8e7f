use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LedgerError;
use crate::ledger::block::{BlockHash, Operation, Previous, SealedBlock};
use crate::ledger::client::{build_fee_block, LedgerClient};
use crate::ledger::models::{Account, AccountKind, Address, FeeDescriptor, Network, TokenBalance};

#[derive(Default)]
struct State {
    heads: HashMap<Address, BlockHash>,
    balances: HashMap<Address, HashMap<Address, u128>>,
    transmitted: Vec<SealedBlock>,
    transmit_calls: usize,
    create_calls: usize,
    /// Fail the Nth transmit call (1-based), once
    fail_on_transmit: Option<usize>,
    fee: Option<FeeDescriptor>,
}

/// In-memory ledger used by tests and local development.
///
/// Applies SEND operations to balances, enforces head-block sequencing,
/// and supports scripted transmit failures.
pub struct InMemoryLedger {
    network: Network,
    base_token: Address,
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new(network: Network, base_token: Address) -> Self {
        Self {
            network,
            base_token,
            state: Mutex::new(State::default()),
        }
    }

    pub fn set_balance(&self, account: &Address, token: &Address, amount: u128) {
        let mut state = self.state.lock();
        state
            .balances
            .entry(account.clone())
            .or_default()
            .insert(token.clone(), amount);
    }

    pub fn balance_of(&self, account: &Address, token: &Address) -> u128 {
        let state = self.state.lock();
        state
            .balances
            .get(account)
            .and_then(|by_token| by_token.get(token))
            .copied()
            .unwrap_or(0)
    }

    pub fn transmit_calls(&self) -> usize {
        self.state.lock().transmit_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }

    pub fn transmitted(&self) -> Vec<SealedBlock> {
        self.state.lock().transmitted.clone()
    }

    pub fn fail_on_transmit(&self, nth: usize) {
        self.state.lock().fail_on_transmit = Some(nth);
    }

    pub fn quote_fee(&self, fee: FeeDescriptor) {
        self.state.lock().fee = Some(fee);
    }

    fn apply(state: &mut State, block: &SealedBlock) -> Result<(), LedgerError> {
        let current = state.heads.get(&block.body.account).copied();
        let matches_head = match (&block.body.previous, current) {
            (Previous::None, None) => true,
            (Previous::Hash(h), Some(cur)) => *h == cur,
            _ => false,
        };
        if !matches_head {
            return Err(LedgerError::Conflict(block.body.account.to_string()));
        }

        for operation in &block.body.operations {
            match operation {
                Operation::Send { to, amount, token } => {
                    let available = state
                        .balances
                        .get(&block.body.account)
                        .and_then(|by_token| by_token.get(token))
                        .copied()
                        .unwrap_or(0);
                    if available < *amount {
                        return Err(LedgerError::InsufficientBalance {
                            account: block.body.account.to_string(),
                            token: token.to_string(),
                        });
                    }
                    state
                        .balances
                        .entry(block.body.account.clone())
                        .or_default()
                        .insert(token.clone(), available - amount);
                    let credited = state
                        .balances
                        .entry(to.clone())
                        .or_default()
                        .entry(token.clone())
                        .or_insert(0);
                    *credited += amount;
                }
                // Conditional receives settle only when the counterparty
                // executes the swap; nothing to apply here.
                Operation::Receive { .. } => {}
                Operation::CreateStorage { address } => {
                    state.balances.entry(address.clone()).or_default();
                }
            }
        }

        state.heads.insert(block.body.account.clone(), block.hash()?);
        state.transmitted.push(block.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    fn network(&self) -> Network {
        self.network
    }

    fn base_token(&self) -> Address {
        self.base_token.clone()
    }

    async fn sync(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn head(&self, account: &Address) -> Result<Option<BlockHash>, LedgerError> {
        Ok(self.state.lock().heads.get(account).copied())
    }

    async fn all_balances(&self, account: &Address) -> Result<Vec<TokenBalance>, LedgerError> {
        let state = self.state.lock();
        let mut balances: Vec<TokenBalance> = state
            .balances
            .get(account)
            .map(|by_token| {
                by_token
                    .iter()
                    .map(|(token, balance)| TokenBalance {
                        token: token.clone(),
                        balance: *balance,
                    })
                    .collect()
            })
            .unwrap_or_default();
        balances.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(balances)
    }

    async fn transmit(
        &self,
        blocks: Vec<SealedBlock>,
        fee_payer: &Account,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        state.transmit_calls += 1;

        if state.fail_on_transmit == Some(state.transmit_calls) {
            state.fail_on_transmit = None;
            return Err(LedgerError::Transport("injected transmit failure".into()));
        }

        for block in &blocks {
            Self::apply(&mut state, block)?;
        }

        if let Some(fee) = state.fee.clone() {
            let previous = state.heads.get(fee_payer.address()).copied();
            let fee_block = build_fee_block(
                fee_payer,
                self.network,
                previous,
                self.base_token.clone(),
                &fee,
            )?;
            Self::apply(&mut state, &fee_block)?;
        }

        Ok(())
    }

    async fn create_escrow_accounts(
        &self,
        creator: &Account,
        count: usize,
    ) -> Result<Vec<Address>, LedgerError> {
        creator.signing_key()?;

        let mut state = self.state.lock();
        state.create_calls += 1;

        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            let entropy: [u8; 32] = rand::random();
            let address = Address::from_key(AccountKind::Storage, &entropy);
            state.balances.entry(address.clone()).or_default();
            addresses.push(address);
        }
        Ok(addresses)
    }
}
