use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::Validate;

use crate::ledger::models::Address;

/// Side of a requested swap. On the wire this is the legacy boolean
/// `orderType` (true = buy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl From<bool> for OrderSide {
    fn from(is_buy: bool) -> Self {
        if is_buy {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }
}

impl From<OrderSide> for bool {
    fn from(side: OrderSide) -> Self {
        side == OrderSide::Buy
    }
}

/// Where an order's received funds are routed on settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardTarget {
    /// Forward to a specific address
    Explicit(Address),
    /// Forward into the escrow of the next order in the chain
    NextInChain,
    /// Default: forward to the order owner
    Owner,
}

const NEXT_ORDER_TOKEN: &str = "NEXT_ORDER";
const OWNER_TOKEN: &str = "OWNER";

impl Serialize for ForwardTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ForwardTarget::Explicit(addr) => serializer.serialize_str(addr.as_str()),
            ForwardTarget::NextInChain => serializer.serialize_str(NEXT_ORDER_TOKEN),
            ForwardTarget::Owner => serializer.serialize_str(OWNER_TOKEN),
        }
    }
}

impl<'de> Deserialize<'de> for ForwardTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            NEXT_ORDER_TOKEN => Ok(ForwardTarget::NextInChain),
            OWNER_TOKEN | "" => Ok(ForwardTarget::Owner),
            other => Address::parse(other)
                .map(ForwardTarget::Explicit)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// One requested atomic swap
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub first_token_address: Address,
    pub second_token_address: Address,
    pub buy_amount: u128,
    pub sell_amount: u128,
    #[serde(rename = "orderType")]
    pub side: OrderSide,
    pub price_digits: u32,
    pub price_zeros: u32,
    /// Funded by the previous order's forward instead of a direct transfer
    #[serde(default)]
    pub skip_funding: bool,
    #[serde(default, rename = "forwardToAddress")]
    pub forward_to: Option<ForwardTarget>,
}

impl OrderRequest {
    /// Token and amount the escrow pays out.
    /// A buy sends the second token to acquire the first; a sell sends the
    /// first token to acquire the second.
    pub fn send_leg(&self) -> (&Address, u128) {
        match self.side {
            OrderSide::Buy => (&self.second_token_address, self.buy_amount),
            OrderSide::Sell => (&self.first_token_address, self.sell_amount),
        }
    }

    /// Token and exact amount the escrow accepts in return
    pub fn receive_leg(&self) -> (&Address, u128) {
        match self.side {
            OrderSide::Buy => (&self.first_token_address, self.sell_amount),
            OrderSide::Sell => (&self.second_token_address, self.buy_amount),
        }
    }
}

/// Batch order-creation request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrdersRequest {
    #[validate(length(min = 1, message = "No orders provided"))]
    pub orders: Vec<OrderRequest>,
    #[validate(length(min = 1, message = "DEX address is required"))]
    pub dex_address: String,
}

/// Per-order result handed back for GraphQL registration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_storage_address: Address,
    pub first_block_hex: String,
    pub first_token_address: Address,
    pub second_token_address: Address,
    pub buy_amount: u128,
    pub sell_amount: u128,
    pub owner_address: Address,
    pub price_digits: u32,
    pub price_zeros: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrdersOutcome {
    pub order_ids: Vec<String>,
    pub success: bool,
    pub orders: Vec<CreatedOrder>,
}

/// Backend projection of an open order; the Extension Scheduler's read
/// model, treated as ground truth for what the escrow currently holds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAtomicOrder {
    pub id: String,
    pub escrow_address: Address,
    pub first_token_address: Address,
    pub second_token_address: Address,
    pub buy_amount: String,
    pub sell_amount: String,
    /// Expiry of the most recent valid swap block
    pub valid_until: DateTime<Utc>,
    /// Hex of the originating block's unsigned bytes
    pub unsigned_bytes: Option<String>,
}

/// Per-address outcome summary of a recovery run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub success: bool,
    pub recovered: Vec<Address>,
    pub failed: Vec<Address>,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_request_wire_format() {
        let raw = serde_json::json!({
            "firstTokenAddress": "tok_aaaa",
            "secondTokenAddress": "tok_bbbb",
            "buyAmount": 1000,
            "sellAmount": 2000,
            "orderType": true,
            "priceDigits": 5,
            "priceZeros": 2,
            "forwardToAddress": "NEXT_ORDER"
        });
        let order: OrderRequest = serde_json::from_value(raw).unwrap();

        assert_eq!(order.side, OrderSide::Buy);
        assert!(!order.skip_funding);
        assert_eq!(order.forward_to, Some(ForwardTarget::NextInChain));

        // Buy sends the second token to acquire the first
        let (send_token, send_amount) = order.send_leg();
        assert_eq!(send_token.as_str(), "tok_bbbb");
        assert_eq!(send_amount, 1000);
        let (receive_token, receive_amount) = order.receive_leg();
        assert_eq!(receive_token.as_str(), "tok_aaaa");
        assert_eq!(receive_amount, 2000);
    }

    #[test]
    fn test_sell_legs_mirror_buy_legs() {
        let raw = serde_json::json!({
            "firstTokenAddress": "tok_aaaa",
            "secondTokenAddress": "tok_bbbb",
            "buyAmount": 10,
            "sellAmount": 20,
            "orderType": false,
            "priceDigits": 1,
            "priceZeros": 0
        });
        let order: OrderRequest = serde_json::from_value(raw).unwrap();

        let (send_token, send_amount) = order.send_leg();
        assert_eq!(send_token.as_str(), "tok_aaaa");
        assert_eq!(send_amount, 20);
        let (receive_token, receive_amount) = order.receive_leg();
        assert_eq!(receive_token.as_str(), "tok_bbbb");
        assert_eq!(receive_amount, 10);
    }

    #[test]
    fn test_order_request_serializes_back_to_wire_form() {
        let raw = serde_json::json!({
            "firstTokenAddress": "tok_aaaa",
            "secondTokenAddress": "tok_bbbb",
            "buyAmount": 1000,
            "sellAmount": 2000,
            "orderType": true,
            "priceDigits": 5,
            "priceZeros": 2,
            "skipFunding": false,
            "forwardToAddress": "NEXT_ORDER"
        });
        let order: OrderRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&order).unwrap(), raw);

        // Batch validation reports the failing value, which requires the
        // order itself to serialize
        let request = CreateOrdersRequest {
            orders: vec![],
            dex_address: "acct_0dex".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_forward_target_parses_explicit_address() {
        let target: ForwardTarget = serde_json::from_value(serde_json::json!("stor_cafe")).unwrap();
        assert_eq!(
            target,
            ForwardTarget::Explicit(Address::parse("stor_cafe").unwrap())
        );

        let bogus = serde_json::from_value::<ForwardTarget>(serde_json::json!("junk"));
        assert!(bogus.is_err());
    }
}
