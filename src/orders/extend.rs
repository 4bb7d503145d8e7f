//! Order extension: regenerate an order's swap commitment as a batch of
//! forward-dated blocks, upload them as a file, and register the file with
//! the backend.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::error::{AppError, AppResult, LedgerError, OrderError};
use crate::ledger::block::{Previous, SealedBlock};
use crate::ledger::client::LedgerClient;
use crate::ledger::models::{Account, Address};
use crate::orders::models::OpenAtomicOrder;
use crate::orders::swap::{build_swap_block, decode_swap_block, unsigned_bytes_from_hex, SwapTerms};

/// Sub-state of one order's extension run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum ExtendPhase {
    Generating,
    Uploading,
    Registering,
    Completed,
    Failed,
}

/// Observable progress of one order's extension
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionProgress {
    pub order_id: String,
    pub phase: ExtendPhase,
    pub done: u64,
    pub total: u64,
    pub error: Option<String>,
    /// Timeout-class failure: the work may still be in flight server-side
    pub is_timeout: bool,
    pub started_at: DateTime<Utc>,
}

/// Per-order extension status, keyed by order id
#[derive(Default)]
pub struct ExtensionStatusBoard {
    records: RwLock<HashMap<String, ExtensionProgress>>,
}

impl ExtensionStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, order_id: &str, phase: ExtendPhase, done: u64, total: u64) {
        let mut records = self.records.write();
        let started_at = records
            .get(order_id)
            .map(|r| r.started_at)
            .unwrap_or_else(Utc::now);
        records.insert(
            order_id.to_string(),
            ExtensionProgress {
                order_id: order_id.to_string(),
                phase,
                done,
                total,
                error: None,
                is_timeout: false,
                started_at,
            },
        );
    }

    fn fail(&self, order_id: &str, message: String, is_timeout: bool) {
        self.records.write().insert(
            order_id.to_string(),
            ExtensionProgress {
                order_id: order_id.to_string(),
                phase: ExtendPhase::Failed,
                done: 0,
                total: 0,
                error: Some(message),
                is_timeout,
                started_at: Utc::now(),
            },
        );
    }

    pub fn snapshot(&self, order_id: &str) -> Option<ExtensionProgress> {
        self.records.read().get(order_id).cloned()
    }

    pub fn clear(&self, order_id: &str) {
        self.records.write().remove(order_id);
    }
}

/// Backend 504s and gateway timeouts are reported differently to the user:
/// the registration may still complete server-side.
pub fn is_timeout_like(message: &str) -> bool {
    message.contains("504")
        || message.to_ascii_lowercase().contains("timeout")
        || message.contains("Gateway Timeout")
}

/// Whether an order is already expired or expiring within the threshold
pub fn needs_extension(order: &OpenAtomicOrder, now: DateTime<Utc>, threshold_days: u64) -> bool {
    let threshold = chrono::Duration::days(threshold_days as i64);
    order.valid_until - now < threshold
}

/// Periodic sweep: extend every open order nearing expiry.
///
/// Orders are processed strictly sequentially. All extension blocks are
/// signed against the same wallet; interleaving two orders' work would
/// race on the signer's on-chain head sequencing. A single order's
/// failure is logged and the loop proceeds.
pub async fn check_and_extend_orders(ctx: &AppContext, board: &ExtensionStatusBoard) -> AppResult<()> {
    if !ctx.settings.auto_extend_orders() {
        return Ok(());
    }
    let session = match ctx.session() {
        Ok(session) => session,
        // Locked wallet: nothing to sign with, try again next tick
        Err(_) => return Ok(()),
    };
    session.touch();

    let lookahead = Utc::now()
        + chrono::Duration::days(ctx.config.extension.lookahead_days as i64);
    let orders = ctx
        .backend
        .list_open_atomic_orders_full_chain(session.owner_address().as_str(), lookahead)
        .await?;
    if orders.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let threshold = ctx.config.extension.auto_extend_threshold_days;
    let due: Vec<&OpenAtomicOrder> = orders
        .iter()
        .filter(|order| needs_extension(order, now, threshold))
        .collect();
    if due.is_empty() {
        return Ok(());
    }
    info!(count = due.len(), "extending orders nearing expiry");

    for order in due {
        ctx.set_currently_extending(Some(order.id.clone()));
        if let Err(e) = extend_order(ctx, board, order).await {
            error!(order_id = %order.id, error = %e, "failed to extend order");
        }
        // A failed order must not linger as "extending" while the next
        // one is processed
        ctx.set_currently_extending(None);
    }
    Ok(())
}

/// Extend one order by a full run of forward-dated blocks
pub async fn extend_order(
    ctx: &AppContext,
    board: &ExtensionStatusBoard,
    order: &OpenAtomicOrder,
) -> AppResult<()> {
    board.set(&order.id, ExtendPhase::Generating, 0, 0);

    match extend_order_inner(ctx, board, order).await {
        Ok(count) => {
            info!(order_id = %order.id, blocks = count, "order extended");
            Ok(())
        }
        Err(err) => {
            let message = err.to_string();
            let is_timeout = is_timeout_like(&message);
            let user_message = if is_timeout {
                "Server timeout - the request is still processing. \
                 Please check order status in a few minutes."
                    .to_string()
            } else {
                message
            };
            board.fail(&order.id, user_message, is_timeout);
            Err(err)
        }
    }
}

async fn extend_order_inner(
    ctx: &AppContext,
    board: &ExtensionStatusBoard,
    order: &OpenAtomicOrder,
) -> AppResult<u64> {
    let session = ctx.session()?;
    let signer = session.signer().clone();
    ctx.ledger.sync().await?;

    // The registration stores only unsigned bytes; decode them so the
    // extension carries bit-identical amounts to the original commitment
    let raw = order
        .unsigned_bytes
        .as_deref()
        .ok_or_else(|| OrderError::MissingUnsignedBytes(order.id.clone()))?;
    let decoded = decode_swap_block(&unsigned_bytes_from_hex(raw)?)?;

    let previous = Previous::from(ctx.ledger.head(&order.escrow_address).await?);

    // Extension starts at the later of "now" and the current expiry:
    // no gaps, never backwards
    let now = Utc::now();
    let start = if order.valid_until < now {
        now
    } else {
        order.valid_until
    };
    let start_ms = start.timestamp_millis() as u64;

    let settings = &ctx.config.extension;
    let total = settings.blocks_per_run();
    board.set(&order.id, ExtendPhase::Generating, 0, total);

    let blocks = generate_extension_blocks(
        ctx.ledger.as_ref(),
        &order.escrow_address,
        &signer,
        &decoded.counterparty,
        &decoded.terms,
        previous,
        start_ms,
        settings.minutes_apart,
        total,
        settings.generation_batch,
        |done| board.set(&order.id, ExtendPhase::Generating, done, total),
    )
    .await?;

    let mut blocks_hex = Vec::with_capacity(blocks.len());
    for block in &blocks {
        blocks_hex.push(hex::encode(block.to_bytes()?));
    }

    board.set(&order.id, ExtendPhase::Uploading, total, total);
    let start_dt = Utc
        .timestamp_millis_opt(start_ms as i64)
        .single()
        .ok_or_else(|| AppError::Internal("block start time out of range".into()))?;
    let file_url = ctx
        .backend
        .upload_blocks_file(&blocks_hex, start_dt, settings.minutes_apart)
        .await?;

    board.set(&order.id, ExtendPhase::Registering, total, total);
    // skip_validation: the blocks were just derived from a verified original
    ctx.backend
        .bulk_create_atomic_swap_block(&order.id, &file_url, total, start_dt, true)
        .await?;

    board.set(&order.id, ExtendPhase::Completed, total, total);
    Ok(total)
}

/// Generate `total` blocks timestamped `start_ms + i * minutes_apart`,
/// in bounded concurrent batches. Pure build-time parallelism: nothing
/// here touches the network per block.
#[allow(clippy::too_many_arguments)]
pub async fn generate_extension_blocks(
    ledger: &dyn LedgerClient,
    escrow: &Address,
    creator: &Account,
    counterparty: &Address,
    terms: &SwapTerms,
    previous: Previous,
    start_ms: u64,
    minutes_apart: u64,
    total: u64,
    batch_size: usize,
    mut on_batch: impl FnMut(u64),
) -> Result<Vec<SealedBlock>, LedgerError> {
    let mut blocks = Vec::with_capacity(total as usize);

    let mut batch_start = 0u64;
    while batch_start < total {
        let batch_end = (batch_start + batch_size as u64).min(total);
        let futures = (batch_start..batch_end).map(|i| {
            let override_ms = start_ms + i * minutes_apart * 60_000;
            async move {
                build_swap_block(
                    ledger,
                    escrow,
                    creator,
                    counterparty,
                    terms,
                    previous,
                    Some(override_ms),
                )
            }
        });
        for result in join_all(futures).await {
            blocks.push(result?);
        }
        on_batch(blocks.len() as u64);
        batch_start = batch_end;
    }

    if blocks.len() as u64 != total {
        warn!(
            built = blocks.len(),
            total, "extension block count mismatch"
        );
    }
    Ok(blocks)
}
