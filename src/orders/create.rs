//! Order creation: allocates escrow accounts from the pool, builds the
//! first swap block per order, funds each escrow, and compensates on
//! failure (pool return/removal plus best-effort fund recovery).

use uuid::Uuid;
use validator::Validate;

use crate::context::AppContext;
use crate::error::{AppError, AppResult, OrderError};
use crate::ledger::models::{Account, Address};
use crate::orders::models::{
    CreateOrdersOutcome, CreateOrdersRequest, CreatedOrder, ForwardTarget,
};
use crate::orders::swap::{build_first_swap_block, SwapTerms};
use crate::orders::{recover, transfer};
use crate::progress::ProgressReporter;
use tracing::{error, info, warn};

/// Create a batch of orders.
///
/// The pool sufficiency check runs before any blockchain mutation, and
/// escrow addresses are peeked (not taken) so that a failure can return
/// untouched accounts verbatim. Funding transfers share the signer's head
/// pointer and are issued strictly in order-index order.
pub async fn create_orders(
    ctx: &AppContext,
    request: CreateOrdersRequest,
    request_id: Option<Uuid>,
) -> AppResult<CreateOrdersOutcome> {
    // Records from any previous run are stale now
    ctx.progress.clear_all();
    let progress = ProgressReporter::new(ctx.progress.as_ref(), request_id);

    request
        .validate()
        .map_err(|e| OrderError::Validation(e.to_string()))?;
    let dex_address = Address::parse(&request.dex_address)
        .map_err(|_| OrderError::Validation("DEX address is invalid".to_string()))?;

    progress.update("Initializing wallet...", 5);
    let session = ctx.session()?;
    let signer = session.signer().clone();

    progress.update("Syncing blockchain...", 10);
    ctx.ledger.sync().await?;

    progress.update("Retrieving storage accounts from pool...", 12);
    let needed = request.orders.len();
    let available = ctx.pool.size().await?;
    if available < needed {
        return Err(OrderError::InsufficientPool { needed, available }.into());
    }

    // Peek only: membership changes after the whole batch succeeds
    let allocated = ctx.pool.peek(needed).await?;
    let mut funded: Vec<Address> = Vec::new();

    match process_orders(
        ctx,
        &request,
        &signer,
        &dex_address,
        &allocated,
        &mut funded,
        &progress,
    )
    .await
    {
        Ok(orders) => {
            progress.update("Finalizing...", 95);
            // The allocated accounts are consumed for good
            ctx.pool.remove(&allocated).await?;
            session.touch();
            info!(count = orders.len(), "order creation succeeded");
            Ok(CreateOrdersOutcome {
                order_ids: Vec::new(),
                success: true,
                orders,
            })
        }
        Err(err) => {
            error!(error = %err, "order creation failed, compensating");
            compensate(ctx, &allocated, &funded, &progress).await;
            Err(err)
        }
    }
}

async fn process_orders(
    ctx: &AppContext,
    request: &CreateOrdersRequest,
    signer: &Account,
    dex_address: &Address,
    allocated: &[Address],
    funded: &mut Vec<Address>,
    progress: &ProgressReporter<'_>,
) -> AppResult<Vec<CreatedOrder>> {
    let total = request.orders.len();
    let owner = signer.address().clone();
    // Orders get equal slices of the 15%..95% progress range
    let progress_per_order = 80.0 / total as f64;
    let mut created = Vec::with_capacity(total);

    for (i, order) in request.orders.iter().enumerate() {
        let order_start = 15.0 + i as f64 * progress_per_order;
        progress.update(
            &format!("Creating order {} of {}...", i + 1, total),
            order_start as u8,
        );

        let (send_token, send_amount) = order.send_leg();
        let (receive_token, receive_amount) = order.receive_leg();
        let escrow = &allocated[i];

        let forward = match order.forward_to.clone().unwrap_or(ForwardTarget::Owner) {
            ForwardTarget::NextInChain if i + 1 < total => allocated[i + 1].clone(),
            // A trailing NEXT_ORDER has no successor; fall back to owner
            ForwardTarget::NextInChain => owner.clone(),
            ForwardTarget::Explicit(addr) => addr,
            ForwardTarget::Owner => owner.clone(),
        };

        progress.update(
            &format!("Generating swap blocks for order {}...", i + 1),
            (order_start + progress_per_order * 0.3) as u8,
        );
        let terms = SwapTerms {
            send_token: send_token.clone(),
            send_amount,
            receive_token: receive_token.clone(),
            receive_amount,
            forward: Some(forward),
        };
        let first_block_hex =
            build_first_swap_block(ctx.ledger.as_ref(), escrow, signer, dex_address, &terms)
                .await?;

        if order.skip_funding {
            // Delivered by the previous order's forward instead
            progress.update(
                &format!("Order {} will be funded by previous order...", i + 1),
                (order_start + progress_per_order * 0.7) as u8,
            );
        } else {
            progress.update(
                &format!("Transferring tokens for order {}...", i + 1),
                (order_start + progress_per_order * 0.7) as u8,
            );
            transfer::send_to_escrow(ctx.ledger.as_ref(), signer, escrow, send_token, send_amount)
                .await?;
            funded.push(escrow.clone());
        }

        created.push(CreatedOrder {
            order_storage_address: escrow.clone(),
            first_block_hex,
            first_token_address: order.first_token_address.clone(),
            second_token_address: order.second_token_address.clone(),
            buy_amount: order.buy_amount,
            sell_amount: order.sell_amount,
            owner_address: owner.clone(),
            price_digits: order.price_digits,
            price_zeros: order.price_zeros,
        });
    }

    Ok(created)
}

/// Unwind a failed batch: unfunded escrows go back to the pool verbatim,
/// funded ones are consumed and drained best-effort. Compensation failures
/// are logged and never mask the original error.
async fn compensate(
    ctx: &AppContext,
    allocated: &[Address],
    funded: &[Address],
    progress: &ProgressReporter<'_>,
) {
    let unfunded: Vec<Address> = allocated
        .iter()
        .filter(|addr| !funded.contains(addr))
        .cloned()
        .collect();

    if !unfunded.is_empty() {
        match ctx.pool.give_back(&unfunded).await {
            Ok(()) => info!(count = unfunded.len(), "returned unused escrow accounts to pool"),
            Err(e) => warn!(error = %e, "failed to return escrow accounts to pool"),
        }
    }

    if funded.is_empty() {
        return;
    }
    if let Err(e) = ctx.pool.remove(funded).await {
        warn!(error = %e, "failed to remove funded escrow accounts from pool");
    }

    progress.update("Recovering transferred funds...", 98);
    match recover::recover_from_escrow_accounts(ctx, funded.to_vec(), None).await {
        Ok(report) => info!(
            recovered = report.recovered.len(),
            failed = report.failed.len(),
            "fund recovery after failed order creation finished"
        ),
        Err(e) => error!(error = %e, "failed to recover funds from escrow accounts"),
    }
}
