//! Fund recovery: drain every nonzero balance of the given escrow accounts
//! back to the owner. Best-effort and idempotent; a zero-balance account is
//! trivially recovered.

use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::ledger::models::Address;
use crate::orders::models::RecoveryReport;
use crate::orders::transfer::send_from_escrow;
use crate::progress::ProgressReporter;
use tracing::{info, warn};

/// Recover all token balances from `addresses` to the wallet owner.
///
/// Failures on one address never stop the others; the per-address outcome
/// lands in the report. Only session setup (locked wallet, sync failure)
/// propagates as an error.
pub async fn recover_from_escrow_accounts(
    ctx: &AppContext,
    addresses: Vec<Address>,
    request_id: Option<Uuid>,
) -> AppResult<RecoveryReport> {
    let progress = ProgressReporter::new(ctx.progress.as_ref(), request_id);

    if addresses.is_empty() {
        return Ok(RecoveryReport {
            success: true,
            recovered: Vec::new(),
            failed: Vec::new(),
            details: "No storage accounts to recover".to_string(),
        });
    }

    progress.update("Initializing wallet...", 5);
    let session = ctx.session()?;
    let signer = session.signer().clone();
    let owner = signer.address().clone();

    progress.update("Syncing blockchain...", 15);
    ctx.ledger.sync().await?;

    let total = addresses.len();
    let mut recovered = Vec::new();
    let mut failed = Vec::new();
    let mut details = Vec::new();
    let progress_per_account = 70.0 / total as f64;

    for (i, escrow) in addresses.iter().enumerate() {
        let start = 20.0 + i as f64 * progress_per_account;
        progress.update(
            &format!("Checking account {} of {}...", i + 1, total),
            start as u8,
        );

        match drain_account(ctx, &signer, escrow, &owner, &progress, start, progress_per_account)
            .await
        {
            Ok(0) => {
                details.push(format!("{escrow}: No token balances to recover"));
                recovered.push(escrow.clone());
            }
            Ok(tokens) => {
                details.push(format!("{escrow}: Recovered {tokens} token type(s)"));
                recovered.push(escrow.clone());
            }
            Err(e) => {
                warn!(%escrow, error = %e, "failed to recover from escrow account");
                details.push(format!("{escrow}: Failed - {e}"));
                failed.push(escrow.clone());
            }
        }
    }

    progress.update("Finalizing recovery...", 95);
    let summary = format!(
        "Recovered {} accounts, {} failed. {}",
        recovered.len(),
        failed.len(),
        details.join("; ")
    );
    info!(
        recovered = recovered.len(),
        failed = failed.len(),
        "fund recovery finished"
    );

    Ok(RecoveryReport {
        success: failed.is_empty(),
        recovered,
        failed,
        details: summary,
    })
}

/// Send every nonzero balance of one escrow back to the owner; returns the
/// number of token types moved
async fn drain_account(
    ctx: &AppContext,
    signer: &crate::ledger::models::Account,
    escrow: &Address,
    owner: &Address,
    progress: &ProgressReporter<'_>,
    start: f64,
    span: f64,
) -> AppResult<usize> {
    let balances = ctx.ledger.all_balances(escrow).await?;
    let mut moved = 0;

    for entry in balances {
        if entry.balance == 0 {
            continue;
        }
        progress.update(
            &format!("Recovering tokens from {escrow}..."),
            (start + span * 0.5) as u8,
        );
        send_from_escrow(
            ctx.ledger.as_ref(),
            signer,
            escrow,
            owner,
            &entry.token,
            entry.balance,
        )
        .await?;
        moved += 1;
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, OrderError};
    use crate::orders::testing::test_context;

    fn escrow(tag: &str) -> Address {
        Address::parse(&format!("stor_{tag}")).unwrap()
    }

    #[tokio::test]
    async fn test_empty_input_is_trivial_success() {
        let (ctx, _ledger) = test_context().await;
        // No session needed for the no-op path
        let report = recover_from_escrow_accounts(&ctx, vec![], None).await.unwrap();
        assert!(report.success);
        assert!(report.recovered.is_empty());
    }

    #[tokio::test]
    async fn test_drains_every_nonzero_balance_to_owner() {
        let (ctx, ledger) = test_context().await;
        let session = ctx.unlock("seed".into());
        let a = escrow("aaaa");
        let token_x = Address::parse("tok_xxxx").unwrap();
        let token_y = Address::parse("tok_yyyy").unwrap();
        ledger.set_balance(&a, &token_x, 500);
        ledger.set_balance(&a, &token_y, 7);

        let report = recover_from_escrow_accounts(&ctx, vec![a.clone()], None)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.recovered, vec![a.clone()]);
        assert_eq!(ledger.balance_of(&a, &token_x), 0);
        assert_eq!(ledger.balance_of(&a, &token_y), 0);
        assert_eq!(ledger.balance_of(session.owner_address(), &token_x), 500);
        assert_eq!(ledger.balance_of(session.owner_address(), &token_y), 7);
    }

    #[tokio::test]
    async fn test_recovery_is_idempotent() {
        let (ctx, ledger) = test_context().await;
        ctx.unlock("seed".into());
        let a = escrow("aaaa");
        let token = Address::parse("tok_xxxx").unwrap();
        ledger.set_balance(&a, &token, 500);

        let first = recover_from_escrow_accounts(&ctx, vec![a.clone()], None)
            .await
            .unwrap();
        assert!(first.success);
        let transmits_after_first = ledger.transmit_calls();

        let second = recover_from_escrow_accounts(&ctx, vec![a.clone()], None)
            .await
            .unwrap();
        assert!(second.success);
        assert_eq!(second.recovered, vec![a]);
        // Nothing left to move the second time
        assert_eq!(ledger.transmit_calls(), transmits_after_first);
    }

    #[tokio::test]
    async fn test_one_failed_address_does_not_stop_the_rest() {
        let (ctx, ledger) = test_context().await;
        let session = ctx.unlock("seed".into());
        let a = escrow("aaaa");
        let b = escrow("bbbb");
        let token = Address::parse("tok_xxxx").unwrap();
        ledger.set_balance(&a, &token, 100);
        ledger.set_balance(&b, &token, 200);
        // A's drain transmit fails; B's succeeds
        ledger.fail_on_transmit(1);

        let report = recover_from_escrow_accounts(&ctx, vec![a.clone(), b.clone()], None)
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.failed, vec![a]);
        assert_eq!(report.recovered, vec![b.clone()]);
        assert_eq!(ledger.balance_of(&b, &token), 0);
        assert_eq!(ledger.balance_of(session.owner_address(), &token), 200);
    }

    #[tokio::test]
    async fn test_locked_wallet_fails_setup() {
        let (ctx, _ledger) = test_context().await;
        let err = recover_from_escrow_accounts(&ctx, vec![escrow("aaaa")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Order(OrderError::WalletLocked)));
    }
}
