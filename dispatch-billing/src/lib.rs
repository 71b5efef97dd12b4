//! The wallet ledger. The live balance lives on `schedule_configs`
//! (that's the row every operation locks); `wallet_transactions` is the
//! append-only audit trail, with `balance_after` capturing the
//! serialization order rather than being re-derived from it.

use dispatch_core::{CoreError, Result};
use dispatch_db::{PgPool, ScheduleConfig, WalletTransaction};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

pub use dispatch_schedule::auto_disable;

async fn lock_schedule(tx: &mut Transaction<'_, Postgres>, tenant_id: Uuid) -> Result<ScheduleConfig> {
    sqlx::query_as::<_, ScheduleConfig>(
        "select * from schedule_configs where tenant_id = $1 for update",
    )
    .bind(tenant_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| CoreError::not_found(format!("schedule for tenant {tenant_id}")))
}

async fn append_transaction(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    amount: i64,
    balance_after: i64,
    kind: &str,
    note: Option<&str>,
    created_by: Option<Uuid>,
) -> Result<WalletTransaction> {
    let txn = sqlx::query_as::<_, WalletTransaction>(
        "insert into wallet_transactions (tenant_id, amount, balance_after, kind, note, created_by) \
         values ($1, $2, $3, $4, $5, $6) returning *",
    )
    .bind(tenant_id)
    .bind(amount)
    .bind(balance_after)
    .bind(kind)
    .bind(note)
    .bind(created_by)
    .fetch_one(&mut **tx)
    .await?;
    Ok(txn)
}

/// A credit clears the dialer-applied disable only if the schedule is
/// already marked enabled — it never force-enables a tenant an operator
/// deliberately turned off.
async fn clear_disable_if_credited(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    delta: i64,
) -> Result<()> {
    if delta <= 0 {
        return Ok(());
    }
    sqlx::query(
        "update schedule_configs set disabled_by_dialer = false, updated_at = now() \
         where tenant_id = $1 and enabled = true and disabled_by_dialer = true",
    )
    .bind(tenant_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Deduct the price of a connected call. Cost resolution: the scenario's
/// `cost_per_connected` overrides the tenant's default. A non-positive
/// cost is a no-op. If the wallet is already at or below zero, the
/// tenant is auto-disabled and no transaction is recorded. Otherwise the
/// balance is floored at zero (never goes negative) and a `CALL_CHARGE`
/// row is appended; hitting exactly zero also auto-disables.
pub async fn charge_for_connected_call(
    pool: &PgPool,
    tenant_id: Uuid,
    scenario_id: Option<Uuid>,
) -> Result<Option<WalletTransaction>> {
    let mut tx = pool.begin().await?;
    let cfg = lock_schedule(&mut tx, tenant_id).await?;

    let cost = match scenario_id {
        Some(id) => {
            let row: Option<(Option<i64>,)> =
                sqlx::query_as("select cost_per_connected from scenarios where id = $1 and tenant_id = $2")
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            row.and_then(|(c,)| c).unwrap_or(cfg.default_cost_per_connected)
        }
        None => cfg.default_cost_per_connected,
    };

    if cost <= 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    if cfg.wallet_balance <= 0 {
        sqlx::query(
            "update schedule_configs set enabled = false, disabled_by_dialer = true, \
             version = version + 1, updated_at = now() where tenant_id = $1",
        )
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        return Ok(None);
    }

    let new_balance = (cfg.wallet_balance - cost).max(0);
    let delta = new_balance - cfg.wallet_balance;

    sqlx::query("update schedule_configs set wallet_balance = $2, updated_at = now() where tenant_id = $1")
        .bind(tenant_id)
        .bind(new_balance)
        .execute(&mut *tx)
        .await?;

    let txn = append_transaction(&mut tx, tenant_id, delta, new_balance, "CALL_CHARGE", None, None).await?;

    if new_balance == 0 {
        sqlx::query(
            "update schedule_configs set enabled = false, disabled_by_dialer = true, \
             version = version + 1, updated_at = now() where tenant_id = $1",
        )
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(Some(txn))
}

pub enum AdjustOp {
    Add,
    Subtract,
}

/// An operator-initiated credit or debit. `amount` must be positive; the
/// sign is determined by `op`. Rejected outright if it would take the
/// balance negative — unlike a call charge, this never clamps.
pub async fn manual_adjust(
    pool: &PgPool,
    tenant_id: Uuid,
    amount: i64,
    op: AdjustOp,
    note: &str,
    user_id: Option<Uuid>,
) -> Result<WalletTransaction> {
    if amount <= 0 {
        return Err(CoreError::validation("adjustment amount must be positive"));
    }
    let delta = match op {
        AdjustOp::Add => amount,
        AdjustOp::Subtract => -amount,
    };

    let mut tx = pool.begin().await?;
    let cfg = lock_schedule(&mut tx, tenant_id).await?;
    let new_balance = cfg.wallet_balance + delta;
    if new_balance < 0 {
        return Err(CoreError::conflict("resulting balance would be negative"));
    }

    sqlx::query("update schedule_configs set wallet_balance = $2, updated_at = now() where tenant_id = $1")
        .bind(tenant_id)
        .bind(new_balance)
        .execute(&mut *tx)
        .await?;
    let txn = append_transaction(
        &mut tx,
        tenant_id,
        delta,
        new_balance,
        "MANUAL_ADJUST",
        Some(note),
        user_id,
    )
    .await?;
    clear_disable_if_credited(&mut tx, tenant_id, delta).await?;
    tx.commit().await?;
    Ok(txn)
}

/// Credit a tenant's wallet from a matched bank top-up. Called by
/// `dispatch-matcher` once it has located and locked the matching
/// `BankIncomingSms` row.
pub async fn credit_from_bank_match(
    pool: &PgPool,
    tenant_id: Uuid,
    amount_toman: i64,
) -> Result<WalletTransaction> {
    if amount_toman <= 0 {
        return Err(CoreError::validation("bank credit must be positive"));
    }
    let mut tx = pool.begin().await?;
    let cfg = lock_schedule(&mut tx, tenant_id).await?;
    let new_balance = cfg.wallet_balance + amount_toman;

    sqlx::query("update schedule_configs set wallet_balance = $2, updated_at = now() where tenant_id = $1")
        .bind(tenant_id)
        .bind(new_balance)
        .execute(&mut *tx)
        .await?;
    let txn = append_transaction(
        &mut tx,
        tenant_id,
        amount_toman,
        new_balance,
        "BANK_MATCH",
        None,
        None,
    )
    .await?;
    clear_disable_if_credited(&mut tx, tenant_id, amount_toman).await?;
    tx.commit().await?;
    Ok(txn)
}

pub async fn current_balance(pool: &PgPool, tenant_id: Uuid) -> Result<i64> {
    let cfg = dispatch_schedule::ensure_config(pool, tenant_id).await?;
    Ok(cfg.wallet_balance)
}

pub async fn list_transactions(
    pool: &PgPool,
    tenant_id: Uuid,
    from: Option<chrono::DateTime<chrono::Utc>>,
    to: Option<chrono::DateTime<chrono::Utc>>,
    skip: i64,
    limit: i64,
) -> Result<Vec<WalletTransaction>> {
    let rows = sqlx::query_as::<_, WalletTransaction>(
        "select * from wallet_transactions where tenant_id = $1 \
         and ($2::timestamptz is null or transaction_at >= $2) \
         and ($3::timestamptz is null or transaction_at <= $3) \
         order by transaction_at desc, id desc offset $4 limit $5",
    )
    .bind(tenant_id)
    .bind(from)
    .bind(to)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    // Every entry point here needs a live pool under a per-tenant lock;
    // see `tests/billing.rs` for the `TEST_DATABASE_URL`-gated coverage.
}
