//! The batch assignment engine: claims a disjoint slice of the global
//! number pool for a tenant's dialer, locking each row so no other
//! tenant's claim (or another concurrent claim from the same tenant) can
//! take it too.

use chrono::{DateTime, Duration, Utc};
use dispatch_core::Result;
use dispatch_db::{DialerBatch, Number, PgPool};
use dispatch_schedule::{check_gate, GateReason};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ClaimedNumber {
    pub id: Uuid,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimedBatch {
    /// Opaque 32-char lowercase hex.
    pub batch_id: String,
    pub size_requested: u32,
    pub size_returned: u32,
    pub numbers: Vec<ClaimedNumber>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub call_allowed: bool,
    pub reason: Option<&'static str>,
    pub retry_after_seconds: i64,
    pub schedule_version: i64,
    pub batch: Option<ClaimedBatch>,
}

/// Reclaim rows whose lease has outlived `assignment_timeout_minutes`
/// without a reported result. Runs before every claim query; idempotent.
pub async fn unlock_stale_assignments(pool: &PgPool, assignment_timeout_minutes: i64) -> Result<u64> {
    let cutoff: DateTime<Utc> = Utc::now() - Duration::minutes(assignment_timeout_minutes);
    let result = sqlx::query(
        "update numbers set assigned_at = null, assigned_batch = null, updated_at = now() \
         where assigned_at is not null and assigned_at <= $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// `fetchNextBatch(tenant, requested_size?, active_lines_count?)`.
///
/// Size resolution: `requested_size`, if given, is used as-is (clamped
/// to `max_batch_size`); otherwise it's `default_per_line * L`, where `L`
/// is the client's claimed active-line count clamped to the tenant's
/// actual count of active outbound lines.
pub async fn fetch_next_batch(
    pool: &PgPool,
    tenant_id: Uuid,
    requested_size: Option<u32>,
    active_lines_count: Option<u32>,
    default_per_line: u32,
    max_batch_size: u32,
    call_cooldown_days: i64,
    assignment_timeout_minutes: i64,
    short_retry_seconds: i64,
    long_retry_seconds: i64,
) -> Result<BatchOutcome> {
    let gate = check_gate(pool, tenant_id, short_retry_seconds, long_retry_seconds).await?;
    if !gate.allowed {
        return Ok(BatchOutcome {
            call_allowed: false,
            reason: gate.reason.map(GateReason::code),
            retry_after_seconds: gate.retry_after_seconds,
            schedule_version: gate.schedule_version,
            batch: None,
        });
    }

    let (active_line_total,): (i64,) = sqlx::query_as(
        "select count(*) from outbound_lines where tenant_id = $1 and active = true",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;
    let l = active_lines_count
        .map(|n| n.min(active_line_total.max(0) as u32))
        .unwrap_or(active_line_total.max(0) as u32);

    let size = requested_size.unwrap_or(default_per_line.saturating_mul(l));
    let size = size.clamp(0, max_batch_size);

    unlock_stale_assignments(pool, assignment_timeout_minutes).await?;

    if size == 0 {
        return Ok(BatchOutcome {
            call_allowed: true,
            reason: None,
            retry_after_seconds: 0,
            schedule_version: gate.schedule_version,
            batch: Some(ClaimedBatch {
                batch_id: Uuid::nil().simple().to_string(),
                size_requested: 0,
                size_returned: 0,
                numbers: vec![],
            }),
        });
    }

    let cooldown_cutoff = Utc::now() - Duration::days(call_cooldown_days);

    let mut tx = pool.begin().await?;

    let claimable: Vec<Number> = sqlx::query_as(
        "select * from numbers n \
         where n.global_status = 'ACTIVE' \
           and n.assigned_at is null \
           and not exists ( \
               select 1 from call_results cr where cr.number_id = n.id and cr.tenant_id = $1 \
           ) \
           and (n.last_called_at is null or n.last_called_at < $2) \
         order by n.id asc \
         limit $3 \
         for update skip locked",
    )
    .bind(tenant_id)
    .bind(cooldown_cutoff)
    .bind(size as i64)
    .fetch_all(&mut *tx)
    .await?;

    let batch: DialerBatch = sqlx::query_as(
        "insert into dialer_batches (tenant_id) values ($1) returning *",
    )
    .bind(tenant_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut numbers = Vec::with_capacity(claimable.len());
    for number in &claimable {
        sqlx::query(
            "insert into dialer_batch_items (batch_id, number_id) values ($1, $2)",
        )
        .bind(batch.id)
        .bind(number.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "update numbers set assigned_at = now(), assigned_batch = $2, updated_at = now() \
             where id = $1",
        )
        .bind(number.id)
        .bind(batch.id)
        .execute(&mut *tx)
        .await?;

        numbers.push(ClaimedNumber {
            id: number.id,
            phone_number: number.phone_number.clone(),
        });
    }

    tx.commit().await?;

    let size_returned = numbers.len() as u32;
    Ok(BatchOutcome {
        call_allowed: true,
        reason: None,
        retry_after_seconds: 0,
        schedule_version: gate.schedule_version,
        batch: Some(ClaimedBatch {
            batch_id: batch.id.simple().to_string(),
            size_requested: size,
            size_returned,
            numbers,
        }),
    })
}
