//! The scheduling gate: per-tenant call windows, holiday skipping, wallet
//! exhaustion, and the `isCallAllowed` decision the batch engine consults
//! before it claims any numbers at all.

use chrono::Timelike;
use dispatch_calendar::{now_tehran, tehran_weekday, to_jalali, FIXED_HOLIDAYS};
use dispatch_core::{CoreError, Result};
use dispatch_db::{PgPool, ScheduleConfig, ScheduleWindow};
use uuid::Uuid;

/// Get-or-create the schedule row for a tenant. New tenants start
/// enabled, with holiday skipping on, matching the reference
/// implementation's `ensure_config` defaults.
pub async fn ensure_config(pool: &PgPool, tenant_id: Uuid) -> Result<ScheduleConfig> {
    if let Some(cfg) =
        sqlx::query_as::<_, ScheduleConfig>("select * from schedule_configs where tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(pool)
            .await?
    {
        return Ok(cfg);
    }

    let cfg = sqlx::query_as::<_, ScheduleConfig>(
        "insert into schedule_configs (tenant_id) values ($1) \
         on conflict (tenant_id) do update set tenant_id = excluded.tenant_id \
         returning *",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;
    Ok(cfg)
}

/// Fields a caller may patch on a tenant's schedule. `None` leaves the
/// column untouched.
#[derive(Debug, Default)]
pub struct ScheduleUpdate {
    pub enabled: Option<bool>,
    pub skip_holidays: Option<bool>,
    pub default_cost_per_connected: Option<i64>,
}

pub async fn update_schedule(
    pool: &PgPool,
    tenant_id: Uuid,
    update: ScheduleUpdate,
) -> Result<ScheduleConfig> {
    let current = ensure_config(pool, tenant_id).await?;

    let enabled = update.enabled.unwrap_or(current.enabled);
    let skip_holidays = update.skip_holidays.unwrap_or(current.skip_holidays);
    let default_cost_per_connected = update
        .default_cost_per_connected
        .unwrap_or(current.default_cost_per_connected);

    if default_cost_per_connected < 0 {
        return Err(CoreError::validation(
            "default_cost_per_connected must not be negative",
        ));
    }

    // An explicit admin edit always reflects the operator's intent,
    // including clearing a dialer-applied disable if they're turning the
    // tenant back on. This is distinct from the wallet-credit path below,
    // which never forces `enabled` back to true on its own.
    let disabled_by_dialer = if enabled { false } else { current.disabled_by_dialer };

    let cfg = sqlx::query_as::<_, ScheduleConfig>(
        "update schedule_configs set enabled = $2, skip_holidays = $3, \
         default_cost_per_connected = $4, disabled_by_dialer = $5, version = version + 1, \
         updated_at = now() where tenant_id = $1 returning *",
    )
    .bind(tenant_id)
    .bind(enabled)
    .bind(skip_holidays)
    .bind(default_cost_per_connected)
    .bind(disabled_by_dialer)
    .fetch_one(pool)
    .await?;
    Ok(cfg)
}

/// Replace every call window for a tenant. Windows are same-day only
/// (`start < end`); a weekday that crosses midnight needs two windows.
pub async fn set_windows(
    pool: &PgPool,
    tenant_id: Uuid,
    windows: Vec<(i16, i32, i32)>,
) -> Result<Vec<ScheduleWindow>> {
    for (weekday, start, end) in &windows {
        if !(0..=6).contains(weekday) {
            return Err(CoreError::validation("weekday must be 0..6"));
        }
        if start >= end {
            return Err(CoreError::validation("window start must be before end"));
        }
    }

    let cfg = ensure_config(pool, tenant_id).await?;
    let mut tx = pool.begin().await?;
    sqlx::query("delete from schedule_windows where schedule_config_id = $1")
        .bind(cfg.id)
        .execute(&mut *tx)
        .await?;

    let mut out = Vec::with_capacity(windows.len());
    for (weekday, start, end) in windows {
        let w: ScheduleWindow = sqlx::query_as(
            "insert into schedule_windows (schedule_config_id, weekday, start_minute, end_minute) \
             values ($1, $2, $3, $4) returning *",
        )
        .bind(cfg.id)
        .bind(weekday)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await?;
        out.push(w);
    }
    tx.commit().await?;
    Ok(out)
}

/// True iff today's Jalali date falls on the fixed holiday calendar.
pub fn is_holiday_now() -> bool {
    let today = now_tehran().date_naive();
    let jalali = to_jalali(today);
    FIXED_HOLIDAYS.contains(&(jalali.month, jalali.day))
}

/// Why the gate denied a claim, in strict decision-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    InsufficientFunds,
    Disabled,
    Holiday,
    NoWindow,
    OutsideAllowedTimeWindow,
}

impl GateReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds => "insufficient_funds",
            Self::Disabled => "disabled",
            Self::Holiday => "holiday",
            Self::NoWindow => "no_window",
            Self::OutsideAllowedTimeWindow => "outside_allowed_time_window",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<GateReason>,
    pub retry_after_seconds: i64,
    pub schedule_version: i64,
}

/// The full gate, in decision order: wallet exhaustion first (with its
/// auto-disable side effect), then the operator `enabled` flag, then
/// holidays, then the weekday's call windows.
pub async fn check_gate(
    pool: &PgPool,
    tenant_id: Uuid,
    short_retry_seconds: i64,
    long_retry_seconds: i64,
) -> Result<GateDecision> {
    let cfg = ensure_config(pool, tenant_id).await?;

    if cfg.wallet_balance <= 0 {
        let cfg = auto_disable(pool, tenant_id).await?;
        return Ok(GateDecision {
            allowed: false,
            reason: Some(GateReason::InsufficientFunds),
            retry_after_seconds: short_retry_seconds,
            schedule_version: cfg.version,
        });
    }

    if !cfg.enabled {
        return Ok(GateDecision {
            allowed: false,
            reason: Some(GateReason::Disabled),
            retry_after_seconds: short_retry_seconds,
            schedule_version: cfg.version,
        });
    }

    if cfg.skip_holidays && is_holiday_now() {
        return Ok(GateDecision {
            allowed: false,
            reason: Some(GateReason::Holiday),
            retry_after_seconds: long_retry_seconds,
            schedule_version: cfg.version,
        });
    }

    let now = now_tehran();
    let weekday = tehran_weekday(now.date_naive());
    let windows: Vec<ScheduleWindow> = sqlx::query_as(
        "select * from schedule_windows where schedule_config_id = $1 and weekday = $2",
    )
    .bind(cfg.id)
    .bind(weekday as i16)
    .fetch_all(pool)
    .await?;

    if windows.is_empty() {
        return Ok(GateDecision {
            allowed: false,
            reason: Some(GateReason::NoWindow),
            retry_after_seconds: long_retry_seconds,
            schedule_version: cfg.version,
        });
    }

    let now_minute = (now.hour() * 60 + now.minute()) as i32;
    let inside = windows
        .iter()
        .any(|w| now_minute >= w.start_minute && now_minute < w.end_minute);

    if inside {
        Ok(GateDecision {
            allowed: true,
            reason: None,
            retry_after_seconds: 0,
            schedule_version: cfg.version,
        })
    } else {
        Ok(GateDecision {
            allowed: false,
            reason: Some(GateReason::OutsideAllowedTimeWindow),
            retry_after_seconds: long_retry_seconds,
            schedule_version: cfg.version,
        })
    }
}

pub async fn is_call_allowed(pool: &PgPool, tenant_id: Uuid) -> Result<bool> {
    // Retry hints don't matter for a plain yes/no; the values here are
    // never surfaced.
    Ok(check_gate(pool, tenant_id, 0, 0).await?.allowed)
}

/// Flip a tenant to the dialer-disabled state and bump its schedule
/// version. Called both from gate entry (wallet exhaustion) and from
/// the billing ledger when a charge drains the wallet to zero.
pub async fn auto_disable(pool: &PgPool, tenant_id: Uuid) -> Result<ScheduleConfig> {
    sqlx::query_as::<_, ScheduleConfig>(
        "update schedule_configs set enabled = false, disabled_by_dialer = true, \
         version = version + 1, updated_at = now() where tenant_id = $1 returning *",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await
    .map_err(CoreError::from)
}
