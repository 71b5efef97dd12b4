//! Result ingestion: the dialer reports what happened on a number, and
//! that report drives the number's derived state, the tied batch item's
//! trace, and — for billable outcomes — a wallet charge.

use chrono::{DateTime, Utc};
use dispatch_billing::charge_for_connected_call;
use dispatch_core::status::{is_billable, resulting_global_status};
use dispatch_core::{CoreError, Result};
use dispatch_db::{CallResult, Number, PgPool};
use uuid::Uuid;

/// Mirrors the dialer's wire report-result payload.
#[derive(Debug, Clone)]
pub struct DialerReport {
    pub number_id: Option<Uuid>,
    pub phone_number: String,
    pub scenario_id: Option<Uuid>,
    pub outbound_line_id: Option<Uuid>,
    pub status: String,
    pub reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub call_allowed: Option<bool>,
    pub batch_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub agent_phone: Option<String>,
}

pub async fn report_result(pool: &PgPool, tenant_id: Uuid, report: DialerReport) -> Result<CallResult> {
    let phone = dispatch_phone::normalize(&report.phone_number)
        .ok_or_else(|| CoreError::validation("phone_number does not normalize"))?;

    let agent_id = resolve_agent(pool, tenant_id, report.agent_id, report.agent_phone.as_deref()).await?;

    let direction = if report.number_id.is_none() { "INBOUND" } else { "OUTBOUND" };

    let mut tx = pool.begin().await?;

    let number = resolve_number(&mut tx, report.number_id, &phone).await?;
    let previous_assigned_batch = number.assigned_batch;

    let new_status = resulting_global_status(&report.status);

    sqlx::query(
        "update numbers set last_called_at = $2, last_called_tenant = $3, \
         assigned_at = null, assigned_batch = null, global_status = $4, updated_at = now() \
         where id = $1",
    )
    .bind(number.id)
    .bind(report.attempted_at)
    .bind(tenant_id)
    .bind(new_status)
    .execute(&mut *tx)
    .await?;

    let billable = is_billable(&report.status);

    let result: CallResult = sqlx::query_as(
        "insert into call_results \
         (tenant_id, number_id, batch_item_id, agent_id, scenario_id, outbound_line_id, status, reason, billable, direction, attempted_at) \
         values ($1, $2, null, $3, $4, $5, $6, $7, $8, $9, $10) returning *",
    )
    .bind(tenant_id)
    .bind(number.id)
    .bind(agent_id)
    .bind(report.scenario_id)
    .bind(report.outbound_line_id)
    .bind(&report.status)
    .bind(&report.reason)
    .bind(billable)
    .bind(direction)
    .bind(report.attempted_at)
    .fetch_one(&mut *tx)
    .await?;

    let item_id = locate_or_create_batch_item(
        &mut tx,
        report.batch_id,
        previous_assigned_batch,
        number.id,
        report.scenario_id,
        report.outbound_line_id,
    )
    .await?;

    sqlx::query(
        "update dialer_batch_items set reported_at = now(), report_status = $2, report_reason = $3 \
         where id = $1",
    )
    .bind(item_id)
    .bind(&report.status)
    .bind(&report.reason)
    .execute(&mut *tx)
    .await?;

    sqlx::query("update call_results set batch_item_id = $2 where id = $1")
        .bind(result.id)
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

    if let Some(call_allowed) = report.call_allowed {
        sqlx::query(
            "update schedule_configs set enabled = $2, disabled_by_dialer = $3, \
             version = version + 1, updated_at = now() where tenant_id = $1",
        )
        .bind(tenant_id)
        .bind(call_allowed)
        .bind(!call_allowed)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    if billable {
        charge_for_connected_call(pool, tenant_id, report.scenario_id).await?;
    }

    let mut result = result;
    result.batch_item_id = Some(item_id);
    Ok(result)
}

async fn resolve_number(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    number_id: Option<Uuid>,
    phone: &str,
) -> Result<Number> {
    if let Some(id) = number_id {
        if let Some(number) = sqlx::query_as::<_, Number>("select * from numbers where id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
        {
            if number.phone_number == phone {
                return Ok(number);
            }
            // id/phone disagree: fall through and resolve by phone instead.
        }
    }

    if let Some(number) =
        sqlx::query_as::<_, Number>("select * from numbers where phone_number = $1 for update")
            .bind(phone)
            .fetch_optional(&mut **tx)
            .await?
    {
        return Ok(number);
    }

    let inserted: Option<Number> = sqlx::query_as(
        "insert into numbers (phone_number, global_status) values ($1, 'ACTIVE') \
         on conflict (phone_number) do nothing returning *",
    )
    .bind(phone)
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some(number) => Ok(number),
        None => sqlx::query_as::<_, Number>("select * from numbers where phone_number = $1 for update")
            .bind(phone)
            .fetch_one(&mut **tx)
            .await
            .map_err(CoreError::from),
    }
}

async fn resolve_agent(
    pool: &PgPool,
    tenant_id: Uuid,
    agent_id: Option<Uuid>,
    agent_phone: Option<&str>,
) -> Result<Option<Uuid>> {
    if agent_id.is_none() && agent_phone.is_none() {
        return Ok(None);
    }

    let row: Option<(Uuid, String, bool)> = if let Some(id) = agent_id {
        sqlx::query_as("select id, role, active from users where id = $1 and tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await?
    } else {
        let phone = dispatch_phone::normalize(agent_phone.unwrap())
            .ok_or_else(|| CoreError::validation("agent_phone does not normalize"))?;
        sqlx::query_as("select id, role, active from users where phone = $1 and tenant_id = $2")
            .bind(phone)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await?
    };

    let (id, role, active) = row.ok_or_else(|| CoreError::validation("unknown agent"))?;
    if !role.eq_ignore_ascii_case("AGENT") {
        return Err(CoreError::validation("resolved user is not an agent"));
    }
    if !active {
        return Err(CoreError::validation("agent is inactive"));
    }
    Ok(Some(id))
}

async fn locate_or_create_batch_item(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    report_batch_id: Option<Uuid>,
    assigned_batch_snapshot: Option<Uuid>,
    number_id: Uuid,
    scenario_id: Option<Uuid>,
    line_id: Option<Uuid>,
) -> Result<Uuid> {
    if let Some(batch_id) = report_batch_id {
        if let Some((id,)) = sqlx::query_as::<_, (Uuid,)>(
            "select id from dialer_batch_items where batch_id = $1 and number_id = $2",
        )
        .bind(batch_id)
        .bind(number_id)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(id);
        }
    }

    if let Some(batch_id) = assigned_batch_snapshot {
        if let Some((id,)) = sqlx::query_as::<_, (Uuid,)>(
            "select id from dialer_batch_items where batch_id = $1 and number_id = $2",
        )
        .bind(batch_id)
        .bind(number_id)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(id);
        }
    }

    if let Some((id,)) = sqlx::query_as::<_, (Uuid,)>(
        "select id from dialer_batch_items where number_id = $1 order by claimed_at desc limit 1",
    )
    .bind(number_id)
    .fetch_optional(&mut **tx)
    .await?
    {
        return Ok(id);
    }

    let (id,): (Uuid,) = sqlx::query_as(
        "insert into dialer_batch_items (batch_id, number_id, scenario_id, line_id) \
         values (null, $1, $2, $3) returning id",
    )
    .bind(number_id)
    .bind(scenario_id)
    .bind(line_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billable_status_triggers_a_charge_path() {
        assert!(is_billable("CONNECTED"));
        assert!(!is_billable("MISSED"));
    }
}
