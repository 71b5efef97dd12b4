//! Bank SMS ingestion and matching.
//!
//! Credits arrive unattributed — a bank profile tells us which sender a
//! notification came from, not which tenant to credit. Ingestion parses
//! and stores the notification; matching it to a tenant's wallet-credit
//! claim (amount + transaction time) is a separate step, driven by the
//! tenant presenting the token printed on their receipt.

use chrono::{DateTime, Utc};
use dispatch_billing::credit_from_bank_match;
use dispatch_config::BankProfile;
use dispatch_core::{CoreError, Result};
use dispatch_db::{BankIncomingSms, PgPool};
use dispatch_sms::{parse_bank_sms, should_store, strip_callback_suffix};
use uuid::Uuid;

/// `GET /sms/ingest?from=&to=&body=`. `from` picks the bank profile;
/// the raw body is forwarded to the profile's managers best-effort
/// regardless of whether it parses, then parsed, and only a credit
/// parse is persisted.
pub async fn ingest_incoming_sms(
    pool: &PgPool,
    profiles: &[BankProfile],
    from: &str,
    body: &str,
    http: &reqwest::Client,
) -> Result<Option<BankIncomingSms>> {
    let profile = profiles
        .iter()
        .find(|p| p.sender_numbers.iter().any(|n| n == from))
        .ok_or_else(|| CoreError::not_found(format!("no bank profile for sender {from}")))?;

    let body = strip_callback_suffix(body);

    forward_to_managers(profile, body, http).await;

    let Some(parsed) = parse_bank_sms(body) else {
        tracing::debug!(bank = %profile.name, "bank sms did not parse, dropping");
        return Ok(None);
    };

    if !should_store(&parsed) {
        return Ok(None);
    }

    let row: BankIncomingSms = sqlx::query_as(
        "insert into bank_incoming_sms \
         (bank_profile, from_number, raw_body, parsed_amount_toman, parsed_transaction_at, is_credit) \
         values ($1, $2, $3, $4, $5, $6) returning *",
    )
    .bind(&profile.name)
    .bind(from)
    .bind(body)
    .bind(parsed.amount_toman)
    .bind(parsed.transaction_at)
    .bind(parsed.is_credit)
    .fetch_one(pool)
    .await?;

    if profile.notify_google_sheet {
        notify_google_sheet(profile, &row, http).await;
    }

    Ok(Some(row))
}

/// `matchAndCharge`: find the oldest unconsumed credit matching
/// `(amount_toman, transaction_at)`, lock it, and apply it to the
/// tenant's wallet inside the same transaction that marks it consumed.
pub async fn match_and_charge(
    pool: &PgPool,
    tenant_id: Uuid,
    amount_toman: i64,
    transaction_at: DateTime<Utc>,
) -> Result<BankIncomingSms> {
    let mut tx = pool.begin().await?;

    let row: Option<BankIncomingSms> = sqlx::query_as(
        "select * from bank_incoming_sms \
         where parsed_amount_toman = $1 and parsed_transaction_at = $2 \
           and is_credit = true and consumed = false \
         order by received_at asc limit 1 for update skip locked",
    )
    .bind(amount_toman)
    .bind(transaction_at)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        let already_used: Option<(Uuid,)> = sqlx::query_as(
            "select id from bank_incoming_sms where parsed_amount_toman = $1 \
             and parsed_transaction_at = $2 and is_credit = true and consumed = true limit 1",
        )
        .bind(amount_toman)
        .bind(transaction_at)
        .fetch_optional(&mut *tx)
        .await?;
        return Err(if already_used.is_some() {
            CoreError::conflict("bank receipt has already been matched")
        } else {
            CoreError::not_found("no matching bank receipt found")
        });
    };

    let txn = credit_from_bank_match(pool, tenant_id, amount_toman).await?;

    let updated: BankIncomingSms = sqlx::query_as(
        "update bank_incoming_sms set tenant_id = $2, consumed = true, wallet_transaction_id = $3 \
         where id = $1 returning *",
    )
    .bind(row.id)
    .bind(tenant_id)
    .bind(txn.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Best-effort: a manager's phone being unreachable never blocks
/// ingestion of the notification itself.
async fn forward_to_managers(profile: &BankProfile, raw_body: &str, http: &reqwest::Client) {
    for manager in &profile.manager_numbers {
        if let Some(url) = manager_forward_url(manager) {
            if let Err(err) = http.post(url).body(raw_body.to_string()).send().await {
                tracing::warn!(%manager, error = %err, "failed to forward bank sms to manager");
            }
        }
    }
}

/// Best-effort short receipt SMS to a profile's managers once a match
/// succeeds, confirming which tenant was credited.
pub async fn notify_managers_of_match(
    profile: &BankProfile,
    tenant_slug: &str,
    amount_toman: i64,
    http: &reqwest::Client,
) {
    let text = format!("{amount_toman} toman credited to {tenant_slug}");
    for manager in &profile.manager_numbers {
        if let Some(url) = manager_forward_url(manager) {
            if let Err(err) = http.post(url).body(text.clone()).send().await {
                tracing::warn!(%manager, error = %err, "failed to notify manager of bank match");
            }
        }
    }
}

/// Best-effort external webhook `{token, amount, date}` fired after a
/// successful match, independent of the google-sheet notification below.
pub async fn notify_match_webhook(
    webhook_url: &str,
    token: &str,
    amount_toman: i64,
    transaction_at: DateTime<Utc>,
    http: &reqwest::Client,
) {
    let payload = serde_json::json!({
        "token": token,
        "amount": amount_toman,
        "date": transaction_at,
    });
    if let Err(err) = http.post(webhook_url).json(&payload).send().await {
        tracing::warn!(error = %err, "failed to notify bank match webhook");
    }
}

async fn notify_google_sheet(profile: &BankProfile, row: &BankIncomingSms, http: &reqwest::Client) {
    let Some(amount) = row.parsed_amount_toman else {
        return;
    };
    let payload = serde_json::json!({
        "bank": profile.name,
        "amount": amount,
        "received_at": row.received_at,
    });
    if let Err(err) = http
        .post("https://script.google.com/macros/s/placeholder/exec")
        .json(&payload)
        .send()
        .await
    {
        tracing::warn!(error = %err, "failed to notify google sheet of bank topup");
    }
}

fn manager_forward_url(_manager_number: &str) -> Option<String> {
    // Forwarding goes out over whatever SMS gateway the deployment wires
    // up; this workspace only owns the best-effort dispatch logic.
    None
}
