//! Row types for every entity in §3 of the data model. Plain `FromRow`
//! structs; no ORM-style lazy loading or mutation-on-read — callers that
//! need joined data issue the join explicitly (see `dispatch-schedule`
//! and `dispatch-server`'s read-side handlers).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub agent_type: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Joins first and last name, trims, and falls back to the
    /// username if both are empty or absent.
    pub fn display_name(&self) -> String {
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            self.username.clone()
        } else {
            trimmed.to_string()
        }
    }

    pub fn is_agent(&self) -> bool {
        self.role.eq_ignore_ascii_case("AGENT")
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OutboundLine {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Scenario {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub cost_per_connected: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ScheduleConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub enabled: bool,
    pub skip_holidays: bool,
    pub disabled_by_dialer: bool,
    pub wallet_balance: i64,
    pub default_cost_per_connected: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ScheduleWindow {
    pub id: Uuid,
    pub schedule_config_id: Uuid,
    pub weekday: i16,
    pub start_minute: i32,
    pub end_minute: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Number {
    pub id: Uuid,
    pub phone_number: String,
    pub global_status: String,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_batch: Option<Uuid>,
    pub last_called_at: Option<DateTime<Utc>>,
    pub last_called_tenant: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DialerBatch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DialerBatchItem {
    pub id: Uuid,
    pub batch_id: Option<Uuid>,
    pub number_id: Uuid,
    pub scenario_id: Option<Uuid>,
    pub line_id: Option<Uuid>,
    pub claimed_at: DateTime<Utc>,
    pub reported_at: Option<DateTime<Utc>>,
    pub report_status: Option<String>,
    pub report_reason: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CallResult {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub number_id: Uuid,
    pub batch_item_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub scenario_id: Option<Uuid>,
    pub outbound_line_id: Option<Uuid>,
    pub status: String,
    pub reason: Option<String>,
    pub billable: bool,
    pub direction: String,
    pub attempted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub amount: i64,
    pub balance_after: i64,
    pub kind: String,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    pub transaction_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BankIncomingSms {
    pub id: Uuid,
    pub bank_profile: String,
    pub tenant_id: Option<Uuid>,
    pub from_number: String,
    pub raw_body: String,
    pub parsed_amount_toman: Option<i64>,
    pub parsed_transaction_at: Option<DateTime<Utc>>,
    pub is_credit: Option<bool>,
    pub consumed: bool,
    pub wallet_transaction_id: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: Option<&str>, last: Option<&str>, username: &str) -> User {
        User {
            id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            username: username.to_string(),
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
            phone: None,
            role: "AGENT".to_string(),
            agent_type: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_joins_first_and_last() {
        assert_eq!(user(Some("Sara"), Some("Ahmadi"), "sara.a").display_name(), "Sara Ahmadi");
    }

    #[test]
    fn display_name_falls_back_to_username() {
        assert_eq!(user(None, None, "sara.a").display_name(), "sara.a");
        assert_eq!(user(Some(""), Some(""), "sara.a").display_name(), "sara.a");
    }
}
