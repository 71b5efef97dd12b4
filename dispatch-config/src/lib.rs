//! Process configuration, loaded once at startup into an immutable
//! [`AppConfig`]. Nothing downstream reaches into the environment again;
//! every tunable the rest of the workspace needs flows through this struct.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One bank's SMS routing rule: which sender numbers its notifications
/// arrive from, and who to best-effort forward/notify on a credit.
#[derive(Debug, Clone, Deserialize)]
pub struct BankProfile {
    pub name: String,
    pub sender_numbers: Vec<String>,
    #[serde(default)]
    pub manager_numbers: Vec<String>,
    #[serde(default)]
    pub notify_google_sheet: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,

    pub dialer_token: String,
    pub operator_token: String,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u32,
    #[serde(default = "default_batch_size")]
    pub default_batch_size: u32,

    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub skip_holidays_default: bool,

    #[serde(default = "default_assignment_timeout_minutes")]
    pub assignment_timeout_minutes: i64,
    #[serde(default = "default_short_retry_seconds")]
    pub short_retry_seconds: i64,
    #[serde(default = "default_long_retry_seconds")]
    pub long_retry_seconds: i64,
    #[serde(default = "default_call_cooldown_days")]
    pub call_cooldown_days: i64,

    #[serde(default)]
    pub bank_profiles: Vec<BankProfile>,
    #[serde(default)]
    pub google_sheet_webhook_url: Option<String>,
}

fn default_max_batch_size() -> u32 {
    500
}
fn default_batch_size() -> u32 {
    100
}
fn default_timezone() -> String {
    "Asia/Tehran".to_string()
}
fn default_true() -> bool {
    true
}
fn default_assignment_timeout_minutes() -> i64 {
    60
}
fn default_short_retry_seconds() -> i64 {
    120
}
fn default_long_retry_seconds() -> i64 {
    900
}
fn default_call_cooldown_days() -> i64 {
    1
}

impl AppConfig {
    /// Load from `.env` (if present) plus the process environment,
    /// `DISPATCH_`-prefixed, double-underscore nested (`DISPATCH_BANK_PROFILES`
    /// is the one exception: always sourced from a JSON array so operators
    /// don't have to flatten bank routing rules into scalar env vars).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .set_default("max_batch_size", default_max_batch_size())?
            .set_default("default_batch_size", default_batch_size())?
            .set_default("timezone", default_timezone())?
            .set_default("skip_holidays_default", true)?
            .set_default("assignment_timeout_minutes", default_assignment_timeout_minutes())?
            .set_default("short_retry_seconds", default_short_retry_seconds())?
            .set_default("long_retry_seconds", default_long_retry_seconds())?
            .set_default("call_cooldown_days", default_call_cooldown_days())?
            .add_source(
                config::Environment::with_prefix("DISPATCH")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let raw: AppConfig = builder.build()?.try_deserialize()?;
        raw.validate()?;
        Ok(raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".into()));
        }
        if self.dialer_token.is_empty() {
            return Err(ConfigError::Invalid("dialer_token must not be empty".into()));
        }
        if self.operator_token.is_empty() {
            return Err(ConfigError::Invalid("operator_token must not be empty".into()));
        }
        if self.default_batch_size > self.max_batch_size {
            return Err(ConfigError::Invalid(
                "default_batch_size must not exceed max_batch_size".into(),
            ));
        }
        Ok(())
    }
}
