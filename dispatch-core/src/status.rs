//! The call-result status taxonomy. A number's
//! `global_status` is always one of `ACTIVE` / `POWER_OFF` / `COMPLAINED`,
//! but the reported call `status` is a wider set — the column itself is
//! plain `text`, so an unrecognized value is just never billable rather
//! than rejected outright.

/// Outcomes that trigger a wallet charge when a result is reported.
pub const BILLABLE_STATUSES: &[&str] = &[
    "CONNECTED",
    "NOT_INTERESTED",
    "HANGUP",
    "UNKNOWN",
    "DISCONNECTED",
    "FAILED",
];

/// Outcomes that never touch the wallet.
pub const NON_BILLABLE_STATUSES: &[&str] = &[
    "MISSED",
    "BUSY",
    "POWER_OFF",
    "INBOUND_CALL",
    "IN_QUEUE",
    "BANNED",
    "COMPLAINED",
];

/// Reported statuses that also overwrite the number's `global_status`,
/// taking it out of the claimable pool regardless of tenant.
pub const GLOBAL_STATUS_OVERRIDES: &[&str] = &["POWER_OFF", "COMPLAINED"];

pub fn is_billable(status: &str) -> bool {
    BILLABLE_STATUSES.contains(&status)
}

pub fn is_non_billable(status: &str) -> bool {
    NON_BILLABLE_STATUSES.contains(&status)
}

/// The `global_status` a number should carry after this outcome is
/// reported. Anything not in `GLOBAL_STATUS_OVERRIDES` resets the number
/// back to `ACTIVE` — a single bad call never keeps it out of the pool.
pub fn resulting_global_status(status: &str) -> &'static str {
    match status {
        "POWER_OFF" => "POWER_OFF",
        "COMPLAINED" => "COMPLAINED",
        _ => "ACTIVE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billable_set_matches_the_outcome_table() {
        assert!(is_billable("CONNECTED"));
        assert!(is_billable("FAILED"));
        assert!(!is_billable("MISSED"));
        assert!(!is_billable("BANNED"));
    }

    #[test]
    fn power_off_and_complained_stick_to_global_status() {
        assert_eq!(resulting_global_status("POWER_OFF"), "POWER_OFF");
        assert_eq!(resulting_global_status("COMPLAINED"), "COMPLAINED");
        assert_eq!(resulting_global_status("CONNECTED"), "ACTIVE");
        assert_eq!(resulting_global_status("BUSY"), "ACTIVE");
    }
}
