//! Bank SMS parsing: pull a signed amount and a Jalali timestamp out of a
//! raw notification body.
//!
//! Two independent patterns are matched against the whole (Persian/Arabic
//! digit-transliterated) body: an amount-plus-sign line, and a compact
//! Jalali datetime. Neither tries to understand the rest of the message —
//! bank SMS formats vary too much for anything more specific to be worth
//! maintaining.

use chrono::{DateTime, Utc};
use dispatch_calendar::{jalali_minute_to_utc, JalaliDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// `^\s*([0-9][0-9,]{2,})\s*([+-])\s*$`, multiline: a standalone line
/// holding a comma-grouped Rial amount and its credit/debit sign.
static AMOUNT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([0-9][0-9,]{2,})[ \t]*([+-])[ \t]*$").unwrap());

/// `(YYYY/M[M]/D[D])-(H[H]):(M[M])`, non-zero-padded components accepted.
static DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2,4})/(\d{1,2})/(\d{1,2})-(\d{1,2}):(\d{1,2})").unwrap());

/// A bank notification, reduced to the fields the wallet ledger cares
/// about. `amount_toman` is always positive; `is_credit` carries the
/// sign separately since matching keys on both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBankSms {
    pub amount_toman: i64,
    pub is_credit: bool,
    pub transaction_at: DateTime<Utc>,
}

/// Parse a raw SMS body. Returns `None` if either the amount line or the
/// datetime can't be located.
pub fn parse_bank_sms(raw: &str) -> Option<ParsedBankSms> {
    let ascii = to_ascii_digits(raw);

    let amount_caps = AMOUNT_LINE.captures(&ascii)?;
    let digits: String = amount_caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    let amount_rial: i64 = digits.parse().ok()?;
    let amount_toman = amount_rial / 10;
    let is_credit = amount_caps.get(2)?.as_str() == "+";

    let dt_caps = DATETIME.captures(&ascii)?;
    let mut year: i32 = dt_caps.get(1)?.as_str().parse().ok()?;
    if year < 100 {
        year += 1400;
    }
    let month: u32 = dt_caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = dt_caps.get(3)?.as_str().parse().ok()?;
    let hour: u32 = dt_caps.get(4)?.as_str().parse().ok()?;
    let minute: u32 = dt_caps.get(5)?.as_str().parse().ok()?;

    let transaction_at = jalali_minute_to_utc(JalaliDate::new(year, month, day), hour, minute)?;

    Some(ParsedBankSms {
        amount_toman,
        is_credit,
        transaction_at,
    })
}

/// Only credit parses are persisted for later matching; debits may still
/// be forwarded to managers but are never stored for wallet use.
pub fn should_store(parsed: &ParsedBankSms) -> bool {
    parsed.is_credit
}

/// Providers append a stray `;http…` callback URL to the body; strip it
/// before parsing.
pub fn strip_callback_suffix(body: &str) -> &str {
    match body.find(";http") {
        Some(idx) => &body[..idx],
        None => body,
    }
}

fn to_ascii_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '۰'..='۹' => char::from_u32('0' as u32 + (c as u32 - '۰' as u32)).unwrap_or(c),
            '٠'..='٩' => char::from_u32('0' as u32 + (c as u32 - '٠' as u32)).unwrap_or(c),
            other => other,
        })
        .collect()
}
