//! Phone normalization: canonicalize arbitrary input to the national
//! mobile form `09XXXXXXXXX`.
//!
//! Strip everything but digits first, *then* peel known prefixes off the
//! digit-only string. Persian/Arabic-Indic digits are transliterated to
//! ASCII before any of that happens.

use once_cell::sync::Lazy;
use regex::Regex;

static NATIONAL_MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^09\d{9}$").unwrap());
static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Normalize a raw phone string to `09XXXXXXXXX`, or `None` if it can't be.
pub fn normalize(raw: &str) -> Option<String> {
    let ascii = to_ascii_digits(raw);
    let mut digits = NON_DIGIT.replace_all(&ascii, "").into_owned();

    if let Some(rest) = digits.strip_prefix("0098") {
        digits = format!("0{rest}");
    } else if let Some(rest) = digits.strip_prefix("98") {
        digits = format!("0{rest}");
    }

    if digits.starts_with('9') && digits.len() == 10 {
        digits = format!("0{digits}");
    }

    if NATIONAL_MOBILE.is_match(&digits) {
        Some(digits)
    } else {
        None
    }
}

/// True iff `normalize` would accept this input.
pub fn is_valid(raw: &str) -> bool {
    normalize(raw).is_some()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_forms_all_normalize_the_same() {
        for input in [
            "09123456789",
            "+989123456789",
            "00989123456789",
            "9123456789",
        ] {
            assert_eq!(normalize(input).as_deref(), Some("09123456789"), "{input}");
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(normalize("12345"), None);
        assert_eq!(normalize("071234567890"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("+989123456789").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn transliterates_persian_digits() {
        assert_eq!(normalize("۰۹۱۲۳۴۵۶۷۸۹").as_deref(), Some("09123456789"));
    }

    #[test]
    fn strips_separators_before_prefix_check() {
        assert_eq!(normalize("+98 912-345 6789").as_deref(), Some("09123456789"));
    }
}
