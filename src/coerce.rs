//! Conversions from extracted text into typed report values.
//!
//! Every coercer has a defined fallback for missing or unusable input, so
//! callers never need to handle a parse failure.

use regex::Regex;
use std::num::IntErrorKind;
use std::sync::LazyLock;

static LEADING_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?)([0-9]+)").expect("static regex is valid"));

/// Parse the leading integer of `raw`, ignoring anything after the digits.
///
/// `" 720"` → 720, `"12.9"` → 12, `"-3 days"` → -3, `"n/a"` → 0, absent → 0.
/// Only ASCII digits count; other scripts' digits fall back to 0.
/// Values too large for `i64` saturate.
pub fn to_integer(raw: Option<&str>) -> i64 {
    let Some(caps) = raw.and_then(|value| LEADING_INTEGER.captures(value)) else {
        return 0;
    };
    let negative = &caps[1] == "-";
    match caps[2].parse::<i64>() {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
            if negative {
                i64::MIN
            } else {
                i64::MAX
            }
        }
        Err(_) => 0,
    }
}

/// [`to_integer`] clamped at zero, for counts and amounts.
pub fn to_non_negative(raw: Option<&str>) -> i64 {
    to_integer(raw).max(0)
}

pub fn to_trimmed_string(raw: Option<&str>) -> String {
    raw.map(str::trim).unwrap_or_default().to_string()
}

/// Join the non-blank parts with `", "`, keeping their order.
pub fn join_parts(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
