//! Decimal money strings ↔ integer minor units.
//!
//! Provider amounts arrive as decimal strings (`"12.34"`, `"-0.30"`). All
//! arithmetic happens on `i64` cents; nothing in the crate touches floats.

use tracing::warn;

/// Parse a decimal amount into cents. Integer math only.
///
/// Fractions beyond two digits are rounded half away from zero
/// (`"5.505"` → 551, `"-0.125"` → -13).
pub fn parse_cents(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty amount".into());
    }
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (dollars, cents) = if let Some(dot) = s.find('.') {
        let whole = &s[..dot];
        let d: i64 = if whole.is_empty() {
            0
        } else {
            parse_digits(whole).map_err(|e| format!("bad dollars: {e}"))?
        };
        let frac = &s[dot + 1..];
        if whole.is_empty() && frac.is_empty() {
            return Err(format!("not a number: '{s}'"));
        }
        (d, fraction_cents(frac)?)
    } else {
        (parse_digits(s).map_err(|e| format!("bad amount: {e}"))?, 0)
    };
    let minor = dollars
        .checked_mul(100)
        .and_then(|m| m.checked_add(cents))
        .ok_or_else(|| format!("amount out of range: {s}"))?;
    Ok(if negative { -minor } else { minor })
}

/// Cents from the digits after the point, rounded on the third digit.
/// May return 100 when `.995` and up rounds into the next unit.
fn fraction_cents(frac: &str) -> Result<i64, String> {
    if frac.is_empty() {
        return Ok(0);
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad cents: not a number: '{frac}'"));
    }
    let digit = |i: usize| frac.as_bytes().get(i).map_or(0, |b| i64::from(b - b'0'));
    let cents = digit(0) * 10 + digit(1);
    Ok(if digit(2) >= 5 { cents + 1 } else { cents })
}

fn parse_digits(s: &str) -> Result<i64, String> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("not a number: '{s}'"));
    }
    s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
}

/// Render cents as `d.dd` (`-` prefix for negatives).
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Sum every parsable value. `None` when no value parsed at all.
/// A value that would overflow the running total is skipped like an
/// unparsable one.
pub fn sum_parsable<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<i64> {
    let mut total: Option<i64> = None;
    for value in values {
        let Ok(cents) = parse_cents(value) else {
            continue;
        };
        match total.unwrap_or(0).checked_add(cents) {
            Some(sum) => total = Some(sum),
            None => warn!(value, "amount overflows running total; skipped"),
        }
    }
    total
}
