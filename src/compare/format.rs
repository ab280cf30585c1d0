//! Money and date rendering for the comparison payload

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};

/// Formats an amount with two decimals, comma as decimal separator and dot
/// as thousands separator, e.g. `R$ 1.234,50`
///
/// Half cents round away from zero. An empty `symbol` yields the bare number.
pub fn format_money(value: Decimal, symbol: &str) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let digits = format!("{:.2}", rounded.abs());
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if rounded < Decimal::ZERO { "-" } else { "" };

    if symbol.is_empty() {
        format!("{}{},{}", sign, grouped, fraction)
    } else {
        format!("{} {}{},{}", symbol, sign, grouped, fraction)
    }
}

/// Renders a timestamp as `dd/mm/YYYY HH:MM:SS` in the given zone
pub fn format_datetime(ts: &DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz).format("%d/%m/%Y %H:%M:%S").to_string()
}

/// Renders a timestamp as RFC 3339 with the zone's offset
pub fn format_iso(ts: &DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz).to_rfc3339()
}
