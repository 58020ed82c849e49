//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Decimal places used for every grid price and size.
pub const GRID_PRECISION: u32 = 2;

/// Round a decimal to a specific number of decimal places (banker's rounding).
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Round to the grid's fixed two-decimal precision.
pub fn round_grid(value: Decimal) -> Decimal {
    round_to_precision(value, GRID_PRECISION)
}

/// Arithmetic mean of two prices; `None` if the sum overflows.
pub fn midpoint(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_add(b).map(|sum| sum / Decimal::TWO)
}

/// Parse a decimal from a JSON number or numeric string.
///
/// Exchanges are inconsistent about quoting numbers, so both forms are accepted.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
