//! Amount parsing and display helpers.
//!
//! Amounts are `rust_decimal::Decimal` everywhere. Display follows the
//! Vietnamese convention used by the dashboard: `.` groups thousands and `,`
//! marks decimals.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::Error;

/// Parse a non-negative amount.
///
/// Accepts plain decimal strings as well as scientific notation, which is
/// what floating-point balances written by older clients look like
/// (`"1.5e-7"`).
pub fn parse_amount(s: &str) -> Result<Decimal, Error> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidAmount("empty amount".to_string()));
    }

    let value = Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| Error::InvalidAmount(format!("{}: {}", s, e)))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::InvalidAmount(format!("{} is negative", s)));
    }

    Ok(value)
}

/// Whole units, rounded down: `1234567.89` -> `1.234.567`.
pub fn format_whole(amount: Decimal) -> String {
    let whole = amount.floor();
    let neg = whole.is_sign_negative() && !whole.is_zero();
    group_thousands(&whole.abs().trunc().to_string(), neg)
}

/// Two decimals, rounded half away from zero: `1234.5` -> `1.234,50`.
pub fn format_live(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let neg = rounded.is_sign_negative() && !rounded.is_zero();
    let abs = rounded.abs();
    let int_part = abs.trunc();
    let frac_part = ((abs - int_part) * Decimal::ONE_HUNDRED).trunc();

    format!(
        "{},{:02}",
        group_thousands(&int_part.to_string(), neg),
        frac_part.to_u32().unwrap_or(0)
    )
}

fn group_thousands(digits: &str, neg: bool) -> String {
    let digits = digits.split('.').next().unwrap_or(digits);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if neg {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}
