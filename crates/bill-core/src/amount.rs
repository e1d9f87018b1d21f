//! Fixed-point money and hour amounts.
//!
//! Both types store hundredths in an `i64` so that every rounding step in the
//! billing pipeline is exact integer arithmetic. Rounding is half away from
//! zero on the exact remainder.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors parsing a decimal amount.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The text is not a decimal number.
    #[error("invalid amount: {value:?}")]
    Invalid { value: String },

    /// More than two decimal places were given.
    #[error("amount {value:?} has more than 2 decimal places")]
    TooPrecise { value: String },
}

/// Divides and rounds half away from zero. `denominator` must be positive.
pub(crate) const fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if 2 * remainder.abs() >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

fn parse_hundredths(input: &str) -> Result<i64, AmountError> {
    let invalid = || AmountError::Invalid {
        value: input.to_string(),
    };

    let trimmed = input.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > 2 {
        return Err(AmountError::TooPrecise {
            value: input.to_string(),
        });
    }

    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac_value: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };

    let value = whole_value
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(invalid)?;
    Ok(if negative { -value } else { value })
}

fn format_hundredths(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Generates the arithmetic and formatting impls shared by the fixed-point types.
macro_rules! impl_fixed_point {
    ($name:ident) => {
        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Neg for $name {
            type Output = Self;

            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, Add::add)
            }
        }

        impl<'a> Sum<&'a $name> for $name {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                iter.copied().sum()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_hundredths(self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = AmountError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hundredths(s).map(Self)
            }
        }
    };
}

/// A currency amount in cents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Multiplies an hour amount by an hourly rate, rounding to the cent.
    ///
    /// `hundredths * cents / 100` is computed in 128-bit integers, so a rate of
    /// 33.33 over 1.50 hours gives exactly 50.00 (49.995 rounded half up).
    pub fn for_hours(hours: Hours, rate: Self) -> Self {
        let product = i128::from(hours.0) * i128::from(rate.0);
        Self(saturate(div_round_half_up(product, 100)))
    }

    /// Absolute difference in cents.
    pub const fn abs_diff(self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl_fixed_point!(Money);

/// An hour amount in hundredths of an hour.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Hours(i64);

impl Hours {
    pub const ZERO: Self = Self(0);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    pub const fn from_whole(hours: i64) -> Self {
        Self(hours * 100)
    }

    /// Converts minutes to hours rounded to two decimal places.
    pub fn from_minutes(minutes: i64) -> Self {
        Self(saturate(div_round_half_up(i128::from(minutes) * 100, 60)))
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Absolute difference in hundredths of an hour.
    pub const fn abs_diff(self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl_fixed_point!(Hours);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_round_half_up_rounds_away_from_zero() {
        assert_eq!(div_round_half_up(5, 2), 3);
        assert_eq!(div_round_half_up(4, 3), 1);
        assert_eq!(div_round_half_up(-5, 2), -3);
        assert_eq!(div_round_half_up(-4, 3), -1);
        assert_eq!(div_round_half_up(0, 7), 0);
    }

    #[test]
    fn hours_from_minutes_rounds_to_hundredths() {
        assert_eq!(Hours::from_minutes(120), Hours::from_hundredths(200));
        assert_eq!(Hours::from_minutes(20), Hours::from_hundredths(33));
        assert_eq!(Hours::from_minutes(40), Hours::from_hundredths(67));
        // 1.666.. hundredths
        assert_eq!(Hours::from_minutes(1), Hours::from_hundredths(2));
        assert_eq!(Hours::from_minutes(0), Hours::ZERO);
    }

    #[test]
    fn money_for_hours_is_exact() {
        let rate: Money = "50".parse().unwrap();
        assert_eq!(
            Money::for_hours(Hours::from_hundredths(200), rate),
            Money::from_cents(10_000)
        );

        let rate: Money = "33.33".parse().unwrap();
        assert_eq!(
            Money::for_hours(Hours::from_hundredths(150), rate),
            Money::from_cents(5000)
        );

        // 0.1 + 0.2 style drift cannot happen: 0.30 h at 0.10/h is 0.03
        let rate: Money = "0.10".parse().unwrap();
        assert_eq!(
            Money::for_hours(Hours::from_hundredths(30), rate),
            Money::from_cents(3)
        );
    }

    #[test]
    fn parse_accepts_common_forms() {
        assert_eq!("50".parse::<Money>().unwrap().cents(), 5000);
        assert_eq!("50.5".parse::<Money>().unwrap().cents(), 5050);
        assert_eq!("50.25".parse::<Money>().unwrap().cents(), 5025);
        assert_eq!(".5".parse::<Hours>().unwrap().hundredths(), 50);
        assert_eq!("-1.25".parse::<Hours>().unwrap().hundredths(), -125);
        assert_eq!(" 7 ".parse::<Hours>().unwrap().hundredths(), 700);
    }

    #[test]
    fn parse_rejects_garbage_and_excess_precision() {
        assert!(matches!(
            "abc".parse::<Money>(),
            Err(AmountError::Invalid { .. })
        ));
        assert!(matches!("".parse::<Money>(), Err(AmountError::Invalid { .. })));
        assert!(matches!(".".parse::<Money>(), Err(AmountError::Invalid { .. })));
        assert!(matches!(
            "1.234".parse::<Money>(),
            Err(AmountError::TooPrecise { .. })
        ));
    }

    #[test]
    fn display_always_has_two_decimals() {
        assert_eq!(Money::from_cents(10_000).to_string(), "100.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-150).to_string(), "-1.50");
        assert_eq!(Hours::from_hundredths(67).to_string(), "0.67");
    }

    #[test]
    fn serde_is_transparent_integer() {
        let json = serde_json::to_string(&Money::from_cents(1234)).unwrap();
        assert_eq!(json, "1234");
        let parsed: Hours = serde_json::from_str("250").unwrap();
        assert_eq!(parsed, Hours::from_hundredths(250));
    }

    #[test]
    fn sum_and_diff() {
        let total: Money = [Money::from_cents(100), Money::from_cents(250)]
            .iter()
            .sum();
        assert_eq!(total, Money::from_cents(350));
        assert_eq!(Hours::from_hundredths(100).abs_diff(Hours::from_hundredths(99)), 1);
    }
}
