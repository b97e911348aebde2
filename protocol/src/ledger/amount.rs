//! Exact decimal amounts.
//!
//! An [`Amount`] is a signed count of stroops, the smallest unit of the
//! native asset (seven fractional digits). Decimal strings are parsed into
//! stroops exactly once, at the edge; everything after that is integer
//! arithmetic, so there is no rounding direction to get wrong. The wire
//! value is the same stroop count, so converting to minor units never
//! rounds a second time either.
//!
//! Amounts serialize as fixed seven-digit decimal strings (`"98.5000000"`),
//! which is also the form that goes into intent JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{AMOUNT_DECIMALS, STROOPS_PER_UNIT};

/// Reasons a decimal string is not an amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount is not a finite decimal: {0:?}")]
    NotDecimal(String),

    #[error("amount has more than {AMOUNT_DECIMALS} fractional digits: {0:?}")]
    TooPrecise(String),

    #[error("amount out of range: {0:?}")]
    Overflow(String),
}

/// A signed native-asset amount in stroops.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw stroop count.
    pub const fn from_stroops(stroops: i64) -> Self {
        Self(stroops)
    }

    /// Whole units, for tests and constants.
    pub const fn from_units(units: i64) -> Self {
        Self(units * STROOPS_PER_UNIT)
    }

    /// The wire value: integer minor units.
    pub const fn stroops(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Saturating subtraction; balances far from `i64` bounds never hit it.
    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(AmountError::NotDecimal(raw.to_string()));
        }
        if frac_part.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountError::TooPrecise(raw.to_string()));
        }

        let overflow = || AmountError::Overflow(raw.to_string());
        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };

        let mut frac: i64 = 0;
        for (i, b) in frac_part.bytes().enumerate() {
            let place = 10i64.pow(AMOUNT_DECIMALS - 1 - i as u32);
            frac += i64::from(b - b'0') * place;
        }

        let stroops = whole
            .checked_mul(STROOPS_PER_UNIT)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(overflow)?;

        Ok(Amount(if negative { -stroops } else { stroops }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = STROOPS_PER_UNIT as u64;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / unit,
            abs % unit,
            width = AMOUNT_DECIMALS as usize
        )
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self)
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
