//! Storage quantities
//!
//! Parses Kubernetes quantity strings ("10Gi", "10737418240", "1.5e3", "500m")
//! into a comparable magnitude. Two quantities compare by value, never by
//! their textual form, so `1Gi` and `1024Mi` are equal.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::cmp::Ordering;
use std::str::FromStr;

/// Nano-units per whole unit; the smallest scale a quantity can express
const NANOS_PER_UNIT: i32 = 9;

/// Exponents beyond this cannot be represented in 128 bits
const MAX_DECIMAL_SHIFT: i32 = 38;

/// Significant digits that always fit a `u128`
const MAX_SIGNIFICANT_DIGITS: usize = 38;

/// A parsed storage quantity
///
/// Held as a signed count of nano-units. Fractions below one nano-unit round
/// up, as the API server does.
#[derive(Debug, Clone)]
pub struct StorageQuantity {
    nanos: i128,
    raw: String,
}

/// Scale applied by a quantity suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scale {
    /// Power of 1024, as in `Ki`..`Ei`
    Binary(u32),
    /// Power of ten, as in `m`, `k`, `G` or `e3`
    Decimal(i32),
}

impl StorageQuantity {
    /// Parse a quantity string
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidQuantity {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (negative, unsigned) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            Some(_) => (false, s),
            None => return Err(invalid("empty quantity")),
        };

        // Split number and suffix
        let number_end = unsigned
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);

        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (number, ""),
        };
        if fraction.contains('.') {
            return Err(invalid("more than one decimal point"));
        }
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("missing number"));
        }

        let scale = parse_suffix(suffix).ok_or_else(|| invalid("unknown suffix"))?;
        let (binary_power, decimal_exp) = match scale {
            Scale::Binary(power) => (power, 0),
            Scale::Decimal(exp) => (0, exp),
        };

        // Fraction digits past this position change the value by less than
        // one nano-unit (1024^p < 10^(3p+1) for every binary suffix)
        let precision = decimal_exp
            .saturating_add(NANOS_PER_UNIT)
            .saturating_add(3 * binary_power as i32 + 1);
        let keep = usize::try_from(precision).unwrap_or(0).min(fraction.len());
        let (fraction, dropped) = fraction.split_at(keep);
        let inexact = dropped.bytes().any(|b| b != b'0');

        let digits = format!("{}{}", whole, fraction);
        let digits = digits.trim_start_matches('0');
        if digits.len() > MAX_SIGNIFICANT_DIGITS {
            return Err(invalid("value out of range"));
        }
        let mantissa: u128 = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| invalid("malformed number"))?
        };

        let fraction_len = i32::try_from(fraction.len()).map_err(|_| invalid("too many digits"))?;

        let mut value = mantissa
            .checked_mul(1u128 << (binary_power * 10))
            .ok_or_else(|| invalid("value out of range"))?;

        let shift = decimal_exp
            .checked_add(NANOS_PER_UNIT - fraction_len)
            .ok_or_else(|| invalid("exponent out of range"))?;
        let mut round_up = inexact;
        if shift >= 0 {
            if value != 0 {
                let factor = pow10(shift).ok_or_else(|| invalid("value out of range"))?;
                value = value
                    .checked_mul(factor)
                    .ok_or_else(|| invalid("value out of range"))?;
            }
        } else {
            value = match pow10(-shift) {
                Some(divisor) => {
                    if value % divisor != 0 {
                        round_up = false;
                    }
                    value.div_ceil(divisor)
                }
                // Anything non-zero still rounds up to one nano-unit
                None => {
                    round_up = false;
                    u128::from(value != 0 || inexact)
                }
            };
        }
        // A dropped non-zero tail rounds up unless the division already did
        if round_up {
            value = value
                .checked_add(1)
                .ok_or_else(|| invalid("value out of range"))?;
        }

        let magnitude = i128::try_from(value).map_err(|_| invalid("value out of range"))?;
        Ok(Self {
            nanos: if negative { -magnitude } else { magnitude },
            raw: s.to_string(),
        })
    }

    /// Parse a Kubernetes API quantity
    pub fn from_quantity(quantity: &Quantity) -> Result<Self> {
        Self::parse(&quantity.0)
    }

    /// The zero quantity
    pub fn zero() -> Self {
        Self {
            nanos: 0,
            raw: "0".to_string(),
        }
    }

    /// Value in nano-units
    pub fn as_nanos(&self) -> i128 {
        self.nanos
    }

    /// Whole units, truncated toward zero
    pub fn as_units(&self) -> i128 {
        self.nanos / 10i128.pow(NANOS_PER_UNIT as u32)
    }

    /// The text this quantity was parsed from
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_suffix(suffix: &str) -> Option<Scale> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(1),
        "Mi" => Scale::Binary(2),
        "Gi" => Scale::Binary(3),
        "Ti" => Scale::Binary(4),
        "Pi" => Scale::Binary(5),
        "Ei" => Scale::Binary(6),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            let unsigned = exponent
                .strip_prefix('-')
                .or_else(|| exponent.strip_prefix('+'))
                .unwrap_or(exponent);
            if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Scale::Decimal(exponent.parse().ok()?)
        }
    };
    Some(scale)
}

fn pow10(exp: i32) -> Option<u128> {
    if !(0..=MAX_DECIMAL_SHIFT).contains(&exp) {
        return None;
    }
    10u128.checked_pow(exp as u32)
}

impl FromStr for StorageQuantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for StorageQuantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for StorageQuantity {}

impl PartialOrd for StorageQuantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StorageQuantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl std::fmt::Display for StorageQuantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
