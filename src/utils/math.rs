//! Fixed-point arithmetic and mathematical utilities.
//!
//! Every quantity that enters consensus state is an unsigned integer. This
//! module provides overflow-checked helpers, boosted-ratio math, and the
//! deterministic fixed-point substitute for the CDP interest formula. No
//! floating point is used anywhere: two nodes evaluating the same inputs
//! always produce identical results.

use crate::error::{Error, Result};
use crate::utils::constants::{COIN, DAYS_PER_YEAR};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> Result<u64> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u64, b: u64) -> Result<u64> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Computes `(a * b) / c` with a u128 intermediate, truncating.
///
/// This is the canonical building block for ratio and liquidation math; the
/// truncation point is part of the consensus contract, so callers must not
/// reorder factor groupings.
pub fn mul_div(a: u64, b: u64, c: u64) -> Result<u64> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("({} * {}) / 0", a, b),
        });
    }
    let result = (a as u128) * (b as u128) / (c as u128);
    if result > u64::MAX as u128 {
        return Err(Error::Overflow {
            operation: format!("({} * {}) / {}", a, b, c),
        });
    }
    Ok(result as u64)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEDIAN
// ═══════════════════════════════════════════════════════════════════════════════

/// Calculate the median of a slice (sorts the slice).
///
/// Even-length inputs take the mean of the two middle values, truncating.
pub fn median(values: &mut [u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2)
    } else {
        Some(values[mid])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-point number with 18 decimal places of precision.
///
/// Used only where a rational intermediate is unavoidable (the interest-rate
/// logarithm); all results are converted back to atomic u64 units before
/// touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FixedPoint(u128);

impl FixedPoint {
    /// Scale factor: 10^18
    pub const SCALE: u128 = 1_000_000_000_000_000_000;

    /// Zero value
    pub const ZERO: Self = Self(0);

    /// One (1.0)
    pub const ONE: Self = Self(Self::SCALE);

    /// log10(2) at SCALE precision. Frozen: changing this constant is a
    /// consensus break.
    const LOG10_2: u128 = 301_029_995_663_981_195;

    /// Create a new FixedPoint from a raw scaled value
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Create from an integer (scales up)
    pub fn from_integer(value: u64) -> Self {
        Self((value as u128) * Self::SCALE)
    }

    /// Get the raw underlying value
    pub fn raw(&self) -> u128 {
        self.0
    }

    /// Check if value is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Base-2 logarithm for values >= 1, via the binary-logarithm
    /// repeated-squaring method. Pure integer arithmetic; the fraction is
    /// accumulated one bit per squaring until the bit value underflows the
    /// scale.
    pub fn log2(self) -> Result<Self> {
        if self.0 < Self::SCALE {
            return Err(Error::Underflow {
                operation: format!("log2 of {} < 1", self.0),
            });
        }

        let mut y = self.0;
        let mut int_part: u128 = 0;
        while y >= 2 * Self::SCALE {
            y /= 2;
            int_part += 1;
        }

        // y is now in [1, 2); extract fraction bits
        let mut frac: u128 = 0;
        let mut shift = 1u32;
        loop {
            let bit = Self::SCALE >> shift;
            if bit == 0 {
                break;
            }
            y = y * y / Self::SCALE;
            if y >= 2 * Self::SCALE {
                y /= 2;
                frac += bit;
            }
            shift += 1;
        }

        Ok(Self(int_part * Self::SCALE + frac))
    }

    /// Base-10 logarithm for values >= 1: `log2(x) * log10(2)`.
    pub fn log10(self) -> Result<Self> {
        let l2 = self.log2()?;
        Ok(Self(l2.0 * Self::LOG10_2 / Self::SCALE))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CDP INTEREST
// ═══════════════════════════════════════════════════════════════════════════════

/// Deterministic CDP interest:
///
/// ```text
/// annual_rate = A / 10 / log10(1 + B * N / COIN)
/// interest    = N * loaned_days * annual_rate / 365
/// ```
///
/// where `N` is the owed S-coin total. The evaluation order below (owed times
/// rate, then days, then the year divisor, truncating at each step) is frozen
/// as part of the consensus contract.
pub fn cdp_interest(owed_scoins: u64, loaned_days: u32, param_a: u64, param_b: u64) -> Result<u64> {
    if owed_scoins == 0 || loaned_days == 0 {
        return Ok(0);
    }

    // x = 1 + B * N / COIN, at fixed-point scale
    let bn = (param_b as u128)
        .checked_mul(owed_scoins as u128)
        .and_then(|v| v.checked_mul(FixedPoint::SCALE / COIN as u128))
        .ok_or(Error::Overflow {
            operation: "interest B * N".into(),
        })?;
    let x = FixedPoint::from_raw(FixedPoint::SCALE.checked_add(bn).ok_or(Error::Overflow {
        operation: "interest 1 + B * N / COIN".into(),
    })?);

    let log10_x = x.log10()?;
    if log10_x.is_zero() {
        return Err(Error::Overflow {
            operation: "interest log10(1 + B * N / COIN) == 0".into(),
        });
    }

    // annual_rate = (A / 10) / log10(x)
    let a_scaled = (param_a as u128)
        .checked_mul(FixedPoint::SCALE / 10)
        .ok_or(Error::Overflow {
            operation: "interest A / 10".into(),
        })?;
    let rate_raw = a_scaled
        .checked_mul(FixedPoint::SCALE)
        .ok_or(Error::Overflow {
            operation: "interest annual rate".into(),
        })?
        / log10_x.raw();

    // interest = N * rate * days / 365
    let interest = (owed_scoins as u128)
        .checked_mul(rate_raw)
        .ok_or(Error::Overflow {
            operation: "interest N * rate".into(),
        })?
        / FixedPoint::SCALE;
    let interest = interest
        .checked_mul(loaned_days as u128)
        .ok_or(Error::Overflow {
            operation: "interest * days".into(),
        })?
        / DAYS_PER_YEAR as u128;

    if interest > u64::MAX as u128 {
        return Err(Error::Overflow {
            operation: "interest result".into(),
        });
    }
    Ok(interest as u64)
}
