//! Conversion between major currency units and the processor's integer
//! minor units. Rounding happens here and nowhere else: half away from zero,
//! once per conversion.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, ToPrimitive};
use thiserror::Error;

/// 1 major unit = 100 minor units (sum / tiyin).
pub const DEFAULT_MINOR_UNIT_SCALE: u32 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    #[error("minor unit scale must be greater than zero")]
    ZeroScale,

    #[error("amount {0} does not fit into minor units")]
    OutOfRange(BigDecimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountConverter {
    scale: u32,
}

impl AmountConverter {
    pub fn new(scale: u32) -> Result<Self, AmountError> {
        if scale == 0 {
            return Err(AmountError::ZeroScale);
        }
        Ok(Self { scale })
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn to_minor_units(&self, amount: &BigDecimal) -> Result<i64, AmountError> {
        let factor = BigDecimal::from(i64::from(self.scale));
        let scaled = amount * &factor;
        let half = BigDecimal::new(BigInt::from(5), 1);
        let rounded = if scaled < BigDecimal::from(0) {
            scaled - half
        } else {
            scaled + half
        };

        // with_scale truncates toward zero, which after the half shift rounds.
        rounded
            .with_scale(0)
            .to_i64()
            .ok_or_else(|| AmountError::OutOfRange(amount.clone()))
    }

    pub fn from_minor_units(&self, minor: i64) -> BigDecimal {
        BigDecimal::from(minor) / BigDecimal::from(i64::from(self.scale))
    }
}

impl Default for AmountConverter {
    fn default() -> Self {
        Self {
            scale: DEFAULT_MINOR_UNIT_SCALE,
        }
    }
}
