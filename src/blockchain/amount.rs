// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM token amounts.
//!
//! Amounts are kept as exact wei (`U256`). Floating point is only produced
//! at the display boundary (`units()` / `gwei()`), never fed back into
//! on-chain values.

use std::fmt;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Decimals of an EVM native coin.
pub const NATIVE_DECIMALS: u8 = 18;

const GWEI_IN_WEI: u64 = 1_000_000_000;

/// Errors from amount parsing and conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),

    #[error("Too many decimal places (max {0})")]
    TooManyDecimals(u8),

    #[error("Amount overflow")]
    Overflow,
}

/// An amount of an EVM asset, unifying unit / gwei / wei representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EvmTokenAmount {
    wei: U256,
}

impl EvmTokenAmount {
    pub const ZERO: Self = Self { wei: U256::ZERO };

    /// Amount from an exact wei value.
    pub const fn from_wei(wei: U256) -> Self {
        Self { wei }
    }

    /// Amount from whole gwei.
    pub fn from_gwei(gwei: u64) -> Self {
        Self {
            wei: U256::from(gwei) * U256::from(GWEI_IN_WEI),
        }
    }

    /// Amount from a display-unit float (1.0 == 1 ETH).
    ///
    /// Precision is limited to 9 decimal places (gwei); negative and
    /// non-finite inputs collapse to zero.
    pub fn from_units(units: f64) -> Self {
        if !units.is_finite() || units <= 0.0 {
            return Self::ZERO;
        }
        let gwei = (units * GWEI_IN_WEI as f64).round();
        if gwei >= u128::MAX as f64 {
            return Self { wei: U256::MAX };
        }
        Self {
            wei: U256::from(gwei as u128) * U256::from(GWEI_IN_WEI),
        }
    }

    /// Parse a decimal string (e.g. `"1.5"`) with the given decimals into
    /// an atomic amount, then scale it to 18-decimal wei.
    pub fn parse_units(amount: &str, decimals: u8) -> Result<Self, AmountError> {
        let atomic = parse_atomic(amount, decimals)?;
        Self::from_atomic(atomic, decimals)
    }

    /// Amount from an atomic value of a token with `decimals`.
    pub fn from_atomic(atomic: U256, decimals: u8) -> Result<Self, AmountError> {
        if decimals > NATIVE_DECIMALS {
            let divisor = pow10(decimals - NATIVE_DECIMALS);
            return Ok(Self { wei: atomic / divisor });
        }
        let factor = pow10(NATIVE_DECIMALS - decimals);
        atomic
            .checked_mul(factor)
            .map(Self::from_wei)
            .ok_or(AmountError::Overflow)
    }

    /// Exact wei value.
    pub fn wei(&self) -> U256 {
        self.wei
    }

    /// Value in the atomic unit of a token with `decimals` (truncating).
    pub fn to_atomic(&self, decimals: u8) -> U256 {
        if decimals >= NATIVE_DECIMALS {
            self.wei * pow10(decimals - NATIVE_DECIMALS)
        } else {
            self.wei / pow10(NATIVE_DECIMALS - decimals)
        }
    }

    /// Gwei value for display.
    pub fn gwei(&self) -> f64 {
        to_f64(self.wei) / GWEI_IN_WEI as f64
    }

    /// Display-unit value (1.0 == 1 ETH).
    pub fn units(&self) -> f64 {
        to_f64(self.wei) / 1e18
    }

    pub fn is_zero(&self) -> bool {
        self.wei.is_zero()
    }
}

impl fmt::Display for EvmTokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_amount(self.wei, NATIVE_DECIMALS))
    }
}

fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

fn to_f64(value: U256) -> f64 {
    // Exact for anything below 2^53, lossy beyond, which is fine for display.
    value.to_string().parse::<f64>().unwrap_or(f64::MAX)
}

/// Parse a human-readable amount into the token's smallest unit.
pub fn parse_atomic(amount: &str, decimals: u8) -> Result<U256, AmountError> {
    let amount = amount.trim();
    let parts: Vec<&str> = amount.split('.').collect();

    if parts.len() > 2 || (parts[0].is_empty() && parts.get(1).map_or(true, |p| p.is_empty())) {
        return Err(AmountError::InvalidFormat(amount.to_string()));
    }

    let whole = if parts[0].is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(parts[0], 10)
            .map_err(|_| AmountError::InvalidFormat(amount.to_string()))?
    };

    let fraction = match parts.get(1) {
        Some(dec_str) if !dec_str.is_empty() => {
            if dec_str.len() > decimals as usize {
                return Err(AmountError::TooManyDecimals(decimals));
            }
            let padded = format!("{:0<width$}", dec_str, width = decimals as usize);
            U256::from_str_radix(&padded, 10)
                .map_err(|_| AmountError::InvalidFormat(amount.to_string()))?
        }
        _ => U256::ZERO,
    };

    whole
        .checked_mul(pow10(decimals))
        .and_then(|w| w.checked_add(fraction))
        .ok_or(AmountError::Overflow)
}

/// Format an atomic amount as a human-readable decimal string.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = pow10(decimals);
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = decimal_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}
