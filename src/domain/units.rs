//! Conversion between human-readable decimal amounts and on-chain base units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// rust_decimal keeps at most 28 fractional digits
const MAX_SCALE: u32 = 28;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("Amount must not be negative: {0}")]
    Negative(Decimal),
    #[error("Amount {amount} has more precision than {decimals} decimals")]
    ExcessPrecision { amount: Decimal, decimals: u32 },
    #[error("Amount {0} does not fit in base units")]
    Overflow(String),
    #[error("Unsupported decimals: {0}")]
    UnsupportedDecimals(u32),
}

fn pow10(decimals: u32) -> Result<Decimal, UnitsError> {
    if decimals > MAX_SCALE {
        return Err(UnitsError::UnsupportedDecimals(decimals));
    }
    Decimal::try_from_i128_with_scale(10i128.pow(decimals), 0)
        .map_err(|_| UnitsError::UnsupportedDecimals(decimals))
}

/// Convert a decimal amount into integer base units (e.g. 12.5 USDT @6 -> 12_500_000).
///
/// Amounts carrying more precision than the token supports are rejected instead of
/// being silently truncated.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128, UnitsError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitsError::Negative(amount));
    }
    let scaled = amount
        .checked_mul(pow10(decimals)?)
        .ok_or_else(|| UnitsError::Overflow(amount.to_string()))?;
    if !scaled.fract().is_zero() {
        return Err(UnitsError::ExcessPrecision { amount, decimals });
    }
    scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| UnitsError::Overflow(amount.to_string()))
}

/// Convert integer base units into a normalized decimal amount.
pub fn from_base_units(raw: u128, decimals: u32) -> Result<Decimal, UnitsError> {
    if decimals > MAX_SCALE {
        return Err(UnitsError::UnsupportedDecimals(decimals));
    }
    let signed = i128::try_from(raw).map_err(|_| UnitsError::Overflow(raw.to_string()))?;
    Decimal::try_from_i128_with_scale(signed, decimals)
        .map(|d| d.normalize())
        .map_err(|_| UnitsError::Overflow(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_usdt_six_decimals() {
        assert_eq!(to_base_units(dec!(12.50), 6).unwrap(), 12_500_000);
        assert_eq!(from_base_units(12_500_000, 6).unwrap(), dec!(12.5));
    }

    #[test]
    fn test_bsc_usdt_eighteen_decimals() {
        assert_eq!(
            to_base_units(dec!(100), 18).unwrap(),
            100_000_000_000_000_000_000
        );
        assert_eq!(
            from_base_units(1_000_000_000_000_000, 18).unwrap(),
            dec!(0.001)
        );
    }

    #[test]
    fn test_excess_precision_rejected() {
        let err = to_base_units(dec!(0.0000001), 6).unwrap_err();
        assert!(matches!(err, UnitsError::ExcessPrecision { decimals: 6, .. }));
    }

    #[test]
    fn test_negative_rejected() {
        assert!(matches!(
            to_base_units(dec!(-1), 6),
            Err(UnitsError::Negative(_))
        ));
    }

    #[test]
    fn test_zero() {
        assert_eq!(to_base_units(Decimal::ZERO, 18).unwrap(), 0);
        assert_eq!(from_base_units(0, 18).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_unsupported_decimals() {
        assert!(matches!(
            from_base_units(1, 40),
            Err(UnitsError::UnsupportedDecimals(40))
        ));
    }
}
