//! Fixed-point arithmetic on pips
//!
//! Every quantity, price and quote amount is an `i64` scaled by 10^8.
//! Products are widened to `i128` and truncated toward zero, so results are
//! bit-exact across runs. A result that does not fit back into `i64` fails
//! with `RiskError::ArithmeticOverflow`; nothing is ever silently truncated.

use rust_decimal::Decimal;

use crate::errors::RiskError;

/// Signed fixed-point value, 10^-8 of a unit.
pub type Pips = i64;

/// Number of decimal places carried by a pip value.
pub const PIP_DECIMALS: u32 = 8;

/// One whole unit in pips (10^8).
pub const PIP_SCALE: i64 = 100_000_000;

/// `round_toward_zero(value × numerator / denominator)`
///
/// The intermediate product is computed in `i128`, which always holds the
/// product of two `i64` values, so only the final narrowing can overflow.
pub fn multiply_by_fraction(
    value: Pips,
    numerator: i64,
    denominator: i64,
) -> Result<Pips, RiskError> {
    if denominator == 0 {
        return Err(RiskError::DivisionByZero);
    }
    let product = i128::from(value) * i128::from(numerator);
    let quotient = product / i128::from(denominator);
    Pips::try_from(quotient).map_err(|_| RiskError::ArithmeticOverflow)
}

/// Absolute value; fails only for `i64::MIN`.
pub fn abs(value: Pips) -> Result<Pips, RiskError> {
    value.checked_abs().ok_or(RiskError::ArithmeticOverflow)
}

/// Checked addition.
pub fn add(a: Pips, b: Pips) -> Result<Pips, RiskError> {
    a.checked_add(b).ok_or(RiskError::ArithmeticOverflow)
}

/// Checked subtraction.
pub fn sub(a: Pips, b: Pips) -> Result<Pips, RiskError> {
    a.checked_sub(b).ok_or(RiskError::ArithmeticOverflow)
}

/// Checked negation.
pub fn neg(value: Pips) -> Result<Pips, RiskError> {
    value.checked_neg().ok_or(RiskError::ArithmeticOverflow)
}

/// Checked sum of a sequence of pip values.
pub fn sum<I>(values: I) -> Result<Pips, RiskError>
where
    I: IntoIterator<Item = Pips>,
{
    values.into_iter().try_fold(0, add)
}

/// Render pips as a decimal with 8 fractional digits.
pub fn to_decimal(value: Pips) -> Decimal {
    Decimal::new(value, PIP_DECIMALS)
}
