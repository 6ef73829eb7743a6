//! Fixed-point arithmetic over wide unsigned integers
//!
//! Amounts are `u128`. Anything that multiplies two amounts goes through a
//! 256-bit (or 512-bit) intermediate so nothing overflows before the final
//! division. Real-valued quantities (reward factors, the exponential) use an
//! unsigned Q64.64 layout stored in a `U256`: the value `v` is `v / 2^64`.
//!
//! Every function here rounds down unless its name says `ceil`. Callers pick
//! the direction that leaves the remainder with the pool.

use crate::error::MathError;
pub use primitive_types::{U256, U512};

/// Binary point of the Q64.64 layout
pub const Q64_SHIFT: usize = 64;

/// 1.0 in Q64.64
pub const ONE_Q64: U256 = U256([0, 1, 0, 0]);

/// e in Q64.64, floor(e * 2^64) = 50143449209799256682
const E_Q64: U256 = U256([13_249_961_062_380_153_450, 2, 0, 0]);

/// e^-45 < 2^-64, so anything at or above this exponent underflows to zero
const EXP_NEG_CUTOFF: U256 = U256([0, 45, 0, 0]);

/// Taylor terms for e^f with f in [0, 1); 1/21! is already below 2^-64
const EXP_SERIES_TERMS: u32 = 40;

/// Newton iterations for `sqrt`; the initial guess is within 2x of the root so
/// convergence takes at most ~9 steps for 256-bit inputs
const SQRT_MAX_ITERATIONS: usize = 64;

/// floor(a * b / denominator) with a 512-bit intermediate
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = a.full_mul(b) / U512::from(denominator);
    U256::try_from(quotient).map_err(|_| MathError::Overflow)
}

/// ceil(a * b / denominator) with a 512-bit intermediate
pub fn mul_div_ceil(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = div_ceil_u512(a.full_mul(b), U512::from(denominator))?;
    U256::try_from(quotient).map_err(|_| MathError::Overflow)
}

/// floor(a * b / denominator) for amounts
pub fn mul_div_u128(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    to_u128(mul_div(U256::from(a), U256::from(b), U256::from(denominator))?)
}

/// ceil(a * b / denominator) for amounts
pub fn mul_div_ceil_u128(a: u128, b: u128, denominator: u128) -> Result<u128, MathError> {
    to_u128(mul_div_ceil(U256::from(a), U256::from(b), U256::from(denominator))?)
}

/// ceil(numerator / denominator) in 512 bits
pub fn div_ceil_u512(numerator: U512, denominator: U512) -> Result<U512, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = numerator / denominator;
    if (numerator % denominator).is_zero() {
        Ok(quotient)
    } else {
        quotient.checked_add(U512::one()).ok_or(MathError::Overflow)
    }
}

/// Narrow to `u128`, failing instead of truncating
pub fn to_u128(value: U256) -> Result<u128, MathError> {
    if value.bits() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

/// floor(sqrt(x)) by Newton's method
///
/// Starts from `2^ceil(bits/2)`, which is never below the root, so the
/// iterates decrease monotonically and the first non-decreasing step marks
/// the floor root.
pub fn sqrt(x: U256) -> U256 {
    if x.is_zero() {
        return U256::zero();
    }

    let mut z = U256::one() << ((x.bits() + 1) / 2);
    for _ in 0..SQRT_MAX_ITERATIONS {
        let next = (z + x / z) >> 1usize;
        if next >= z {
            return z;
        }
        z = next;
    }
    z
}

/// floor(sqrt(a * b)) for two amounts; the result always fits `u128`
pub fn sqrt_product(a: u128, b: u128) -> u128 {
    sqrt(U256::from(a) * U256::from(b)).low_u128()
}

/// e^-x for a Q64.64 `x`, in Q64.64
///
/// Splits `x` into whole and fractional parts: e^whole by repeated
/// multiplication with e, e^frac by its Taylor series, then inverts the
/// product. The result is within a few units of 2^-64 plus a relative
/// 2^-56 of the true value; inputs of 45 or more return zero.
pub fn exp_neg_q64(x: U256) -> U256 {
    if x >= EXP_NEG_CUTOFF {
        return U256::zero();
    }

    let whole = (x >> Q64_SHIFT).low_u64();
    let frac = x & (ONE_Q64 - U256::one());

    let mut sum = ONE_Q64;
    let mut term = ONE_Q64;
    for i in 1..=EXP_SERIES_TERMS {
        term = ((term * frac) >> Q64_SHIFT) / U256::from(i);
        if term.is_zero() {
            break;
        }
        sum += term;
    }

    let mut power = ONE_Q64;
    for _ in 0..whole {
        power = (power * E_Q64) >> Q64_SHIFT;
    }

    let exp_x = (sum * power) >> Q64_SHIFT;
    (ONE_Q64 << Q64_SHIFT) / exp_x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q64_to_f64(value: U256) -> f64 {
        value.low_u128() as f64 / 18_446_744_073_709_551_616.0
    }

    fn q64_from_f64(value: f64) -> U256 {
        U256::from((value * 18_446_744_073_709_551_616.0) as u128)
    }

    #[test]
    fn test_mul_div_needs_wide_intermediate() {
        assert_eq!(
            mul_div_u128(u128::MAX, u128::MAX, u128::MAX).unwrap(),
            u128::MAX
        );
        assert_eq!(mul_div_u128(7, 3, 2).unwrap(), 10);
        assert_eq!(mul_div_ceil_u128(7, 3, 2).unwrap(), 11);
        assert_eq!(mul_div_ceil_u128(8, 3, 2).unwrap(), 12);
    }

    #[test]
    fn test_mul_div_errors() {
        assert_eq!(mul_div_u128(u128::MAX, 2, 1), Err(MathError::Overflow));
        assert_eq!(mul_div_u128(1, 2, 0), Err(MathError::DivisionByZero));
        assert_eq!(
            mul_div(U256::MAX, U256::MAX, U256::one()),
            Err(MathError::Overflow)
        );
    }

    #[test]
    fn test_sqrt_exact_and_floor() {
        for (x, root) in [(0u64, 0u64), (1, 1), (2, 1), (3, 1), (4, 2), (15, 3), (16, 4)] {
            assert_eq!(sqrt(U256::from(x)), U256::from(root));
        }
        assert_eq!(
            sqrt(U256::from(10_000_000_000_000_000u128)),
            U256::from(100_000_000u64)
        );
        assert_eq!(sqrt(U256::MAX), U256::from(u128::MAX));
        assert_eq!(sqrt_product(100_000_000, 100_000_000), 100_000_000);
    }

    #[test]
    fn test_exp_neg_endpoints() {
        assert_eq!(exp_neg_q64(U256::zero()), ONE_Q64);
        assert_eq!(exp_neg_q64(EXP_NEG_CUTOFF), U256::zero());
        assert_eq!(exp_neg_q64(U256::MAX), U256::zero());
    }

    #[test]
    fn test_exp_neg_accuracy() {
        for x in [0.001f64, 0.5, 1.0, 2.75, 10.0, 20.5] {
            let got = q64_to_f64(exp_neg_q64(q64_from_f64(x)));
            let want = (-x).exp();
            assert!(
                (got - want).abs() <= want * 1e-12 + 1e-18,
                "e^-{} = {} want {}",
                x,
                got,
                want
            );
        }
    }

    #[test]
    fn test_exp_neg_is_non_increasing() {
        let mut previous = exp_neg_q64(U256::zero());
        let step = ONE_Q64 / U256::from(7u64);
        let mut x = U256::zero();
        for _ in 0..300 {
            x += step;
            let current = exp_neg_q64(x);
            assert!(current <= previous);
            previous = current;
        }
    }
}
