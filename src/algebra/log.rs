//! Log-domain probability semiring `(log-sum-exp, +)`.

use super::semiring::{Algebra, Semiring};
use super::Scalar;

/// Log semiring over log-probabilities.
///
/// Operations:
/// - Addition (⊕): `log(exp(a) + exp(b))`
/// - Multiplication (⊗): `a + b`
/// - Zero: `-∞`
/// - One: `0`
///
/// Used for: sequence likelihoods (the CTC partition function).
///
/// # Example
///
/// ```rust
/// use sparse_ctc::algebra::{Log, Semiring};
///
/// let a = Log(0.0f64);
/// let b = Log(0.0f64);
///
/// assert!((a.add(b).to_scalar() - 2.0f64.ln()).abs() < 1e-12);
/// assert_eq!(a.mul(b).to_scalar(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(transparent)]
pub struct Log<T: Scalar>(pub T);

impl<T: Scalar> Semiring for Log<T> {
    type Scalar = T;

    #[inline]
    fn zero() -> Self {
        Log(T::neg_infinity())
    }

    #[inline]
    fn one() -> Self {
        Log(T::zero())
    }

    #[inline]
    fn add(self, rhs: Self) -> Self {
        let (hi, lo) = if self.0 >= rhs.0 { (self.0, rhs.0) } else { (rhs.0, self.0) };
        // -inf - -inf would be NaN
        if hi == T::neg_infinity() {
            return Log(hi);
        }
        Log(hi + (lo - hi).exp().ln_1p())
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Log(self.0 + rhs.0)
    }

    #[inline]
    fn from_scalar(s: T) -> Self {
        Log(s)
    }

    #[inline]
    fn to_scalar(self) -> T {
        self.0
    }

    #[inline]
    fn is_zero(&self) -> bool {
        self.0 == T::neg_infinity()
    }
}

impl<T: Scalar> Algebra for Log<T> {
    fn name() -> &'static str {
        "log"
    }

    fn kernel_add() -> &'static str {
        "logsumexp2"
    }

    fn sum(values: &[T]) -> T {
        let max = values.iter().copied().fold(T::neg_infinity(), T::max);
        if max == T::neg_infinity() {
            return max;
        }
        let total: T = values.iter().map(|&v| (v - max).exp()).sum();
        max + total.ln()
    }

    fn dsum(values: &[T], out: &mut [T]) {
        assert_eq!(values.len(), out.len(), "dsum output length mismatch");
        let total = Self::sum(values);
        if total == T::neg_infinity() {
            out.fill(T::zero());
            return;
        }
        // softmax weights exp(x_i - logsumexp(x))
        for (o, &v) in out.iter_mut().zip(values) {
            *o = (v - total).exp();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_f64() {
        let a = Log(1.0f64.ln());
        let b = Log(3.0f64.ln());

        assert!((a.add(b).to_scalar() - 4.0f64.ln()).abs() < 1e-12);
        assert!((a.mul(b).to_scalar() - 3.0f64.ln()).abs() < 1e-12);
        assert_eq!(Log::<f64>::zero().to_scalar(), f64::NEG_INFINITY);
        assert_eq!(Log::<f64>::one().to_scalar(), 0.0);
    }

    #[test]
    fn test_log_zero_is_absorbing() {
        let zero = Log::<f32>::zero();
        let a = Log(-2.5f32);

        assert_eq!(zero.add(a).to_scalar(), -2.5);
        assert_eq!(a.add(zero).to_scalar(), -2.5);
        assert!(zero.add(zero).is_zero());
        assert!(zero.mul(a).is_zero());
        assert!(!zero.mul(a).to_scalar().is_nan());
    }

    #[test]
    fn test_log_sum_matches_fold() {
        let xs = [-1.0f64, 0.5, -3.0, f64::NEG_INFINITY];
        let folded = xs
            .iter()
            .fold(Log::<f64>::zero(), |acc, &x| acc.add(Log(x)))
            .to_scalar();
        assert!((Log::<f64>::sum(&xs) - folded).abs() < 1e-12);
        assert_eq!(Log::<f64>::sum(&[]), f64::NEG_INFINITY);
        assert_eq!(Log::<f64>::sum(&[f64::NEG_INFINITY; 3]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log_dsum_is_softmax() {
        let xs = [0.0f64, 1.0, 2.0, f64::NEG_INFINITY];
        let mut out = [0.0f64; 4];
        Log::<f64>::dsum(&xs, &mut out);

        let norm: f64 = xs[..3].iter().map(|x| x.exp()).sum();
        for i in 0..3 {
            assert!((out[i] - xs[i].exp() / norm).abs() < 1e-12);
        }
        assert_eq!(out[3], 0.0);
        assert!((out.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_dsum_all_zero_group() {
        let xs = [f32::NEG_INFINITY; 3];
        let mut out = [1.0f32; 3];
        Log::<f32>::dsum(&xs, &mut out);
        assert_eq!(out, [0.0; 3]);
    }
}
