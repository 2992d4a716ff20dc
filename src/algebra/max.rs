//! Tropical max-plus semiring `(max, +)`.

use super::semiring::{Algebra, Semiring};
use super::Scalar;

/// Tropical max-plus semiring `(max, +)`.
///
/// Operations:
/// - Addition (⊕): `max(a, b)`
/// - Multiplication (⊗): `a + b`
/// - Zero: `-∞`
/// - One: `0`
///
/// Used for: Viterbi best-path scores in log space.
///
/// # Example
///
/// ```rust
/// use sparse_ctc::algebra::{Max, Semiring};
///
/// let a = Max(2.0f32);
/// let b = Max(3.0f32);
///
/// assert_eq!(a.add(b).to_scalar(), 3.0);  // max(2, 3) = 3
/// assert_eq!(a.mul(b).to_scalar(), 5.0);  // 2 + 3 = 5
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(transparent)]
pub struct Max<T: Scalar>(pub T);

impl<T: Scalar> Semiring for Max<T> {
    type Scalar = T;

    #[inline]
    fn zero() -> Self {
        Max(T::neg_infinity()) // -∞
    }

    #[inline]
    fn one() -> Self {
        Max(T::zero()) // 0
    }

    #[inline]
    fn add(self, rhs: Self) -> Self {
        if self.0 >= rhs.0 {
            self
        } else {
            rhs
        }
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Max(self.0 + rhs.0)
    }

    #[inline]
    fn from_scalar(s: T) -> Self {
        Max(s)
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

impl<T: Scalar> Algebra for Max<T> {
    fn name() -> &'static str {
        "max"
    }

    fn kernel_add() -> &'static str {
        "max2"
    }

    /// Hard argmax indicator. Ties go to the lowest index.
    fn dsum(values: &[T], out: &mut [T]) {
        assert_eq!(values.len(), out.len(), "dsum output length mismatch");
        out.fill(T::zero());

        let mut winner: Option<(usize, T)> = None;
        for (i, &v) in values.iter().enumerate() {
            match winner {
                Some((_, best)) if v <= best => {}
                _ if v == T::neg_infinity() => {}
                _ => winner = Some((i, v)),
            }
        }
        if let Some((i, _)) = winner {
            out[i] = T::one();
        }
    }
}
