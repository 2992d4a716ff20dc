//! Core algebraic traits for the sparse scan.

use super::Scalar;

/// A semiring defines two binary operations (⊕, ⊗) with identities.
///
/// # Semiring Laws
///
/// For a semiring (S, ⊕, ⊗, 0, 1):
/// - (S, ⊕, 0) is a commutative monoid
/// - (S, ⊗, 1) is a monoid
/// - ⊗ distributes over ⊕
/// - 0 annihilates: a ⊗ 0 = 0 ⊗ a = 0
///
/// # Examples
///
/// | Semiring | ⊕ | ⊗ | 0 | 1 |
/// |----------|---|---|---|---|
/// | Log      | log-sum-exp | + | -∞ | 0 |
/// | Max      | max | + | -∞ | 0 |
pub trait Semiring: Copy + Clone + Send + Sync + std::fmt::Debug + 'static {
    /// The underlying scalar type
    type Scalar: Scalar;

    /// Additive identity (zero element for ⊕)
    fn zero() -> Self;

    /// Multiplicative identity (one element for ⊗)
    fn one() -> Self;

    /// Addition operation (⊕)
    fn add(self, rhs: Self) -> Self;

    /// Multiplication operation (⊗)
    fn mul(self, rhs: Self) -> Self;

    /// Create from scalar value
    fn from_scalar(s: Self::Scalar) -> Self;

    /// Extract scalar value
    fn to_scalar(self) -> Self::Scalar;

    /// Check if this is the zero element
    fn is_zero(&self) -> bool;
}

/// Reduction and differentiation on top of a [`Semiring`].
///
/// The scan only ever reduces short runs of raw scalars (one run per state),
/// and the gradient engine needs the derivative of that reduction, so both
/// live here and operate on slices.
pub trait Algebra: Semiring {
    /// Short name, used for logging and for naming specialized device kernels.
    fn name() -> &'static str;

    /// Name of the binary ⊕ device function used by the scan kernel.
    fn kernel_add() -> &'static str;

    /// n-ary ⊕ over `values`. Returns the semiring zero for an empty slice.
    fn sum(values: &[Self::Scalar]) -> Self::Scalar {
        values
            .iter()
            .fold(Self::zero(), |acc, &v| acc.add(Self::from_scalar(v)))
            .to_scalar()
    }

    /// Difference-sum: the partial derivative of [`Algebra::sum`] with respect
    /// to each input, written into `out`.
    ///
    /// `out` must have the same length as `values`. A group whose sum is the
    /// semiring zero receives no gradient (all zeros).
    fn dsum(values: &[Self::Scalar], out: &mut [Self::Scalar]);
}
