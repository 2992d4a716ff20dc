//! Backend trait definitions.

use crate::algebra::Algebra;
use crate::error::{CtcError, Result};
use crate::tensor::Tensor;
use crate::topology::SparseIndex;

/// Strategy for running the sparse forward scan.
///
/// Computes, for `t = 0..T`:
///
/// ```text
/// alpha[t+1, n, c] = ⊕_k  Ms[t, n, c, k] ⊗ alpha[t, n, idx[c, k]]
/// ```
///
/// with `alpha[0] = v0`. The result has shape `(T + 1, N, C)`. The backward
/// pass reuses the same contract on the transposed lattice, so a backend only
/// ever implements this one recurrence.
///
/// Implementations must agree with each other within floating-point
/// tolerance for the same algebra.
pub trait ScanBackend: Clone + Send + Sync + 'static {
    /// Backend name for debugging.
    fn name() -> &'static str;

    /// Run the scan.
    ///
    /// # Arguments
    /// * `ms` - Transition weights, shape `(T, N, C, nz)`
    /// * `idx` - Predecessor table, shape `(C, nz)`
    /// * `v0` - Initial state vectors, shape `(N, C)`
    ///
    /// # Errors
    ///
    /// [`CtcError::ShapeMismatch`] when the three inputs disagree.
    fn scan<A: Algebra>(
        &self,
        ms: &Tensor<A::Scalar>,
        idx: &SparseIndex,
        v0: &Tensor<A::Scalar>,
    ) -> Result<Tensor<A::Scalar>>;
}

/// Validate scan inputs and return `[T, N, C, nz]`.
pub(crate) fn check_scan_shapes<A: Algebra>(
    ms: &Tensor<A::Scalar>,
    idx: &SparseIndex,
    v0: &Tensor<A::Scalar>,
) -> Result<[usize; 4]> {
    let [states, nz] = idx.shape();
    if ms.ndim() != 4 || ms.shape()[2] != states || ms.shape()[3] != nz {
        let got = ms.shape();
        let leading = if got.len() == 4 { &got[..2] } else { &[0, 0][..] };
        return Err(CtcError::shape(
            "transition weights",
            &[leading[0], leading[1], states, nz],
            got,
        ));
    }
    let (frames, batch) = (ms.shape()[0], ms.shape()[1]);
    if v0.shape() != [batch, states] {
        return Err(CtcError::shape("initial vector", &[batch, states], v0.shape()));
    }
    Ok([frames, batch, states, nz])
}
