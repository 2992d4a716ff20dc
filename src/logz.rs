//! The differentiable `logZ` primitive and its custom backward rule.
//!
//! Forward: `logZ[n] = ⊕_c alpha[T, n, c] ⊗ vT[n, c]`, where `alpha` comes from
//! the sparse scan of [`ScanBackend`].
//!
//! Backward: instead of differentiating through `T` scan steps, the gradient
//! is assembled from two scans:
//!
//! 1. invert the predecessor table ([`SparseIndex::transpose`]) and permute
//!    the weights to match,
//! 2. scan the transposed lattice over the reversed time axis starting from
//!    `vT`, which yields the backward table `beta`,
//! 3. form `Ms[t,n,c,k] ⊗ alpha[t, n, idx[c,k]] ⊗ beta[t+1, n, c]` for every
//!    transition,
//! 4. apply `dsum` over all `C * nz` transitions of each `(t, n)`. Every time
//!    slice of the lattice carries the full `logZ`, so this yields
//!    `d logZ / d Ms` (the transition posterior under `Log`, the Viterbi
//!    path indicator under `Max`),
//! 5. scale by the upstream gradient of each row.

use std::marker::PhantomData;

use rayon::prelude::*;

use crate::algebra::{Algebra, Scalar};
use crate::backend::{check_scan_shapes, ScanBackend};
use crate::error::{CtcError, Result};
use crate::tensor::Tensor;
use crate::topology::SparseIndex;

/// Inputs of the `logZ` primitive, for asking [`LogZGrads`] about each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogZInput {
    /// Transition weights `Ms`.
    Ms,
    /// Predecessor table `idx`.
    Idx,
    /// Initial vector `v0`.
    V0,
    /// Final vector `vT`.
    VT,
}

/// Gradients produced by [`LogZGradient::backward`].
///
/// Only the transition weights are differentiable; the table and the
/// boundary vectors are structural and report no gradient at all.
#[derive(Debug, Clone)]
pub struct LogZGrads<T: Scalar> {
    ms: Tensor<T>,
}

impl<T: Scalar> LogZGrads<T> {
    /// Gradient with respect to `input`, or `None` for non-differentiable inputs.
    pub fn get(&self, input: LogZInput) -> Option<&Tensor<T>> {
        match input {
            LogZInput::Ms => Some(&self.ms),
            LogZInput::Idx | LogZInput::V0 | LogZInput::VT => None,
        }
    }

    /// `d logZ / d Ms`, shape `(T, N, C, nz)`.
    pub fn ms(&self) -> &Tensor<T> {
        &self.ms
    }

    /// Take the `Ms` gradient.
    pub fn into_ms(self) -> Tensor<T> {
        self.ms
    }
}

/// Compute `logZ` per batch row, without keeping anything for a backward pass.
///
/// # Arguments
/// * `backend` - Scan strategy
/// * `ms` - Transition weights, shape `(T, N, C, nz)`
/// * `idx` - Predecessor table, shape `(C, nz)`
/// * `v0`, `vt` - Boundary vectors, shape `(N, C)`
///
/// Returns a tensor of shape `(N,)`.
pub fn log_z<A, B>(
    backend: &B,
    ms: &Tensor<A::Scalar>,
    idx: &SparseIndex,
    v0: &Tensor<A::Scalar>,
    vt: &Tensor<A::Scalar>,
) -> Result<Tensor<A::Scalar>>
where
    A: Algebra,
    B: ScanBackend,
{
    let alpha = backend.scan::<A>(ms, idx, v0)?;
    close_table::<A>(&alpha, vt)
}

/// `logZ` with gradient support.
///
/// Returns `(logZ, gradient_fn)`; `gradient_fn` owns the forward table and
/// releases it when [`LogZGradient::backward`] consumes it.
///
/// # Example
///
/// ```rust
/// use sparse_ctc::algebra::Log;
/// use sparse_ctc::topology::SparseIndex;
/// use sparse_ctc::{log_z_with_grad, Cpu, LogZInput, Tensor};
///
/// let ninf = f64::NEG_INFINITY;
/// let idx = SparseIndex::ctc(3);
/// let ms = Tensor::<f64>::full(&[2, 1, 3, 3], -1.0);
/// let v0 = Tensor::from_data(&[0.0, ninf, ninf], &[1, 3]);
/// let vt = Tensor::from_data(&[ninf, 0.0, 0.0], &[1, 3]);
///
/// let (logz, grad_fn) = log_z_with_grad::<Log<f64>, _>(&Cpu, &ms, &idx, &v0, &vt).unwrap();
/// let grads = grad_fn.backward(&[1.0]).unwrap();
///
/// assert_eq!(logz.shape(), &[1]);
/// assert_eq!(grads.ms().shape(), &[2, 1, 3, 3]);
/// assert!(grads.get(LogZInput::V0).is_none());
/// ```
pub fn log_z_with_grad<A, B>(
    backend: &B,
    ms: &Tensor<A::Scalar>,
    idx: &SparseIndex,
    v0: &Tensor<A::Scalar>,
    vt: &Tensor<A::Scalar>,
) -> Result<(Tensor<A::Scalar>, LogZGradient<A, B>)>
where
    A: Algebra,
    B: ScanBackend,
{
    let alpha = backend.scan::<A>(ms, idx, v0)?;
    let value = close_table::<A>(&alpha, vt)?;

    let gradient = LogZGradient {
        alpha,
        ms: ms.clone(),
        idx: idx.clone(),
        vt: vt.clone(),
        backend: backend.clone(),
        _algebra: PhantomData,
    };

    Ok((value, gradient))
}

/// Run the scan on the transposed lattice over the reversed time axis.
///
/// Entry `s` of the result holds, for every state, the ⊕ over all ways of
/// consuming the last `s` frames and ending in a state selected by `vt`.
/// Shape `(T + 1, N, C)`.
pub fn transposed_scan<A, B>(
    backend: &B,
    ms: &Tensor<A::Scalar>,
    idx: &SparseIndex,
    vt: &Tensor<A::Scalar>,
) -> Result<Tensor<A::Scalar>>
where
    A: Algebra,
    B: ScanBackend,
{
    let [_, _, states, nz] = check_scan_shapes::<A>(ms, idx, vt)?;
    let transposed = idx.transpose()?;

    let mut permuted = Vec::with_capacity(ms.numel());
    for group in ms.as_slice().chunks(states * nz) {
        permuted.extend(transposed.source.iter().map(|&j| group[j]));
    }
    let ms_t = Tensor::from_vec(permuted, ms.shape()).flip(0);

    backend.scan::<A>(&ms_t, &transposed.index, vt)
}

/// ⊕ over states of the last table entry ⊗ a boundary vector. Shape `(N,)`.
pub(crate) fn close_table<A: Algebra>(
    table: &Tensor<A::Scalar>,
    boundary: &Tensor<A::Scalar>,
) -> Result<Tensor<A::Scalar>> {
    let (steps, batch, states) = (table.shape()[0], table.shape()[1], table.shape()[2]);
    if boundary.shape() != [batch, states] {
        return Err(CtcError::shape("final vector", &[batch, states], boundary.shape()));
    }

    let last = &table.as_slice()[(steps - 1) * batch * states..];
    let weighted: Vec<A::Scalar> = last
        .iter()
        .zip(boundary.as_slice())
        .map(|(&a, &v)| A::from_scalar(a).mul(A::from_scalar(v)).to_scalar())
        .collect();

    Ok(Tensor::from_vec(weighted, &[batch, states]).sum_axis::<A>(1))
}

/// Saved state of one `logZ` evaluation, consumed by its backward pass.
pub struct LogZGradient<A: Algebra, B: ScanBackend> {
    alpha: Tensor<A::Scalar>,
    ms: Tensor<A::Scalar>,
    idx: SparseIndex,
    vt: Tensor<A::Scalar>,
    backend: B,
    _algebra: PhantomData<A>,
}

impl<A: Algebra, B: ScanBackend> LogZGradient<A, B> {
    /// The saved forward table, shape `(T + 1, N, C)`.
    pub fn alpha(&self) -> &Tensor<A::Scalar> {
        &self.alpha
    }

    /// Compute `grad_out[n] * d logZ[n] / d Ms`.
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Upstream gradient, one value per batch row
    pub fn backward(self, grad_out: &[A::Scalar]) -> Result<LogZGrads<A::Scalar>> {
        let [frames, batch, states, nz] = check_scan_shapes::<A>(&self.ms, &self.idx, &self.vt)?;
        if grad_out.len() != batch {
            return Err(CtcError::shape("upstream gradient", &[batch], &[grad_out.len()]));
        }

        let beta = transposed_scan::<A, B>(&self.backend, &self.ms, &self.idx, &self.vt)?;

        let group = states * nz;
        let (ms, alpha, beta, idx) = (self.ms.as_slice(), self.alpha.as_slice(), beta.as_slice(), &self.idx);
        let mut grad = vec![<A::Scalar as num_traits::Zero>::zero(); frames * batch * group];

        grad.par_chunks_mut(group).enumerate().for_each_init(
            || Vec::with_capacity(group),
            |marginals, (tn, out)| {
                let (t, n) = (tn / batch, tn % batch);
                let a = &alpha[tn * states..][..states];
                // beta entry T-1-t covers frames t+1..T
                let b = &beta[((frames - 1 - t) * batch + n) * states..][..states];
                let m = &ms[tn * group..][..group];

                marginals.clear();
                for c in 0..states {
                    let into = A::from_scalar(b[c]);
                    for k in 0..nz {
                        let term = A::from_scalar(m[c * nz + k])
                            .mul(A::from_scalar(a[idx.get(c, k)]))
                            .mul(into);
                        marginals.push(term.to_scalar());
                    }
                }

                A::dsum(marginals.as_slice(), out);
                for g in out.iter_mut() {
                    *g = *g * grad_out[n];
                }
            },
        );

        Ok(LogZGrads {
            ms: Tensor::from_vec(grad, &[frames, batch, states, nz]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Log, Max};
    use crate::backend::Cpu;

    fn boundary(batch: usize, states: usize, hot: &[usize]) -> Tensor<f64> {
        let mut v = vec![f64::NEG_INFINITY; batch * states];
        for n in 0..batch {
            for &c in hot {
                v[n * states + c] = 0.0;
            }
        }
        Tensor::from_vec(v, &[batch, states])
    }

    fn weights(frames: usize, batch: usize, states: usize) -> Tensor<f64> {
        let data: Vec<f64> = (0..frames * batch * states * 3)
            .map(|i| -((i * 7 % 11) as f64) / 5.0)
            .collect();
        Tensor::from_vec(data, &[frames, batch, states, 3])
    }

    #[test]
    fn test_forward_equals_backward_total() {
        let (frames, batch, states) = (4, 2, 5);
        let ms = weights(frames, batch, states);
        let idx = SparseIndex::ctc(states);
        let v0 = boundary(batch, states, &[0]);
        let vt = boundary(batch, states, &[3, 4]);

        let forward = log_z::<Log<f64>, _>(&Cpu, &ms, &idx, &v0, &vt).unwrap();
        let beta = transposed_scan::<Log<f64>, _>(&Cpu, &ms, &idx, &vt).unwrap();
        let backward = close_table::<Log<f64>>(&beta, &v0).unwrap();

        for (f, b) in forward.to_vec().iter().zip(backward.to_vec()) {
            assert!((f - b).abs() < 1e-10, "{} vs {}", f, b);
        }
    }

    #[test]
    fn test_log_gradient_slices_sum_to_one() {
        let (frames, batch, states) = (3, 1, 5);
        let ms = weights(frames, batch, states);
        let idx = SparseIndex::ctc(states);
        let v0 = boundary(batch, states, &[0]);
        let vt = boundary(batch, states, &[3, 4]);

        let (_, grad_fn) = log_z_with_grad::<Log<f64>, _>(&Cpu, &ms, &idx, &v0, &vt).unwrap();
        let grads = grad_fn.backward(&[1.0]).unwrap();

        // Each frame's transition posterior is a distribution.
        for slice in grads.ms().as_slice().chunks(states * 3) {
            assert!((slice.iter().sum::<f64>() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_max_gradient_is_one_transition_per_frame() {
        let (frames, batch, states) = (4, 1, 5);
        let ms = weights(frames, batch, states);
        let idx = SparseIndex::ctc(states);
        let v0 = boundary(batch, states, &[0]);
        let vt = boundary(batch, states, &[3, 4]);

        let (_, grad_fn) = log_z_with_grad::<Max<f64>, _>(&Cpu, &ms, &idx, &v0, &vt).unwrap();
        let grads = grad_fn.backward(&[2.0]).unwrap();

        for slice in grads.ms().as_slice().chunks(states * 3) {
            assert_eq!(slice.iter().filter(|&&g| g == 2.0).count(), 1);
            assert_eq!(slice.iter().filter(|&&g| g == 0.0).count(), states * 3 - 1);
        }
    }

    #[test]
    fn test_structural_inputs_have_no_gradient() {
        let ms = weights(2, 1, 3);
        let idx = SparseIndex::ctc(3);
        let v0 = boundary(1, 3, &[0]);
        let vt = boundary(1, 3, &[1, 2]);

        let (_, grad_fn) = log_z_with_grad::<Log<f64>, _>(&Cpu, &ms, &idx, &v0, &vt).unwrap();
        let grads = grad_fn.backward(&[1.0]).unwrap();

        assert!(grads.get(LogZInput::Ms).is_some());
        assert!(grads.get(LogZInput::Idx).is_none());
        assert!(grads.get(LogZInput::V0).is_none());
        assert!(grads.get(LogZInput::VT).is_none());
    }

    #[test]
    fn test_backward_checks_upstream_length() {
        let ms = weights(2, 2, 3);
        let idx = SparseIndex::ctc(3);
        let v0 = boundary(2, 3, &[0]);
        let vt = boundary(2, 3, &[1, 2]);

        let (_, grad_fn) = log_z_with_grad::<Log<f64>, _>(&Cpu, &ms, &idx, &v0, &vt).unwrap();
        assert!(matches!(
            grad_fn.backward(&[1.0]),
            Err(CtcError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_final_vector_shape_checked() {
        let ms = weights(2, 1, 3);
        let idx = SparseIndex::ctc(3);
        let v0 = boundary(1, 3, &[0]);
        let vt = boundary(2, 3, &[1, 2]);
        assert!(log_z::<Log<f64>, _>(&Cpu, &ms, &idx, &v0, &vt).is_err());
    }
}
