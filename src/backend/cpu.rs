//! CPU backend implementation.

use rayon::prelude::*;

use super::traits::{check_scan_shapes, ScanBackend};
use crate::algebra::Algebra;
use crate::error::Result;
use crate::tensor::Tensor;
use crate::topology::SparseIndex;

/// Host backend.
///
/// Batch rows are independent, so each row's whole table is scanned on its
/// own rayon task and the rows are interleaved into the `(T + 1, N, C)`
/// layout at the end.
#[derive(Clone, Debug, Default)]
pub struct Cpu;

impl ScanBackend for Cpu {
    fn name() -> &'static str {
        "cpu"
    }

    fn scan<A: Algebra>(
        &self,
        ms: &Tensor<A::Scalar>,
        idx: &SparseIndex,
        v0: &Tensor<A::Scalar>,
    ) -> Result<Tensor<A::Scalar>> {
        let [frames, batch, states, nz] = check_scan_shapes::<A>(ms, idx, v0)?;
        log::trace!(
            "cpu scan ({}): T={} N={} C={} nz={}",
            A::name(),
            frames,
            batch,
            states,
            nz
        );

        let weights = ms.as_slice();
        let init = v0.as_slice();
        let rows: Vec<Vec<A::Scalar>> = (0..batch)
            .into_par_iter()
            .map(|n| scan_row::<A>(weights, &init[n * states..(n + 1) * states], idx, n, frames, batch))
            .collect();

        let width = batch * states;
        let mut alpha = vec![A::zero().to_scalar(); (frames + 1) * width];
        for (n, row) in rows.iter().enumerate() {
            for (t, step) in row.chunks(states).enumerate() {
                alpha[t * width + n * states..][..states].copy_from_slice(step);
            }
        }

        Ok(Tensor::from_vec(alpha, &[frames + 1, batch, states]))
    }
}

/// Scan one batch row. Returns its `(T + 1, C)` table.
fn scan_row<A: Algebra>(
    weights: &[A::Scalar],
    init: &[A::Scalar],
    idx: &SparseIndex,
    n: usize,
    frames: usize,
    batch: usize,
) -> Vec<A::Scalar> {
    let (states, nz) = (idx.states(), idx.nz());
    let mut table = Vec::with_capacity((frames + 1) * states);
    table.extend_from_slice(init);

    let mut terms = vec![A::zero().to_scalar(); nz];
    for t in 0..frames {
        let m = &weights[(t * batch + n) * states * nz..][..states * nz];
        let prev_start = t * states;
        for c in 0..states {
            for (k, term) in terms.iter_mut().enumerate() {
                let from = table[prev_start + idx.get(c, k)];
                *term = A::from_scalar(m[c * nz + k])
                    .mul(A::from_scalar(from))
                    .to_scalar();
            }
            let next = A::sum(&terms);
            table.push(next);
        }
    }
    table
}
