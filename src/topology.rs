//! CTC lattice construction.
//!
//! A label sequence `l_1..l_L` is expanded into the interleaved state sequence
//! `blank, l_1, blank, l_2, ..., l_L, blank` of length `2L + 1`. Every state
//! has at most three incoming transitions, stored in a fixed-width sparse
//! predecessor table ([`SparseIndex`]):
//!
//! | slot | predecessor | meaning |
//! |------|-------------|---------|
//! | 0 | `c`     | stay |
//! | 1 | `c - 1` | advance by one |
//! | 2 | `c - 2` | skip the blank in between |
//!
//! Predecessors wrap around modulo the state count so that every state is
//! listed exactly `nz` times; the wrapped slots, and the skips CTC forbids,
//! carry the semiring zero weight.

use crate::algebra::{Algebra, Scalar};
use crate::error::{CtcError, Result};
use crate::tensor::Tensor;

/// Number of sparse transition slots per CTC state.
pub const NZ: usize = 3;

/// Slot of the self transition.
pub const STAY: usize = 0;
/// Slot of the transition from the previous state.
pub const ADVANCE: usize = 1;
/// Slot of the transition from two states back.
pub const SKIP: usize = 2;

/// A batch of label sequences padded to a common maximum length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    data: Vec<usize>,
    batch: usize,
    max_len: usize,
}

impl Labels {
    /// Wrap row-major `[batch, max_len]` label data.
    pub fn new(data: Vec<usize>, batch: usize, max_len: usize) -> Result<Self> {
        if data.len() != batch * max_len {
            return Err(CtcError::shape("targets", &[batch, max_len], &[data.len()]));
        }
        Ok(Self { data, batch, max_len })
    }

    /// Build a padded batch from ragged rows, filling the tail with `pad`.
    pub fn from_rows(rows: &[&[usize]], pad: usize) -> Self {
        let max_len = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * max_len);
        for row in rows {
            data.extend_from_slice(row);
            data.extend(std::iter::repeat(pad).take(max_len - row.len()));
        }
        Self {
            data,
            batch: rows.len(),
            max_len,
        }
    }

    /// Number of rows.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Padded row length.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Labels of row `n`, padding included.
    pub fn row(&self, n: usize) -> &[usize] {
        &self.data[n * self.max_len..(n + 1) * self.max_len]
    }
}

/// Insert `blank` before, between and after the labels of every row.
///
/// Returns row-major `[batch, 2 * max_len + 1]` states: even positions hold
/// `blank`, odd position `2i + 1` holds label `i` (padding included).
///
/// ```rust
/// use sparse_ctc::topology::{interleave_blanks, Labels};
///
/// let labels = Labels::from_rows(&[&[1, 2]], 0);
/// assert_eq!(interleave_blanks(&labels, 0), vec![0, 1, 0, 2, 0]);
/// ```
pub fn interleave_blanks(labels: &Labels, blank: usize) -> Vec<usize> {
    let lp = 2 * labels.max_len() + 1;
    let mut states = vec![blank; labels.batch() * lp];
    for n in 0..labels.batch() {
        for (i, &label) in labels.row(n).iter().enumerate() {
            states[n * lp + 2 * i + 1] = label;
        }
    }
    states
}

/// Fixed fan-in predecessor table of shape `(states, nz)`.
///
/// Entry `(c, k)` names the state that feeds state `c` through slot `k`.
/// The table is shared by every batch row and every time step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseIndex {
    idx: Vec<usize>,
    states: usize,
    nz: usize,
}

/// The inverse of a [`SparseIndex`]: successors listed per predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransposedIndex {
    /// Successor table: entry `(c', k')` is a state fed by `c'`.
    pub index: SparseIndex,
    /// `source[c' * nz + k']` is the flat `(c, k)` position, in the original
    /// table, of the transition that entry `(c', k')` describes.
    pub source: Vec<usize>,
}

/// One transition of the lattice, as stored in the transpose arena.
#[derive(Debug, Clone, Copy)]
struct Edge {
    pred: usize,
    succ: usize,
    slot: usize,
}

impl SparseIndex {
    /// Wrap row-major `(states, nz)` predecessor data.
    pub fn new(idx: Vec<usize>, states: usize, nz: usize) -> Result<Self> {
        if states == 0 || nz == 0 || idx.len() != states * nz {
            return Err(CtcError::shape("sparse index", &[states, nz], &[idx.len()]));
        }
        if let Some(&bad) = idx.iter().find(|&&p| p >= states) {
            return Err(CtcError::shape("predecessor state", &[states], &[bad]));
        }
        Ok(Self { idx, states, nz })
    }

    /// The CTC table for `states` interleaved states: `[c, c-1, c-2]` with
    /// wrap-around.
    pub fn ctc(states: usize) -> Self {
        let idx = (0..states)
            .flat_map(|c| (0..NZ).map(move |k| (c + states * NZ - k) % states))
            .collect();
        Self {
            idx,
            states,
            nz: NZ,
        }
    }

    /// Number of states `C`.
    #[inline]
    pub fn states(&self) -> usize {
        self.states
    }

    /// Slots per state `nz`.
    #[inline]
    pub fn nz(&self) -> usize {
        self.nz
    }

    /// `[C, nz]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.states, self.nz]
    }

    /// Predecessor of state `c` through slot `k`.
    #[inline]
    pub fn get(&self, c: usize, k: usize) -> usize {
        self.idx[c * self.nz + k]
    }

    /// Row-major table data.
    pub fn as_slice(&self) -> &[usize] {
        &self.idx
    }

    /// Invert the table (predecessors to successors), keeping the fan-out of
    /// `nz`.
    ///
    /// Every transition goes into an arena of (predecessor, successor, slot)
    /// triples which is stable-sorted by predecessor; the sorted arena,
    /// read in groups of `nz`, is the transposed table. Fails when some state
    /// is not the predecessor of exactly `nz` transitions.
    pub fn transpose(&self) -> Result<TransposedIndex> {
        let mut arena: Vec<Edge> = Vec::with_capacity(self.idx.len());
        for succ in 0..self.states {
            for slot in 0..self.nz {
                arena.push(Edge {
                    pred: self.get(succ, slot),
                    succ,
                    slot,
                });
            }
        }
        arena.sort_by_key(|e| e.pred);

        let mut fan_out = vec![0usize; self.states];
        for e in &arena {
            fan_out[e.pred] += 1;
        }
        if let Some((state, &count)) = fan_out.iter().enumerate().find(|&(_, &n)| n != self.nz) {
            return Err(CtcError::IrregularIndex {
                state,
                count,
                nz: self.nz,
            });
        }

        Ok(TransposedIndex {
            index: SparseIndex {
                idx: arena.iter().map(|e| e.succ).collect(),
                states: self.states,
                nz: self.nz,
            },
            source: arena.iter().map(|e| e.succ * self.nz + e.slot).collect(),
        })
    }
}

/// The CTC lattice of one batch: interleaved states, the skip rule, and the
/// shared predecessor table.
#[derive(Debug, Clone)]
pub struct CtcTopology {
    states: Vec<usize>,
    skip: Vec<bool>,
    batch: usize,
    num_states: usize,
    index: SparseIndex,
}

impl CtcTopology {
    /// Expand `labels` into the blank-interleaved lattice.
    pub fn new(labels: &Labels, blank: usize) -> Self {
        let states = interleave_blanks(labels, blank);
        let lp = 2 * labels.max_len() + 1;

        // A skip is allowed only between two different symbols, which rules
        // out blank-to-blank and repeated labels.
        let skip = (0..states.len())
            .map(|i| {
                let c = i % lp;
                c >= 2 && states[i] != states[i - 2]
            })
            .collect();

        Self {
            states,
            skip,
            batch: labels.batch(),
            num_states: lp,
            index: SparseIndex::ctc(lp),
        }
    }

    /// Number of batch rows `N`.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of interleaved states `C = 2 * max_len + 1`.
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Row-major `[N, C]` interleaved states.
    pub fn states(&self) -> &[usize] {
        &self.states
    }

    /// Class id of state `c` in row `n`.
    pub fn state(&self, n: usize, c: usize) -> usize {
        self.states[n * self.num_states + c]
    }

    /// The shared predecessor table.
    pub fn index(&self) -> &SparseIndex {
        &self.index
    }

    /// Whether slot `k` of state `c` in row `n` is a real transition.
    pub fn is_live(&self, n: usize, c: usize, k: usize) -> bool {
        match k {
            STAY => true,
            ADVANCE => c >= 1,
            SKIP => self.skip[n * self.num_states + c],
            _ => false,
        }
    }

    /// Build the sparse transition tensor `Ms` of shape `(T, N, C, 3)` from
    /// per-frame class log-probabilities of shape `(T, N, K)`.
    ///
    /// Every live slot of state `c` carries the score of emitting state `c`'s
    /// class; dead slots carry the semiring zero.
    pub fn transitions<A: Algebra>(&self, log_probs: &Tensor<A::Scalar>) -> Result<Tensor<A::Scalar>> {
        if log_probs.ndim() != 3 || log_probs.shape()[1] != self.batch {
            return Err(CtcError::shape(
                "log-probabilities",
                &[0, self.batch, 0],
                log_probs.shape(),
            ));
        }
        let (frames, classes) = (log_probs.shape()[0], log_probs.shape()[2]);
        self.check_classes(classes)?;

        let (n_rows, lp) = (self.batch, self.num_states);
        let zero = A::zero().to_scalar();
        let scores = log_probs.as_slice();
        let mut ms = vec![zero; frames * n_rows * lp * NZ];

        for t in 0..frames {
            for n in 0..n_rows {
                let frame = &scores[(t * n_rows + n) * classes..][..classes];
                for c in 0..lp {
                    let emit = frame[self.state(n, c)];
                    let base = ((t * n_rows + n) * lp + c) * NZ;
                    for k in 0..NZ {
                        if self.is_live(n, c, k) {
                            ms[base + k] = emit;
                        }
                    }
                }
            }
        }

        Ok(Tensor::from_vec(ms, &[frames, n_rows, lp, NZ]))
    }

    /// Initial vector `v0` of shape `(N, C)`: one at the leading blank.
    pub fn initial<A: Algebra>(&self) -> Tensor<A::Scalar> {
        let mut v0 = vec![A::zero().to_scalar(); self.batch * self.num_states];
        for n in 0..self.batch {
            v0[n * self.num_states] = A::one().to_scalar();
        }
        Tensor::from_vec(v0, &[self.batch, self.num_states])
    }

    /// Final vector `vT` of shape `(N, C)`: one at the last label
    /// (`2 * len - 1`) and at the trailing blank (`2 * len`) of each row.
    pub fn terminal<A: Algebra>(&self, target_lengths: &[usize]) -> Result<Tensor<A::Scalar>> {
        if target_lengths.len() != self.batch {
            return Err(CtcError::shape(
                "target lengths",
                &[self.batch],
                &[target_lengths.len()],
            ));
        }
        let mut vt = vec![A::zero().to_scalar(); self.batch * self.num_states];
        for (n, &len) in target_lengths.iter().enumerate() {
            if len == 0 || 2 * len >= self.num_states {
                return Err(CtcError::InvalidTarget {
                    row: n,
                    length: len,
                    states: self.num_states,
                });
            }
            vt[n * self.num_states + 2 * len - 1] = A::one().to_scalar();
            vt[n * self.num_states + 2 * len] = A::one().to_scalar();
        }
        Ok(Tensor::from_vec(vt, &[self.batch, self.num_states]))
    }

    /// Route a gradient on `Ms` back onto per-frame class scores.
    ///
    /// Inverse of [`CtcTopology::transitions`]: every live slot contributes
    /// to the class its state emits. Returns shape `(T, N, classes)`.
    pub fn scatter_to_classes<T: Scalar>(&self, grad_ms: &Tensor<T>, classes: usize) -> Tensor<T> {
        let frames = grad_ms.shape()[0];
        let (n_rows, lp) = (self.batch, self.num_states);
        let g = grad_ms.as_slice();
        let mut out = vec![T::zero(); frames * n_rows * classes];

        for t in 0..frames {
            for n in 0..n_rows {
                let row = &mut out[(t * n_rows + n) * classes..][..classes];
                for c in 0..lp {
                    let base = ((t * n_rows + n) * lp + c) * NZ;
                    for k in 0..NZ {
                        if self.is_live(n, c, k) {
                            row[self.state(n, c)] += g[base + k];
                        }
                    }
                }
            }
        }

        Tensor::from_vec(out, &[frames, n_rows, classes])
    }

    fn check_classes(&self, classes: usize) -> Result<()> {
        for n in 0..self.batch {
            for c in 0..self.num_states {
                let label = self.state(n, c);
                if label >= classes {
                    return Err(CtcError::InvalidLabel {
                        row: n,
                        label,
                        classes,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Log;

    #[test]
    fn test_interleave_blanks() {
        let labels = Labels::from_rows(&[&[1, 2], &[3]], 0);
        assert_eq!(labels.max_len(), 2);
        assert_eq!(
            interleave_blanks(&labels, 0),
            vec![0, 1, 0, 2, 0, /* row 1 */ 0, 3, 0, 0, 0]
        );
    }

    #[test]
    fn test_interleave_custom_blank() {
        let labels = Labels::new(vec![0, 1], 1, 2).unwrap();
        assert_eq!(interleave_blanks(&labels, 4), vec![4, 0, 4, 1, 4]);
    }

    #[test]
    fn test_labels_shape_checked() {
        assert!(matches!(
            Labels::new(vec![1, 2, 3], 2, 2),
            Err(CtcError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_ctc_index() {
        let idx = SparseIndex::ctc(5);
        assert_eq!(idx.shape(), [5, 3]);
        assert_eq!(
            idx.as_slice(),
            &[0, 4, 3, 1, 0, 4, 2, 1, 0, 3, 2, 1, 4, 3, 2]
        );
    }

    #[test]
    fn test_transpose_inverts_adjacency() {
        let idx = SparseIndex::ctc(5);
        let tr = idx.transpose().unwrap();

        for p in 0..5 {
            for k in 0..3 {
                let succ = tr.index.get(p, k);
                let flat = tr.source[p * 3 + k];
                assert_eq!(flat / 3, succ);
                assert_eq!(idx.as_slice()[flat], p);
            }
        }
        // Stable sort keeps successors of one predecessor in ascending order.
        assert_eq!(&tr.index.as_slice()[..3], &[0, 1, 2]);
    }

    #[test]
    fn test_transpose_twice_keeps_edge_set() {
        let idx = SparseIndex::ctc(7);
        let back = idx.transpose().unwrap().index.transpose().unwrap().index;
        for c in 0..7 {
            let mut a: Vec<usize> = (0..3).map(|k| idx.get(c, k)).collect();
            let mut b: Vec<usize> = (0..3).map(|k| back.get(c, k)).collect();
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_transpose_rejects_irregular_index() {
        // state 0 feeds three transitions, state 1 only one
        let idx = SparseIndex::new(vec![0, 0, 0, 1], 2, 2).unwrap();
        assert!(matches!(
            idx.transpose(),
            Err(CtcError::IrregularIndex { state: 0, count: 3, nz: 2 })
        ));
    }

    #[test]
    fn test_sparse_index_rejects_out_of_range() {
        assert!(SparseIndex::new(vec![0, 2], 2, 1).is_err());
        assert!(SparseIndex::new(vec![0, 1, 1], 2, 1).is_err());
    }

    #[test]
    fn test_skip_rule() {
        let topo = CtcTopology::new(&Labels::from_rows(&[&[1, 1], &[1, 2]], 0), 0);
        // row 0: [0, 1, 0, 1, 0] -> second '1' cannot skip the blank
        assert!(!topo.is_live(0, 3, SKIP));
        // row 1: [0, 1, 0, 2, 0] -> '2' can be reached from '1'
        assert!(topo.is_live(1, 3, SKIP));
        // blanks never skip
        assert!(!topo.is_live(1, 2, SKIP));
        assert!(!topo.is_live(1, 0, ADVANCE));
        assert!(topo.is_live(1, 1, ADVANCE));
    }

    #[test]
    fn test_terminal_vector() {
        let topo = CtcTopology::new(&Labels::from_rows(&[&[1, 2], &[3]], 0), 0);
        let vt = topo.terminal::<Log<f32>>(&[2, 1]).unwrap();
        let ninf = f32::NEG_INFINITY;
        assert_eq!(
            vt.to_vec(),
            vec![ninf, ninf, ninf, 0.0, 0.0, ninf, 0.0, 0.0, ninf, ninf]
        );

        assert!(matches!(
            topo.terminal::<Log<f32>>(&[3, 1]),
            Err(CtcError::InvalidTarget { row: 0, length: 3, .. })
        ));
        assert!(topo.terminal::<Log<f32>>(&[0, 1]).is_err());
    }

    #[test]
    fn test_transitions_reject_unknown_label() {
        let topo = CtcTopology::new(&Labels::from_rows(&[&[5]], 0), 0);
        let scores = Tensor::<f32>::full(&[2, 1, 3], -1.0);
        assert!(matches!(
            topo.transitions::<Log<f32>>(&scores),
            Err(CtcError::InvalidLabel { label: 5, classes: 3, .. })
        ));
    }
}
