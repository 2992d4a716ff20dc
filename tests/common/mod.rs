//! Shared helpers for the integration tests: random lattices and a
//! path-enumeration oracle.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparse_ctc::algebra::Algebra;
use sparse_ctc::{SparseIndex, Tensor};

pub const NINF: f64 = f64::NEG_INFINITY;

/// A scan problem on the CTC predecessor table.
pub struct Problem {
    pub ms: Tensor<f64>,
    pub idx: SparseIndex,
    pub v0: Tensor<f64>,
    pub vt: Tensor<f64>,
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random weights in `[-3, 0)` with roughly `dead` of them set to `-inf`.
/// `v0` always has state 0 open and `vT` always has the last state open.
pub fn random_problem(rng: &mut StdRng, frames: usize, batch: usize, states: usize, dead: f64) -> Problem {
    let ms: Vec<f64> = (0..frames * batch * states * 3)
        .map(|_| if rng.gen_bool(dead) { NINF } else { rng.gen_range(-3.0..0.0) })
        .collect();

    let mut v0 = vec![NINF; batch * states];
    let mut vt = vec![NINF; batch * states];
    for n in 0..batch {
        v0[n * states] = 0.0;
        vt[n * states + states - 1] = 0.0;
        for c in 1..states {
            if rng.gen_bool(0.3) {
                v0[n * states + c] = rng.gen_range(-1.0..0.0);
            }
            if rng.gen_bool(0.3) {
                vt[n * states + c - 1] = rng.gen_range(-1.0..0.0);
            }
        }
    }

    Problem {
        ms: Tensor::from_vec(ms, &[frames, batch, states, 3]),
        idx: SparseIndex::ctc(states),
        v0: Tensor::from_vec(v0, &[batch, states]),
        vt: Tensor::from_vec(vt, &[batch, states]),
    }
}

/// Every path of row `n`, as (final state, slot taken at each step).
///
/// A path ending in `s_T` with slots `k_1..k_T` visits
/// `s_{t-1} = idx[s_t, k_t]`, so enumerating slots instead of states counts
/// repeated predecessors once per slot.
pub fn paths(p: &Problem, n: usize) -> Vec<(Vec<usize>, Vec<usize>, f64)> {
    let [frames, batch, states, nz] = dims(p);
    let (ms, v0, vt) = (p.ms.as_slice(), p.v0.as_slice(), p.vt.as_slice());
    let total = nz.pow(frames as u32);

    let mut out = Vec::new();
    for last in 0..states {
        for code in 0..total {
            let mut slots = vec![0; frames];
            let mut rest = code;
            for slot in slots.iter_mut() {
                *slot = rest % nz;
                rest /= nz;
            }

            // states[t] for t = 0..=T
            let mut visited = vec![0; frames + 1];
            visited[frames] = last;
            let mut score = vt[n * states + last];
            for t in (1..=frames).rev() {
                let c = visited[t];
                let k = slots[t - 1];
                score += ms[(((t - 1) * batch + n) * states + c) * nz + k];
                visited[t - 1] = p.idx.get(c, k);
            }
            score += v0[n * states + visited[0]];
            out.push((visited, slots, score));
        }
    }
    out
}

/// `logZ` of row `n` by explicit enumeration.
pub fn brute_force<A: Algebra<Scalar = f64>>(p: &Problem, n: usize) -> f64 {
    let scores: Vec<f64> = paths(p, n).into_iter().map(|(_, _, s)| s).collect();
    A::sum(&scores)
}

pub fn dims(p: &Problem) -> [usize; 4] {
    let s = p.ms.shape();
    [s[0], s[1], s[2], s[3]]
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    if a == b {
        return;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    assert!((a - b).abs() <= tol * scale, "{} vs {} (tol {})", a, b, tol);
}
