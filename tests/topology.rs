//! Lattice construction: interleaving, the skip rule, boundary vectors and
//! index transposition.

use sparse_ctc::algebra::{Log, Max};
use sparse_ctc::topology::{ADVANCE, SKIP, STAY};
use sparse_ctc::{CtcTopology, Labels, SparseIndex, Tensor};

const NINF: f64 = f64::NEG_INFINITY;

fn uniform_scores(frames: usize, batch: usize, classes: usize) -> Tensor<f64> {
    Tensor::full(&[frames, batch, classes], -(classes as f64).ln())
}

#[test]
fn test_end_to_end_states() {
    let topo = CtcTopology::new(&Labels::from_rows(&[&[1, 2]], 0), 0);
    assert_eq!(topo.num_states(), 5);
    assert_eq!(topo.states(), &[0, 1, 0, 2, 0]);
}

#[test]
fn test_skip_rule_depends_on_repeats() {
    let scores = uniform_scores(2, 2, 3);
    let topo = CtcTopology::new(&Labels::from_rows(&[&[1, 1], &[1, 2]], 0), 0);
    let ms = topo.transitions::<Log<f64>>(&scores).unwrap();
    let emit = -(3f64).ln();

    // Skipping the blank between two equal labels is forbidden.
    assert_eq!(ms.get(&[0, 0, 3, SKIP]), NINF);
    assert_eq!(ms.get(&[0, 1, 3, SKIP]), emit);

    // Blank-to-blank skips and the boundary slots are dead in every row.
    for n in 0..2 {
        assert_eq!(ms.get(&[1, n, 2, SKIP]), NINF);
        assert_eq!(ms.get(&[1, n, 4, SKIP]), NINF);
        assert_eq!(ms.get(&[1, n, 0, ADVANCE]), NINF);
        assert_eq!(ms.get(&[1, n, 1, SKIP]), NINF);
        for c in 0..5 {
            assert_eq!(ms.get(&[1, n, c, STAY]), emit);
        }
    }
}

#[test]
fn test_transition_slots_carry_destination_score() {
    // Frame scores that identify the class: score(k) = -k.
    let scores = Tensor::from_vec(vec![0.0, -1.0, -2.0, -3.0], &[1, 1, 4]);
    let topo = CtcTopology::new(&Labels::from_rows(&[&[3, 1]], 0), 0);
    let ms = topo.transitions::<Max<f64>>(&scores).unwrap();

    assert_eq!(ms.get(&[0, 0, 1, STAY]), -3.0);
    assert_eq!(ms.get(&[0, 0, 1, ADVANCE]), -3.0);
    assert_eq!(ms.get(&[0, 0, 3, SKIP]), -1.0);
    assert_eq!(ms.get(&[0, 0, 2, ADVANCE]), 0.0);
}

#[test]
fn test_boundary_vectors() {
    let topo = CtcTopology::new(&Labels::from_rows(&[&[1, 2, 3], &[4]], 0), 0);
    let v0 = topo.initial::<Log<f64>>();
    let vt = topo.terminal::<Log<f64>>(&[3, 1]).unwrap();

    assert_eq!(v0.shape(), &[2, 7]);
    assert_eq!(v0.get(&[0, 0]), 0.0);
    assert_eq!(v0.get(&[1, 0]), 0.0);
    assert_eq!(v0.as_slice().iter().filter(|&&x| x == 0.0).count(), 2);

    let open: Vec<(usize, usize)> = (0..2)
        .flat_map(|n| (0..7).map(move |c| (n, c)))
        .filter(|&(n, c)| vt.get(&[n, c]) == 0.0)
        .collect();
    assert_eq!(open, vec![(0, 5), (0, 6), (1, 1), (1, 2)]);
}

#[test]
fn test_scatter_sums_over_states_of_a_class() {
    let topo = CtcTopology::new(&Labels::from_rows(&[&[2, 2]], 0), 0);
    // states [0, 2, 0, 2, 0]
    let grad = Tensor::<f64>::full(&[1, 1, 5, 3], 1.0);
    let by_class = topo.scatter_to_classes(&grad, 3);

    // blanks: 0 -> stay; 2 -> stay, advance; 4 -> stay, advance
    // label 2: 1 -> stay, advance; 3 -> stay, advance (skip forbidden)
    assert_eq!(by_class.to_vec(), vec![5.0, 0.0, 4.0]);
}

#[test]
fn test_transpose_of_symmetric_lattice() {
    // States 0 and 2 feed each other and themselves; 1 feeds itself twice.
    let idx = SparseIndex::new(vec![0, 2, 1, 1, 2, 0], 3, 2).unwrap();
    let tr = idx.transpose().unwrap();

    assert_eq!(tr.index.as_slice(), &[0, 2, 1, 1, 0, 2]);
    for p in 0..3 {
        for k in 0..2 {
            let j = tr.source[p * 2 + k];
            assert_eq!(j / 2, tr.index.get(p, k));
            assert_eq!(idx.get(j / 2, j % 2), p);
        }
    }
}
