//! # sparse-ctc
//!
//! CTC loss and its gradient from a semiring forward-backward pass over a
//! sparse, banded transition structure.
//!
//! ## Features
//!
//! - **Sparse lattice**: every CTC state has at most 3 predecessors, so the
//!   scan costs `O(T * C * 3)` instead of `O(T * C²)`
//! - **Semiring-generic**: the same scan yields the log-likelihood under
//!   [`Log`] `(logsumexp, +)` and the best alignment score under [`Max`] `(max, +)`
//! - **Two-scan gradient**: the backward pass is the forward scan run again on
//!   the transposed lattice, never an unrolled chain of `T` steps
//! - **CPU + CUDA**: interchangeable scan backends (CUDA optional)
//!
//! ## Quick Start
//!
//! ```rust
//! use sparse_ctc::algebra::Log;
//! use sparse_ctc::{CtcLoss, Labels, Tensor};
//!
//! // T = 5 frames, N = 1 row, K = 3 classes (0 is the blank)
//! let logits = Tensor::<f32>::full(&[5, 1, 3], 0.0);
//! let targets = Labels::from_rows(&[&[1, 2]], 0);
//!
//! let (loss, grad) = CtcLoss::new()
//!     .forward_with_grad::<Log<f32>>(&logits, &targets, &[5], &[2])
//!     .unwrap();
//!
//! assert!(loss > 0.0);
//! assert_eq!(grad.shape(), &[5, 1, 3]);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         User API                            │
//! │   ctc_loss(logits, targets, input_lengths, target_lengths)  │
//! │   CtcLoss::new().blank(b).forward_with_grad::<A>(...)       │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Loss assembly                         │
//! │   log_softmax → CtcTopology (states, skip rule, Ms, v0, vT) │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    logZ + custom backward                   │
//! │   alpha = scan(Ms, idx, v0)                                 │
//! │   beta  = scan(permute(Ms), idxᵀ, vT) over reversed time    │
//! │   dMs   = dsum(Ms ⊗ alpha ⊗ beta) per time step             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ScanBackend dispatch                     │
//! │   Cpu:  one rayon task per batch row                        │
//! │   Cuda: one thread block per row, shared-memory ping-pong   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod algebra;
pub mod backend;
pub mod error;
pub mod logz;
pub mod loss;
pub mod tensor;
pub mod topology;

// Re-exports
pub use algebra::{Algebra, Log, Max, Scalar, Semiring};
pub use backend::{Cpu, ScanBackend};
pub use error::{CtcError, Result};
pub use logz::{log_z, log_z_with_grad, transposed_scan, LogZGradient, LogZGrads, LogZInput};
pub use loss::{ctc_loss, ctc_loss_log, CtcLoss, Reduction};
pub use tensor::Tensor;
pub use topology::{interleave_blanks, CtcTopology, Labels, SparseIndex};

#[cfg(feature = "cuda")]
pub use backend::{Cuda, CudaError};
