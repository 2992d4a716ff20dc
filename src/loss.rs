//! CTC loss assembly: logits in, length-normalized negative log-likelihood out.

use crate::algebra::{Algebra, Log, Scalar};
use crate::backend::{Cpu, ScanBackend};
use crate::error::{CtcError, Result};
use crate::logz::{log_z, log_z_with_grad};
use crate::tensor::Tensor;
use crate::topology::{CtcTopology, Labels};

/// How per-row losses are combined into one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Average over the batch.
    #[default]
    Mean,
    /// Sum over the batch.
    Sum,
}

/// CTC loss configuration.
///
/// # Example
///
/// ```rust
/// use sparse_ctc::algebra::Log;
/// use sparse_ctc::{CtcLoss, Labels, Reduction, Tensor};
///
/// // T = 4 frames, N = 1 row, K = 3 classes
/// let logits = Tensor::<f64>::full(&[4, 1, 3], 0.0);
/// let targets = Labels::from_rows(&[&[1, 2]], 0);
///
/// let loss = CtcLoss::new()
///     .blank(0)
///     .reduction(Reduction::Sum)
///     .forward::<Log<f64>>(&logits, &targets, &[4], &[2])
///     .unwrap();
/// assert!(loss.is_finite() && loss > 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct CtcLoss<B: ScanBackend = Cpu> {
    blank: usize,
    reduction: Reduction,
    backend: B,
}

impl Default for CtcLoss<Cpu> {
    fn default() -> Self {
        Self::new()
    }
}

impl CtcLoss<Cpu> {
    /// Blank id 0, mean reduction, host backend.
    pub fn new() -> Self {
        Self {
            blank: 0,
            reduction: Reduction::Mean,
            backend: Cpu,
        }
    }
}

impl<B: ScanBackend> CtcLoss<B> {
    /// Set the class id of the blank symbol.
    pub fn blank(mut self, blank: usize) -> Self {
        self.blank = blank;
        self
    }

    /// Set the batch reduction.
    pub fn reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Run the scans on a different backend.
    pub fn with_backend<B2: ScanBackend>(self, backend: B2) -> CtcLoss<B2> {
        log::debug!("ctc loss using {} backend", B2::name());
        CtcLoss {
            blank: self.blank,
            reduction: self.reduction,
            backend,
        }
    }

    /// Per-row `logZ` of the targets under `A`, shape `(N,)`.
    ///
    /// With [`Log`] this is the log-likelihood of each target; with
    /// [`Max`](crate::algebra::Max) it is the score of the best alignment.
    pub fn log_likelihood<A: Algebra>(
        &self,
        logits: &Tensor<A::Scalar>,
        targets: &Labels,
        input_lengths: &[usize],
        target_lengths: &[usize],
    ) -> Result<Tensor<A::Scalar>> {
        let problem = self.assemble::<A>(logits, targets, input_lengths, target_lengths)?;
        log_z::<A, B>(&self.backend, &problem.ms, problem.topology.index(), &problem.v0, &problem.vt)
    }

    /// Reduced loss `-logZ / target_length`.
    pub fn forward<A: Algebra>(
        &self,
        logits: &Tensor<A::Scalar>,
        targets: &Labels,
        input_lengths: &[usize],
        target_lengths: &[usize],
    ) -> Result<A::Scalar> {
        let logz = self.log_likelihood::<A>(logits, targets, input_lengths, target_lengths)?;
        report_unreachable(&logz);
        Ok(self.reduce(&logz, target_lengths))
    }

    /// Reduced loss together with its gradient with respect to `logits`.
    ///
    /// The gradient has the shape of `logits`, `(T, N, K)`.
    pub fn forward_with_grad<A: Algebra>(
        &self,
        logits: &Tensor<A::Scalar>,
        targets: &Labels,
        input_lengths: &[usize],
        target_lengths: &[usize],
    ) -> Result<(A::Scalar, Tensor<A::Scalar>)> {
        let problem = self.assemble::<A>(logits, targets, input_lengths, target_lengths)?;
        let (logz, grad_fn) = log_z_with_grad::<A, B>(
            &self.backend,
            &problem.ms,
            problem.topology.index(),
            &problem.v0,
            &problem.vt,
        )?;
        report_unreachable(&logz);
        let loss = self.reduce(&logz, target_lengths);

        let one = <A::Scalar as num_traits::One>::one();
        let scale = match self.reduction {
            Reduction::Mean => cast::<A::Scalar>(target_lengths.len()),
            Reduction::Sum => one,
        };
        // d loss / d logZ[n]
        let grad_out: Vec<A::Scalar> = target_lengths
            .iter()
            .map(|&len| -one / (cast::<A::Scalar>(len) * scale))
            .collect();

        let grad_ms = grad_fn.backward(&grad_out)?.into_ms();
        let classes = logits.shape()[2];
        let grad_lp = problem.topology.scatter_to_classes(&grad_ms, classes);

        Ok((loss, log_softmax_backward(&problem.log_probs, &grad_lp)))
    }

    fn assemble<A: Algebra>(
        &self,
        logits: &Tensor<A::Scalar>,
        targets: &Labels,
        input_lengths: &[usize],
        target_lengths: &[usize],
    ) -> Result<Problem<A::Scalar>> {
        if logits.ndim() != 3 {
            return Err(CtcError::shape("logits", &[0, targets.batch(), 0], logits.shape()));
        }
        let (frames, batch) = (logits.shape()[0], logits.shape()[1]);
        if targets.batch() != batch {
            return Err(CtcError::shape(
                "targets",
                &[batch, targets.max_len()],
                &[targets.batch(), targets.max_len()],
            ));
        }
        if input_lengths.len() != batch {
            return Err(CtcError::shape("input lengths", &[batch], &[input_lengths.len()]));
        }
        if let Some((row, &length)) = input_lengths.iter().enumerate().find(|&(_, &len)| len != frames) {
            return Err(CtcError::InputLength { row, length, frames });
        }

        let topology = CtcTopology::new(targets, self.blank);
        let vt = topology.terminal::<A>(target_lengths)?;
        let v0 = topology.initial::<A>();
        let log_probs = logits.log_softmax();
        let ms = topology.transitions::<A>(&log_probs)?;

        log::trace!(
            "ctc loss ({}): T={} N={} K={} C={}",
            A::name(),
            frames,
            batch,
            logits.shape()[2],
            topology.num_states()
        );

        Ok(Problem {
            topology,
            log_probs,
            ms,
            v0,
            vt,
        })
    }

    fn reduce<T: Scalar>(&self, logz: &Tensor<T>, target_lengths: &[usize]) -> T {
        let total: T = logz
            .as_slice()
            .iter()
            .zip(target_lengths)
            .map(|(&z, &len)| -z / cast::<T>(len))
            .sum();
        match self.reduction {
            Reduction::Mean => total / cast::<T>(target_lengths.len()),
            Reduction::Sum => total,
        }
    }
}

/// CTC loss with blank 0 and mean reduction on the host backend.
///
/// Every entry of `input_lengths` must equal the number of frames in `logits`.
pub fn ctc_loss<A: Algebra>(
    logits: &Tensor<A::Scalar>,
    targets: &Labels,
    input_lengths: &[usize],
    target_lengths: &[usize],
) -> Result<A::Scalar> {
    CtcLoss::new().forward::<A>(logits, targets, input_lengths, target_lengths)
}

/// CTC loss under [`Log`], the usual training objective.
pub fn ctc_loss_log<T: Scalar>(
    logits: &Tensor<T>,
    targets: &Labels,
    input_lengths: &[usize],
    target_lengths: &[usize],
) -> Result<T> {
    ctc_loss::<Log<T>>(logits, targets, input_lengths, target_lengths)
}

struct Problem<T: Scalar> {
    topology: CtcTopology,
    log_probs: Tensor<T>,
    ms: Tensor<T>,
    v0: Tensor<T>,
    vt: Tensor<T>,
}

fn cast<T: Scalar>(x: usize) -> T {
    <T as num_traits::NumCast>::from(x).unwrap_or_else(T::nan)
}

fn report_unreachable<T: Scalar>(logz: &Tensor<T>) {
    for (n, z) in logz.as_slice().iter().enumerate() {
        if *z == T::neg_infinity() {
            log::debug!("row {} cannot reach its target; loss is infinite", n);
        }
    }
}

/// `g - softmax(x) * Σ g` along the last axis, given `log_probs = log_softmax(x)`.
fn log_softmax_backward<T: Scalar>(log_probs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    let width = log_probs.shape()[log_probs.ndim() - 1];
    let mut out = grad.to_vec();
    for (g, lp) in out.chunks_mut(width).zip(log_probs.as_slice().chunks(width)) {
        let total: T = g.iter().copied().sum();
        for (gi, &l) in g.iter_mut().zip(lp) {
            *gi = *gi - l.exp() * total;
        }
    }
    Tensor::from_vec(out, grad.shape())
}
