//! Error type for the CTC core.

use thiserror::Error;

/// Errors reported synchronously by the scan, gradient and loss entry points.
///
/// Every variant is a caller-input error; nothing here is transient.
#[derive(Debug, Error)]
pub enum CtcError {
    /// A tensor or index does not have the shape the operation requires.
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A batch row declares an input length different from the frame count.
    #[error("input length {length} of row {row} differs from the {frames} frames in the batch")]
    InputLength {
        row: usize,
        length: usize,
        frames: usize,
    },

    /// A target length places the final state outside the state range.
    #[error("target length {length} of row {row} does not fit in {states} states")]
    InvalidTarget {
        row: usize,
        length: usize,
        states: usize,
    },

    /// A label or the blank id is not a valid class.
    #[error("label {label} in row {row} is out of range for {classes} classes")]
    InvalidLabel {
        row: usize,
        label: usize,
        classes: usize,
    },

    /// A sparse index cannot be inverted with a fixed fan-out.
    #[error("state {state} is listed as a predecessor {count} times, expected {nz}")]
    IrregularIndex { state: usize, count: usize, nz: usize },

    /// The accelerator backend failed.
    #[cfg(feature = "cuda")]
    #[error(transparent)]
    Device(#[from] crate::backend::CudaError),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, CtcError>;

impl CtcError {
    pub(crate) fn shape(what: &'static str, expected: &[usize], got: &[usize]) -> Self {
        CtcError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}
