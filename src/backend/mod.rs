//! Scan backends.
//!
//! This module defines the [`ScanBackend`] strategy trait and implementations:
//! - [`Cpu`]: host implementation, batch rows scanned in parallel
//! - [`Cuda`]: device kernel, one thread block per batch row (optional, requires `cuda` feature)

mod cpu;
mod traits;

pub use cpu::Cpu;
pub use traits::ScanBackend;

pub(crate) use traits::check_scan_shapes;

#[cfg(feature = "cuda")]
mod cuda;

#[cfg(feature = "cuda")]
pub use cuda::{Cuda, CudaError};
