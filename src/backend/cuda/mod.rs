//! CUDA backend for GPU execution.
//!
//! This module provides the CUDA scan backend using cudarc. The kernel is
//! compiled with NVRTC on first use for each (algebra, scalar) pair and then
//! cached on the device.

mod kernel;

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaFunction, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::compile_ptx;
use thiserror::Error;

use super::traits::{check_scan_shapes, ScanBackend};
use crate::algebra::Algebra;
use crate::error::Result;
use crate::tensor::Tensor;
use crate::topology::SparseIndex;

/// Largest state count a single thread block can hold.
const MAX_BLOCK_STATES: usize = 1024;

/// CUDA backend for the sparse scan.
///
/// Wraps a CUDA device. Inputs are copied to the device per call and the
/// finished `alpha` table is copied back, so tensors stay host-side.
#[derive(Clone)]
pub struct Cuda {
    device: Arc<CudaDevice>,
}

impl Cuda {
    /// Create a new CUDA backend on the default device (device 0).
    pub fn new() -> std::result::Result<Self, CudaError> {
        Self::on_device(0)
    }

    /// Create a new CUDA backend on a specific device.
    ///
    /// # Arguments
    /// * `ordinal` - The device ordinal (0-indexed)
    pub fn on_device(ordinal: usize) -> std::result::Result<Self, CudaError> {
        let device = CudaDevice::new(ordinal).map_err(|e| CudaError::Device(e.to_string()))?;
        log::debug!("cuda scan backend on device {}", ordinal);
        Ok(Self { device })
    }

    /// Get a reference to the CUDA device.
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Fetch the scan kernel for `A`, compiling and loading it on first use.
    fn scan_function<A: Algebra>(&self) -> std::result::Result<CudaFunction, CudaError> {
        let module = kernel::module_name::<A>();
        if let Some(func) = self.device.get_func(&module, kernel::SCAN_FN) {
            return Ok(func);
        }

        log::debug!("compiling scan kernel {}", module);
        let ptx = compile_ptx(kernel::source::<A>()).map_err(|e| CudaError::Compile(e.to_string()))?;
        self.device
            .load_ptx(ptx, &module, &[kernel::SCAN_FN])
            .map_err(|e| CudaError::Device(e.to_string()))?;
        self.device
            .get_func(&module, kernel::SCAN_FN)
            .ok_or_else(|| CudaError::Device(format!("{} missing from module {}", kernel::SCAN_FN, module)))
    }
}

impl std::fmt::Debug for Cuda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cuda")
            .field("ordinal", &self.device.ordinal())
            .finish()
    }
}

impl ScanBackend for Cuda {
    fn name() -> &'static str {
        "cuda"
    }

    fn scan<A: Algebra>(
        &self,
        ms: &Tensor<A::Scalar>,
        idx: &SparseIndex,
        v0: &Tensor<A::Scalar>,
    ) -> Result<Tensor<A::Scalar>> {
        let [frames, batch, states, nz] = check_scan_shapes::<A>(ms, idx, v0)?;
        if states > MAX_BLOCK_STATES {
            return Err(CudaError::TooManyStates {
                states,
                max: MAX_BLOCK_STATES,
            }
            .into());
        }
        log::trace!(
            "cuda scan ({}): T={} N={} C={} nz={}",
            A::name(),
            frames,
            batch,
            states,
            nz
        );

        let func = self.scan_function::<A>()?;

        let width = batch * states;
        let mut alpha = vec![A::zero().to_scalar(); (frames + 1) * width];
        alpha[..width].copy_from_slice(v0.as_slice());
        let idx_i32: Vec<i32> = idx.as_slice().iter().map(|&p| p as i32).collect();

        let alloc = |e: cudarc::driver::DriverError| CudaError::Alloc(e.to_string());
        let mut alpha_dev = self.device.htod_sync_copy(&alpha).map_err(alloc)?;
        let ms_dev = self.device.htod_sync_copy(ms.as_slice()).map_err(alloc)?;
        let idx_dev = self.device.htod_sync_copy(&idx_i32).map_err(alloc)?;

        let cfg = LaunchConfig {
            grid_dim: (batch as u32, 1, 1),
            block_dim: (states as u32, 1, 1),
            shared_mem_bytes: (2 * states * std::mem::size_of::<A::Scalar>()) as u32,
        };
        // SAFETY: argument order and types match `sparse_mv_scan`; `alpha_dev`
        // holds (T + 1) * N * C elements and `ms_dev` T * N * C * nz.
        unsafe {
            func.launch(
                cfg,
                (
                    &mut alpha_dev,
                    &ms_dev,
                    &idx_dev,
                    frames as i32,
                    batch as i32,
                    states as i32,
                    nz as i32,
                    A::zero().to_scalar(),
                ),
            )
        }
        .map_err(|e| CudaError::Launch(e.to_string()))?;

        let alpha = self.device.dtoh_sync_copy(&alpha_dev).map_err(alloc)?;
        Ok(Tensor::from_vec(alpha, &[frames + 1, batch, states]))
    }
}

/// Errors that can occur during CUDA operations.
#[derive(Debug, Error)]
pub enum CudaError {
    /// Error initializing or accessing the CUDA device.
    #[error("CUDA device error: {0}")]
    Device(String),
    /// Error allocating or copying GPU memory.
    #[error("CUDA allocation error: {0}")]
    Alloc(String),
    /// NVRTC failed to compile the scan kernel.
    #[error("NVRTC compile error: {0}")]
    Compile(String),
    /// The kernel launch failed.
    #[error("CUDA launch error: {0}")]
    Launch(String),
    /// The state vector does not fit in one thread block.
    #[error("{states} states exceed the {max} threads of one block")]
    TooManyStates { states: usize, max: usize },
}
