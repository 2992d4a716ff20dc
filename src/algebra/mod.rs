//! Algebraic structures for the sparse scan.
//!
//! This module defines the [`Semiring`] trait, its [`Algebra`] extension used
//! by the scan and gradient code, and two implementations:
//! - [`Log<T>`]: log-domain probability `(log-sum-exp, +)`
//! - [`Max<T>`]: tropical max-plus `(max, +)`, for Viterbi scores

mod log;
mod max;
mod semiring;

pub use log::Log;
pub use max::Max;
pub use semiring::{Algebra, Semiring};

/// Marker trait for scalar types that can be used in tensors.
///
/// Only IEEE floats qualify: the semiring zero of both algebras is `-inf`.
pub trait Scalar:
    num_traits::Float
    + Copy
    + Clone
    + Send
    + Sync
    + Default
    + std::fmt::Debug
    + std::fmt::Display
    + std::ops::AddAssign
    + std::iter::Sum
    + 'static
    + bytemuck::Pod
    + DeviceScalar
{
    /// C type name used when specializing the device scan kernel.
    const KERNEL_TYPE: &'static str;
}

impl Scalar for f32 {
    const KERNEL_TYPE: &'static str = "float";
}

impl Scalar for f64 {
    const KERNEL_TYPE: &'static str = "double";
}

/// Extra bounds a scalar needs to be copied to and from device memory.
#[cfg(feature = "cuda")]
pub trait DeviceScalar: cudarc::driver::DeviceRepr + cudarc::driver::ValidAsZeroBits {}

#[cfg(feature = "cuda")]
impl<T: cudarc::driver::DeviceRepr + cudarc::driver::ValidAsZeroBits> DeviceScalar for T {}

/// Extra bounds a scalar needs to be copied to and from device memory.
#[cfg(not(feature = "cuda"))]
pub trait DeviceScalar {}

#[cfg(not(feature = "cuda"))]
impl<T> DeviceScalar for T {}
