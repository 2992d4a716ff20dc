//! Host-side dense tensor used for scores, transition weights and scan tables.
//!
//! The [`Tensor`] type supports:
//! - Row-major (C order) contiguous layout: the last axis is contiguous
//! - Cheap clones via reference-counted storage
//! - Semiring reductions along an axis

mod ops;

use std::sync::Arc;

use crate::algebra::{Algebra, Scalar};

/// A multi-dimensional, row-major tensor.
///
/// Storage is shared between clones, so saving a tensor for the backward
/// pass does not copy it.
///
/// # Example
///
/// ```rust
/// use sparse_ctc::Tensor;
///
/// let a = Tensor::<f32>::from_data(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
/// assert_eq!(a.get(&[1, 0]), 4.0);
/// let b = a.reshape(&[3, 2]);
/// assert_eq!(b.get(&[1, 0]), 3.0);
/// ```
#[derive(Clone)]
pub struct Tensor<T: Scalar> {
    /// Shared storage (reference counted)
    storage: Arc<Vec<T>>,

    /// Shape of this tensor
    shape: Vec<usize>,

    /// Strides for each dimension (in elements)
    strides: Vec<usize>,
}

impl<T: Scalar> Tensor<T> {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create a tensor by copying row-major `data` with the given shape.
    pub fn from_data(data: &[T], shape: &[usize]) -> Self {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Create a tensor that takes ownership of row-major `data`.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            numel
        );

        Self {
            storage: Arc::new(data),
            strides: compute_contiguous_strides(shape),
            shape: shape.to_vec(),
        }
    }

    /// Create a tensor filled with `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        let numel: usize = shape.iter().product();
        Self::from_vec(vec![value; numel], shape)
    }

    /// Create a tensor filled with the semiring zero of `A`.
    pub fn semiring_zeros<A: Algebra<Scalar = T>>(shape: &[usize]) -> Self {
        Self::full(shape, A::zero().to_scalar())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Get the shape of the tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the strides of the tensor.
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Get the number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements.
    #[inline]
    pub fn numel(&self) -> usize {
        self.storage.len()
    }

    // ========================================================================
    // Data Access
    // ========================================================================

    /// Borrow the row-major data.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.storage
    }

    /// Copy all data to a Vec.
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.as_ref().clone()
    }

    /// Take the data out, copying only if the storage is shared.
    pub fn into_vec(self) -> Vec<T> {
        Arc::try_unwrap(self.storage).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    /// Read one element by its multi-index.
    pub fn get(&self, index: &[usize]) -> T {
        self.storage[self.offset_of(index)]
    }

    fn offset_of(&self, index: &[usize]) -> usize {
        assert_eq!(
            index.len(),
            self.ndim(),
            "Index {:?} doesn't match ndim {}",
            index,
            self.ndim()
        );
        index
            .iter()
            .zip(&self.shape)
            .zip(&self.strides)
            .map(|((&i, &n), &s)| {
                assert!(i < n, "Index {:?} out of bounds for shape {:?}", index, self.shape);
                i * s
            })
            .sum()
    }

    // ========================================================================
    // View Operations
    // ========================================================================

    /// Reshape to a new shape (zero-copy).
    pub fn reshape(&self, new_shape: &[usize]) -> Self {
        let new_numel: usize = new_shape.iter().product();
        assert_eq!(
            self.numel(),
            new_numel,
            "Cannot reshape from {:?} ({} elements) to {:?} ({} elements)",
            self.shape,
            self.numel(),
            new_shape,
            new_numel
        );

        Self {
            storage: Arc::clone(&self.storage),
            shape: new_shape.to_vec(),
            strides: compute_contiguous_strides(new_shape),
        }
    }

    // ========================================================================
    // Reduction Operations
    // ========================================================================

    /// Reduce along `axis` using the algebra's n-ary sum.
    ///
    /// The result has one fewer dimension than the input.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sparse_ctc::Tensor;
    /// use sparse_ctc::algebra::Max;
    ///
    /// let t = Tensor::<f32>::from_data(&[1.0, 5.0, 3.0, 4.0], &[2, 2]);
    /// let best = t.sum_axis::<Max<f32>>(1);
    /// assert_eq!(best.to_vec(), vec![5.0, 4.0]);
    /// ```
    pub fn sum_axis<A: Algebra<Scalar = T>>(&self, axis: usize) -> Self {
        assert!(axis < self.ndim(), "Axis {} out of bounds for {}D tensor", axis, self.ndim());

        let outer: usize = self.shape[..axis].iter().product();
        let len = self.shape[axis];
        let inner: usize = self.shape[axis + 1..].iter().product();

        let mut new_shape = self.shape.clone();
        new_shape.remove(axis);

        let data = self.as_slice();
        let mut lane = vec![A::zero().to_scalar(); len];
        let mut result = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            for i in 0..inner {
                for (j, slot) in lane.iter_mut().enumerate() {
                    *slot = data[(o * len + j) * inner + i];
                }
                result.push(A::sum(&lane));
            }
        }

        Self::from_vec(result, &new_shape)
    }
}

/// Compute contiguous strides for row-major (C) layout.
///
/// For shape [m, n], returns strides [n, 1] (last dimension is contiguous).
pub fn compute_contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

impl<T: Scalar> std::fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .finish()
    }
}
