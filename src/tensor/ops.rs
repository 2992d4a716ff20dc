//! Elementwise and along-axis tensor operations.

use super::Tensor;
use crate::algebra::Scalar;

impl<T: Scalar> Tensor<T> {
    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(T) -> T) -> Self {
        let data: Vec<T> = self.as_slice().iter().map(|&x| f(x)).collect();
        Self::from_vec(data, self.shape())
    }

    /// Reverse the order of entries along `axis`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sparse_ctc::Tensor;
    ///
    /// let t = Tensor::<f32>::from_data(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
    /// assert_eq!(t.flip(0).to_vec(), vec![5.0, 6.0, 3.0, 4.0, 1.0, 2.0]);
    /// ```
    pub fn flip(&self, axis: usize) -> Self {
        assert!(axis < self.ndim(), "Axis {} out of bounds for {}D tensor", axis, self.ndim());

        let outer: usize = self.shape()[..axis].iter().product();
        let len = self.shape()[axis];
        let inner: usize = self.shape()[axis + 1..].iter().product();

        let src = self.as_slice();
        let mut dst = Vec::with_capacity(src.len());
        for o in 0..outer {
            for j in (0..len).rev() {
                let start = (o * len + j) * inner;
                dst.extend_from_slice(&src[start..start + inner]);
            }
        }
        Self::from_vec(dst, self.shape())
    }

    /// Log-softmax along the last axis.
    ///
    /// Rows are shifted by their maximum before exponentiating. A row whose
    /// entries are all `-inf` stays `-inf`.
    pub fn log_softmax(&self) -> Self {
        let width = self.last_dim();
        let mut out = self.to_vec();
        for row in out.chunks_mut(width) {
            let max = row.iter().copied().fold(T::neg_infinity(), T::max);
            if max == T::neg_infinity() {
                continue;
            }
            let norm = max + row.iter().map(|&x| (x - max).exp()).sum::<T>().ln();
            for x in row.iter_mut() {
                *x = *x - norm;
            }
        }
        Self::from_vec(out, self.shape())
    }

    /// Softmax along the last axis.
    pub fn softmax(&self) -> Self {
        self.log_softmax().map(T::exp)
    }

    fn last_dim(&self) -> usize {
        assert!(self.ndim() > 0, "operation requires at least 1D tensor");
        self.shape()[self.ndim() - 1].max(1)
    }
}
