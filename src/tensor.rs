//! Dense Matrices for the LSTM
//!
//! This module provides the small matrix type that every parameter, gradient
//! and activation in the crate is stored in. Everything the LSTM touches is
//! two-dimensional: weight matrices are `[rows, cols]` and vectors are column
//! vectors of shape `[n, 1]`, exactly as in the textbook equations.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f64>` storing all elements in row-major order
//! - **Shape**: `[rows, cols]`; element `(r, c)` lives at `data[r * cols + c]`
//!
//! ## Why f64?
//!
//! The gradient checker compares analytic gradients against central
//! differences taken with δ = 0.001. In single precision the rounding noise
//! of a summed cross-entropy loss is of the same order as the difference being
//! measured, so every tensor here is double precision.
//!
//! ## Example
//!
//! ```rust
//! use char_lstm::Tensor;
//!
//! // W · x for a 2x3 matrix and a column vector
//! let w = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let x = Tensor::new(vec![1.0, 0.0, 1.0], vec![3, 1]);
//! let y = w.matmul(&x);
//! assert_eq!(y.shape, vec![2, 1]);
//! assert_eq!(y.data, vec![4.0, 10.0]);
//! ```
//!
//! ## Performance
//!
//! Matrix multiplication switches to a Rayon-parallel, cache-blocked kernel
//! once the amount of work crosses a threshold. The LSTM's default sizes stay
//! below it; the parallel path pays off for larger hidden sizes.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Work (m·n·k multiply-adds) above which `matmul` runs in parallel.
const PARALLEL_MATMUL_THRESHOLD: usize = 1 << 16;

/// A dense two-dimensional array
///
/// # Memory Layout
///
/// For shape `[2, 3]`, data is stored as:
/// `[row0_col0, row0_col1, row0_col2, row1_col0, row1_col1, row1_col2]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f64>,
    /// Shape of the tensor: `[rows, cols]`
    pub shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the shape is not two-dimensional or if the product of the
    /// shape dimensions doesn't equal the data length.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use char_lstm::Tensor;
    /// let tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
    /// assert_eq!(tensor.shape, vec![2, 2]);
    /// ```
    pub fn new(data: Vec<f64>, shape: Vec<usize>) -> Self {
        assert_eq!(shape.len(), 2, "Expected a 2D shape, got {:?}", shape);
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        Self { data, shape }
    }

    /// Create a tensor filled with zeros
    ///
    /// ```rust
    /// # use char_lstm::Tensor;
    /// let tensor = Tensor::zeros(3, 4);
    /// assert_eq!(tensor.data.len(), 12);
    /// assert!(tensor.data.iter().all(|&x| x == 0.0));
    /// ```
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(vec![0.0; rows * cols], vec![rows, cols])
    }

    /// Zero tensor with the same shape as `self`
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.rows(), self.cols())
    }

    /// Build a tensor by calling `f` once per element in row-major order
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut() -> f64) -> Self {
        let data = (0..rows * cols).map(|_| f()).collect();
        Self::new(data, vec![rows, cols])
    }

    /// Column vector of length `size` with a single 1.0 at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index >= size`
    pub fn one_hot(index: usize, size: usize) -> Self {
        assert!(index < size, "One-hot index {} out of range {}", index, size);
        let mut t = Self::zeros(size, 1);
        t.data[index] = 1.0;
        t
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    /// Number of scalar elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at `(row, col)`
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols() + col]
    }

    /// Innermost loop of the blocked kernel: `result[j] += a_val * b[j]`
    ///
    /// Written as a plain zip so LLVM can auto-vectorize it.
    #[inline(always)]
    fn matmul_inner_simd(a_val: f64, b: &[f64], result: &mut [f64]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// Matrix multiplication
    ///
    /// For `A @ B` where `A` is `[m, k]` and `B` is `[k, n]` the result has
    /// shape `[m, n]` and `C[i,j] = Σ_l A[i,l] · B[l,j]`.
    ///
    /// # Panics
    ///
    /// Panics if the inner dimensions differ
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape[1], other.shape[0],
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            self.shape[0], self.shape[1], other.shape[0], other.shape[1]
        );

        let m = self.shape[0];
        let n = other.shape[1];
        let k = self.shape[1];

        if m * n * k >= PARALLEL_MATMUL_THRESHOLD {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for l in 0..k {
                    sum += self.data[i * k + l] * other.data[l * n + j];
                }
                result[i * n + j] = sum;
            }
        }

        Tensor::new(result, vec![m, n])
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Processes the output in 8-row blocks distributed across threads by
    /// Rayon, iterating the column and inner dimensions in 8-wide tiles so
    /// that each tile stays resident in L1.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                let a_val = self.data[i * k + k_idx];
                                Self::matmul_inner_simd(
                                    a_val,
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Matrix transpose
    ///
    /// ```rust
    /// # use char_lstm::Tensor;
    /// let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
    /// let tt = t.transpose();
    /// assert_eq!(tt.shape, vec![3, 2]);
    /// assert_eq!(tt.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn transpose(&self) -> Tensor {
        let (rows, cols) = (self.rows(), self.cols());
        let mut result = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                result[j * rows + i] = self.data[i * cols + j];
            }
        }
        Tensor::new(result, vec![cols, rows])
    }

    fn assert_same_shape(&self, other: &Tensor, op: &str) {
        assert_eq!(
            self.shape, other.shape,
            "Shape mismatch in {}: {:?} vs {:?}",
            op, self.shape, other.shape
        );
    }

    /// Element-wise addition (shapes must match exactly)
    pub fn add(&self, other: &Tensor) -> Tensor {
        self.zip_map(other, "add", |a, b| a + b)
    }

    /// Element-wise subtraction
    pub fn sub(&self, other: &Tensor) -> Tensor {
        self.zip_map(other, "sub", |a, b| a - b)
    }

    /// Element-wise (Hadamard) product
    pub fn mul(&self, other: &Tensor) -> Tensor {
        self.zip_map(other, "mul", |a, b| a * b)
    }

    fn zip_map(&self, other: &Tensor, op: &str, f: impl Fn(f64, f64) -> f64) -> Tensor {
        self.assert_same_shape(other, op);
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor::new(data, self.shape.clone())
    }

    /// Apply `f` to every element
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        let data = self.data.iter().map(|&x| f(x)).collect();
        Tensor::new(data, self.shape.clone())
    }

    /// In-place element-wise accumulation: `self += other`
    pub fn add_assign(&mut self, other: &Tensor) {
        self.assert_same_shape(other, "add_assign");
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Accumulate the outer product of two column vectors: `self += a · bᵀ`
    ///
    /// This is how every weight gradient in the backward pass is formed, so
    /// it avoids materialising the transpose and the temporary product.
    ///
    /// # Panics
    ///
    /// Panics unless `a` is `[rows, 1]` and `b` is `[cols, 1]`
    pub fn add_outer(&mut self, a: &Tensor, b: &Tensor) {
        assert!(
            a.cols() == 1 && b.cols() == 1 && a.rows() == self.rows() && b.rows() == self.cols(),
            "Outer product {:?} x {:?}^T doesn't fit into {:?}",
            a.shape,
            b.shape,
            self.shape
        );
        let cols = self.cols();
        for (i, &a_val) in a.data.iter().enumerate() {
            if a_val == 0.0 {
                continue;
            }
            Self::matmul_inner_simd(a_val, &b.data, &mut self.data[i * cols..(i + 1) * cols]);
        }
    }

    /// Stack two column vectors vertically: `[self; other]`
    pub fn concat_rows(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.cols(),
            other.cols(),
            "Cannot stack {:?} on top of {:?}",
            self.shape,
            other.shape
        );
        let mut data = Vec::with_capacity(self.len() + other.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        Tensor::new(data, vec![self.rows() + other.rows(), self.cols()])
    }

    /// Rows `start..end` as a new tensor
    pub fn slice_rows(&self, start: usize, end: usize) -> Tensor {
        assert!(
            start <= end && end <= self.rows(),
            "Row range {}..{} out of bounds for {:?}",
            start,
            end,
            self.shape
        );
        let cols = self.cols();
        Tensor::new(self.data[start * cols..end * cols].to_vec(), vec![end - start, cols])
    }

    /// Sum of all elements
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Flat index of the largest element
    pub fn argmax(&self) -> usize {
        self.data
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            })
            .0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_matches_naive_above_threshold() {
        // 64 x 40 @ 40 x 32 crosses the parallel threshold
        let mut seed = 7u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as f64 / (1u64 << 31) as f64) - 0.5
        };
        let a = Tensor::from_fn(64, 40, &mut next);
        let b = Tensor::from_fn(40, 32, &mut next);
        let c = a.matmul(&b);

        for i in 0..64 {
            for j in 0..32 {
                let expected: f64 = (0..40).map(|l| a.get(i, l) * b.get(l, j)).sum();
                assert!((c.get(i, j) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_add_outer_accumulates() {
        let mut acc = Tensor::zeros(2, 3);
        let a = Tensor::new(vec![1.0, 2.0], vec![2, 1]);
        let b = Tensor::new(vec![1.0, 0.0, -1.0], vec![3, 1]);
        acc.add_outer(&a, &b);
        acc.add_outer(&a, &b);
        assert_eq!(acc.data, vec![2.0, 0.0, -2.0, 4.0, 0.0, -4.0]);
    }

    #[test]
    fn test_concat_then_slice_restores_halves() {
        let h = Tensor::new(vec![1.0, 2.0, 3.0], vec![3, 1]);
        let x = Tensor::new(vec![4.0, 5.0], vec![2, 1]);
        let z = h.concat_rows(&x);
        assert_eq!(z.shape, vec![5, 1]);
        assert_eq!(z.slice_rows(0, 3), h);
        assert_eq!(z.slice_rows(3, 5), x);
    }

    #[test]
    fn test_get_is_row_major_and_serializes_data_and_shape_only() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        assert_eq!(t.get(0, 2), 3.0);
        assert_eq!(t.get(1, 0), 4.0);
        assert_eq!(t.transpose().get(2, 1), 6.0);

        let json = serde_json::to_value(&t).unwrap();
        let fields: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(fields, vec!["data", "shape"]);
        let back: Tensor = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_one_hot() {
        let t = Tensor::one_hot(2, 4);
        assert_eq!(t.data, vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(t.argmax(), 2);
    }

    #[test]
    #[should_panic(expected = "Shape mismatch in add")]
    fn test_add_shape_mismatch_panics() {
        Tensor::zeros(2, 1).add(&Tensor::zeros(3, 1));
    }
}
