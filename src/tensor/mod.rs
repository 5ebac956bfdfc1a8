//! Dense tensor storage and the numeric primitives the graph engine needs.
//!
//! A [`Tensor`] wraps an `ndarray` dynamic-dimensional array of `f32` and
//! exposes exactly the surface the expression graph relies on: shape
//! accessors, reshaping, broadcasting elementwise arithmetic, axis
//! reductions, a GEMM primitive with explicit transpose flags, random
//! constructors for initializers and masks, and a NaN probe used as a
//! fail-fast guard inside operator rules.

#[cfg(test)]
mod tests;

use ndarray::{ArrayD, Axis, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;

/// Dense f32 tensor with a dynamic number of dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// Wrap an existing ndarray array.
    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Build a tensor from a flat buffer and a shape.
    ///
    /// Panics if the buffer length does not match the shape's element count.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "buffer of {} elements cannot fill shape {:?}",
            data.len(),
            shape
        );
        Self {
            data: ArrayD::from_shape_vec(IxDyn(shape), data).expect("shape already validated"),
        }
    }

    /// Tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Tensor of ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::ones(IxDyn(shape)),
        }
    }

    /// Tensor of zeros with the same shape as `other`.
    pub fn zeros_like(other: &Tensor) -> Self {
        Self::zeros(other.shape())
    }

    /// Tensor of ones with the same shape as `other`.
    pub fn ones_like(other: &Tensor) -> Self {
        Self::ones(other.shape())
    }

    /// Single-element tensor of shape `[1]`.
    pub fn scalar(value: f32) -> Self {
        Self::from_vec(&[1], vec![value])
    }

    /// Uniform random tensor over `[lo, hi)`.
    pub fn random_uniform(shape: &[usize], lo: f32, hi: f32) -> Self {
        let mut rng = rand::thread_rng();
        let numel: usize = shape.iter().product();
        let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(lo..hi)).collect();
        Self::from_vec(shape, data)
    }

    /// Uniform random tensor over `[0, 1)`, used for stochastic masks.
    pub fn random_standard(shape: &[usize]) -> Self {
        Self::random_uniform(shape, 0.0, 1.0)
    }

    /// Standard-normal random tensor.
    pub fn randn(shape: &[usize]) -> Self {
        let mut rng = rand::thread_rng();
        let numel: usize = shape.iter().product();
        let data: Vec<f32> = (0..numel).map(|_| rng.sample(StandardNormal)).collect();
        Self::from_vec(shape, data)
    }

    /// Glorot (Xavier) uniform initializer: `U(-l, l)` with
    /// `l = sqrt(6 / (fan_in + fan_out))`.
    ///
    /// For 2-D kernels fan-in/fan-out are the two extents; for higher-rank
    /// kernels shaped `[out, spatial.., in]` the receptive field multiplies
    /// into both.
    pub fn glorot_uniform(shape: &[usize]) -> Self {
        let (fan_in, fan_out) = match shape.len() {
            0 | 1 => {
                let n = shape.first().copied().unwrap_or(1);
                (n, n)
            }
            2 => (shape[0], shape[1]),
            n => {
                let receptive: usize = shape[1..n - 1].iter().product();
                (shape[n - 1] * receptive, shape[0] * receptive)
            }
        };
        let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
        Self::random_uniform(shape, -limit, limit)
    }

    /// Shape as a slice of extents.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the underlying array.
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Flat contiguous view of the elements.
    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("tensor storage is contiguous standard layout")
    }

    /// Flat contiguous mutable view of the elements.
    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        self.data
            .as_slice_mut()
            .expect("tensor storage is contiguous standard layout")
    }

    /// Value of the single element of a `[1]`-shaped tensor.
    pub fn scalar_value(&self) -> f32 {
        assert_eq!(self.len(), 1, "expected a single-element tensor");
        self.as_slice()[0]
    }

    /// Reinterpret the elements under a new shape of the same size.
    pub fn reshape(&self, shape: &[usize]) -> Tensor {
        let numel: usize = shape.iter().product();
        assert_eq!(
            self.len(),
            numel,
            "cannot reshape {:?} ({} elements) into {:?}",
            self.shape(),
            self.len(),
            shape
        );
        Tensor {
            data: self
                .data
                .clone()
                .into_shape(IxDyn(shape))
                .expect("size already validated"),
        }
    }

    /// Elementwise addition with mutual broadcasting.
    pub fn add(&self, other: &Tensor) -> Tensor {
        let shape = broadcast_shape(self.shape(), other.shape());
        let (lhs, rhs) = (self.view_as(&shape), other.view_as(&shape));
        Tensor { data: &lhs + &rhs }
    }

    /// Elementwise subtraction with mutual broadcasting.
    pub fn sub(&self, other: &Tensor) -> Tensor {
        let shape = broadcast_shape(self.shape(), other.shape());
        let (lhs, rhs) = (self.view_as(&shape), other.view_as(&shape));
        Tensor { data: &lhs - &rhs }
    }

    /// Elementwise (Hadamard) product with mutual broadcasting.
    pub fn mul(&self, other: &Tensor) -> Tensor {
        let shape = broadcast_shape(self.shape(), other.shape());
        let (lhs, rhs) = (self.view_as(&shape), other.view_as(&shape));
        Tensor { data: &lhs * &rhs }
    }

    /// Elementwise division with mutual broadcasting.
    pub fn div(&self, other: &Tensor) -> Tensor {
        let shape = broadcast_shape(self.shape(), other.shape());
        let (lhs, rhs) = (self.view_as(&shape), other.view_as(&shape));
        Tensor { data: &lhs / &rhs }
    }

    fn view_as(&self, shape: &[usize]) -> ndarray::ArrayViewD<'_, f32> {
        self.data
            .broadcast(IxDyn(shape))
            .unwrap_or_else(|| panic!("cannot broadcast {:?} to {:?}", self.shape(), shape))
    }

    /// Apply `f` to every element, returning a new tensor.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.mapv(f),
        }
    }

    /// Multiply every element by `factor`.
    pub fn scale(&self, factor: f32) -> Tensor {
        self.map(|v| v * factor)
    }

    /// Elementwise negation.
    pub fn neg(&self) -> Tensor {
        self.map(|v| -v)
    }

    /// In-place accumulation: `self += other` (shapes must match or `other`
    /// must broadcast into `self`).
    pub fn add_assign(&mut self, other: &Tensor) {
        self.data += &other.data;
    }

    /// In-place scaled accumulation: `self += alpha * other`.
    pub fn scaled_add(&mut self, alpha: f32, other: &Tensor) {
        self.data.scaled_add(alpha, &other.data);
    }

    /// Overwrite every element with `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f32 {
        self.data.sum()
    }

    /// Sum along one axis. With `keepdims` the summed axis is kept at
    /// extent 1 instead of being squeezed away.
    pub fn sum_axis(&self, axis: usize, keepdims: bool) -> Tensor {
        assert!(
            axis < self.ndim(),
            "axis {} out of range for shape {:?}",
            axis,
            self.shape()
        );
        let summed = self.data.sum_axis(Axis(axis));
        let data = if keepdims {
            summed.insert_axis(Axis(axis))
        } else {
            summed
        };
        Tensor { data }
    }

    /// Sum of all elements as a `[1]`-shaped tensor.
    pub fn reduce_sum(&self) -> Tensor {
        Tensor::scalar(self.sum())
    }

    /// Mean of all elements as a `[1]`-shaped tensor.
    pub fn reduce_mean(&self) -> Tensor {
        assert!(!self.is_empty(), "mean of an empty tensor");
        Tensor::scalar(self.sum() / self.len() as f32)
    }

    /// True if any element is NaN. Used as a fail-fast guard at the
    /// boundary of numerically interesting operator rules.
    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }
}

/// Broadcast shape of two operands under trailing-alignment rules:
/// extents are compared from the last axis backwards, and an extent of 1
/// stretches to the other operand's extent.
///
/// Panics on incompatible extents.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Vec<usize> {
    let ndim = a.len().max(b.len());
    let mut shape = vec![0usize; ndim];
    for i in 0..ndim {
        let ea = if i < ndim - a.len() { 1 } else { a[i - (ndim - a.len())] };
        let eb = if i < ndim - b.len() { 1 } else { b[i - (ndim - b.len())] };
        assert!(
            ea == eb || ea == 1 || eb == 1,
            "cannot broadcast shapes {:?} and {:?}",
            a,
            b
        );
        shape[i] = ea.max(eb);
    }
    shape
}

/// Generalized matrix multiply with explicit transpose flags:
/// `out = op(a) . op(b)` where `op(a)` is `m`x`n`, `op(b)` is `n`x`k` and
/// `out` is `m`x`k`. A raised flag means the operand is stored transposed,
/// so no transpose is ever materialized.
pub fn gemm(
    a: &[f32],
    trans_a: bool,
    b: &[f32],
    trans_b: bool,
    m: usize,
    n: usize,
    k: usize,
    out: &mut [f32],
) {
    assert_eq!(a.len(), m * n, "gemm: lhs buffer does not hold {}x{}", m, n);
    assert_eq!(b.len(), n * k, "gemm: rhs buffer does not hold {}x{}", n, k);
    assert_eq!(out.len(), m * k, "gemm: out buffer does not hold {}x{}", m, k);

    // op(a)[i][j]: stored as a[i*n + j], or a[j*m + i] when transposed.
    let at = |i: usize, j: usize| if trans_a { a[j * m + i] } else { a[i * n + j] };
    // op(b)[i][j]: stored as b[i*k + j], or b[j*n + i] when transposed.
    let bt = |i: usize, j: usize| if trans_b { b[j * n + i] } else { b[i * k + j] };

    for i in 0..m {
        for j in 0..k {
            let mut acc = 0.0f32;
            for p in 0..n {
                acc += at(i, p) * bt(p, j);
            }
            out[i * k + j] = acc;
        }
    }
}
