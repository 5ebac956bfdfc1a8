//! Arithmetic, reduction and shape operators.
//!
//! Broadcasting binary operators reduce the upstream gradient back to each
//! operand's original shape in their backward rule: leading axes are summed
//! away until the ranks match, then every axis where the operand's extent is
//! 1 is summed with the axis kept. This exactly inverts trailing-aligned
//! broadcasting.

use crate::graph::Node;
use crate::ops::{BinaryKind, UnaryKind};
use crate::tensor::{gemm, Tensor};

/// Reduce `grad` back to `shape` by inverting the broadcasting rule.
pub(crate) fn reduce_to_shape(grad: &Tensor, shape: &[usize]) -> Tensor {
    let mut ans = grad.clone();
    while ans.ndim() > shape.len() {
        ans = ans.sum_axis(0, false);
    }
    for (axis, &extent) in shape.iter().enumerate() {
        if extent == 1 && ans.shape()[axis] != 1 {
            ans = ans.sum_axis(axis, true);
        }
    }
    ans
}

// === Binary rules ===

pub(super) fn add_forward(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    assert!(!lhs.has_nan(), "plus forward: left operand contains NaN");
    assert!(!rhs.has_nan(), "plus forward: right operand contains NaN");
    lhs.add(rhs)
}

pub(super) fn add_backward(lhs_input: &Tensor, rhs_input: &Tensor, grad: &Tensor) -> (Tensor, Tensor) {
    assert!(!grad.has_nan(), "plus backward: upstream gradient contains NaN");
    (
        reduce_to_shape(grad, lhs_input.shape()),
        reduce_to_shape(grad, rhs_input.shape()),
    )
}

pub(super) fn matmul_forward(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    assert_eq!(lhs.ndim(), 2, "matmul expects a 2-D left operand, got {:?}", lhs.shape());
    assert_eq!(rhs.ndim(), 2, "matmul expects a 2-D right operand, got {:?}", rhs.shape());
    let (m, k) = (lhs.shape()[0], lhs.shape()[1]);
    let (k2, n) = (rhs.shape()[0], rhs.shape()[1]);
    assert_eq!(
        k, k2,
        "matmul inner extents disagree: {:?} x {:?}",
        lhs.shape(),
        rhs.shape()
    );
    let mut out = Tensor::zeros(&[m, n]);
    gemm(
        lhs.as_slice(),
        false,
        rhs.as_slice(),
        false,
        m,
        k,
        n,
        out.as_slice_mut(),
    );
    out
}

pub(super) fn matmul_backward(
    lhs_input: &Tensor,
    rhs_input: &Tensor,
    grad: &Tensor,
) -> (Tensor, Tensor) {
    let (m, k) = (lhs_input.shape()[0], lhs_input.shape()[1]);
    let n = rhs_input.shape()[1];

    // dA = grad . B^T, dB = A^T . grad, both through the gemm primitive
    // with transpose flags rather than materialized transposes.
    let mut lhs_grad = Tensor::zeros_like(lhs_input);
    gemm(
        grad.as_slice(),
        false,
        rhs_input.as_slice(),
        true,
        m,
        n,
        k,
        lhs_grad.as_slice_mut(),
    );

    let mut rhs_grad = Tensor::zeros_like(rhs_input);
    gemm(
        lhs_input.as_slice(),
        true,
        grad.as_slice(),
        false,
        k,
        m,
        n,
        rhs_grad.as_slice_mut(),
    );

    (lhs_grad, rhs_grad)
}

pub(super) fn hadamard_forward(lhs: &Tensor, rhs: &Tensor) -> Tensor {
    lhs.mul(rhs)
}

pub(super) fn hadamard_backward(
    lhs_input: &Tensor,
    rhs_input: &Tensor,
    grad: &Tensor,
) -> (Tensor, Tensor) {
    (
        reduce_to_shape(&grad.mul(rhs_input), lhs_input.shape()),
        reduce_to_shape(&grad.mul(lhs_input), rhs_input.shape()),
    )
}

// === Unary rules ===

pub(super) fn negative_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "negative forward: operand contains NaN");
    input.neg()
}

pub(super) fn negative_backward(grad: &Tensor) -> Tensor {
    assert!(!grad.has_nan(), "negative backward: upstream gradient contains NaN");
    grad.neg()
}

pub(super) fn log_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "log forward: operand contains NaN");
    input.map(f32::ln)
}

pub(super) fn log_backward(input: &Tensor, grad: &Tensor) -> Tensor {
    assert!(!grad.has_nan(), "log backward: upstream gradient contains NaN");
    let ans = grad.div(input);
    assert!(!ans.has_nan(), "log backward: result contains NaN");
    ans
}

pub(super) fn exp_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "exp forward: operand contains NaN");
    input.map(f32::exp)
}

pub(super) fn exp_backward(output: &Tensor, grad: &Tensor) -> Tensor {
    assert!(!grad.has_nan(), "exp backward: upstream gradient contains NaN");
    grad.mul(output)
}

pub(super) fn abs_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "abs forward: operand contains NaN");
    input.map(f32::abs)
}

pub(super) fn abs_backward(input: &Tensor, grad: &Tensor) -> Tensor {
    assert!(!grad.has_nan(), "abs backward: upstream gradient contains NaN");
    grad.mul(&input.map(|v| if v > 0.0 { 1.0 } else { -1.0 }))
}

pub(super) fn square_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "square forward: operand contains NaN");
    input.map(|v| v * v)
}

pub(super) fn square_backward(input: &Tensor, grad: &Tensor) -> Tensor {
    assert!(!grad.has_nan(), "square backward: upstream gradient contains NaN");
    input.mul(grad).scale(2.0)
}

pub(super) fn one_minus_forward(input: &Tensor) -> Tensor {
    input.map(|v| 1.0 - v)
}

pub(super) fn one_minus_backward(grad: &Tensor) -> Tensor {
    grad.neg()
}

pub(super) fn clip_forward(input: &Tensor, lo: f32, hi: f32) -> Tensor {
    assert!(!input.has_nan(), "clip forward: operand contains NaN");
    input.map(|v| v.clamp(lo, hi))
}

pub(super) fn clip_backward(input: &Tensor, grad: &Tensor, lo: f32, hi: f32) -> Tensor {
    assert!(!grad.has_nan(), "clip backward: upstream gradient contains NaN");
    grad.mul(&input.map(|v| if v < lo || v > hi { 0.0 } else { 1.0 }))
}

pub(super) fn sum_reduce_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "sum_reduce forward: operand contains NaN");
    input.reduce_sum()
}

pub(super) fn sum_reduce_backward(input: &Tensor, grad: &Tensor) -> Tensor {
    assert!(!grad.has_nan(), "sum_reduce backward: upstream gradient contains NaN");
    assert_eq!(grad.len(), 1, "sum_reduce outputs a single value");
    Tensor::ones_like(input).scale(grad.scalar_value())
}

pub(super) fn mean_reduce_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "mean_reduce forward: operand contains NaN");
    input.reduce_mean()
}

pub(super) fn mean_reduce_backward(input: &Tensor, grad: &Tensor) -> Tensor {
    assert!(!grad.has_nan(), "mean_reduce backward: upstream gradient contains NaN");
    assert_eq!(grad.len(), 1, "mean_reduce outputs a single value");
    Tensor::ones_like(input).scale(grad.scalar_value() / input.len() as f32)
}

pub(super) fn reshape_forward(input: &Tensor, target: &[usize], batched: bool) -> Tensor {
    let new_size: usize = target.iter().product();
    let total = input.len();
    let batch = total / new_size;
    assert_eq!(
        batch * new_size,
        total,
        "reshape target {:?} does not divide {} input elements",
        target,
        total
    );
    if !batched {
        assert_eq!(batch, 1, "expected batch size 1 without the batch flag, got {}", batch);
        return input.reshape(target);
    }
    let mut shape = Vec::with_capacity(target.len() + 1);
    shape.push(batch);
    shape.extend_from_slice(target);
    input.reshape(&shape)
}

pub(super) fn flatten_forward(input: &Tensor) -> Tensor {
    assert!(
        input.ndim() > 1,
        "flatten expects more than one dimension, got {:?}",
        input.shape()
    );
    let batch = input.shape()[0];
    input.reshape(&[batch, input.len() / batch])
}

pub(super) fn transpose_forward(input: &Tensor) -> Tensor {
    assert_eq!(input.ndim(), 2, "transpose expects a 2-D tensor, got {:?}", input.shape());
    let (rows, cols) = (input.shape()[0], input.shape()[1]);
    let mut out = Tensor::zeros(&[cols, rows]);
    let src = input.as_slice();
    let dst = out.as_slice_mut();
    for r in 0..rows {
        for c in 0..cols {
            dst[c * rows + r] = src[r * cols + c];
        }
    }
    out
}

// === Expression builders ===

/// Broadcasting elementwise addition.
pub fn plus(lhs: impl Into<Node>, rhs: impl Into<Node>) -> Node {
    Node::binary(BinaryKind::Add, lhs, rhs)
}

/// Subtraction, composed as `lhs + (-rhs)`.
pub fn minus(lhs: impl Into<Node>, rhs: impl Into<Node>) -> Node {
    plus(lhs, negative(rhs))
}

/// 2-D matrix product.
pub fn matmul(lhs: impl Into<Node>, rhs: impl Into<Node>) -> Node {
    Node::binary(BinaryKind::MatMul, lhs, rhs)
}

/// Broadcasting elementwise product.
pub fn hadamard_product(lhs: impl Into<Node>, rhs: impl Into<Node>) -> Node {
    Node::binary(BinaryKind::Hadamard, lhs, rhs)
}

/// Elementwise negation.
pub fn negative(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Negative, arg)
}

/// Elementwise natural logarithm.
pub fn log(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Log, arg)
}

/// Elementwise exponential.
pub fn exp(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Exp, arg)
}

/// Elementwise absolute value.
pub fn abs(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Abs, arg)
}

/// Elementwise square.
pub fn square(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Square, arg)
}

/// Elementwise `1 - x`.
pub fn one_minus(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::OneMinus, arg)
}

/// Clamp every element into `[lo, hi]`; gradients vanish outside the band.
pub fn clip(arg: impl Into<Node>, lo: f32, hi: f32) -> Node {
    assert!(lo < hi, "clip expects lo < hi, got [{}, {}]", lo, hi);
    Node::unary(UnaryKind::Clip { lo, hi }, arg)
}

/// Identity passthrough.
pub fn identity(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Identity, arg)
}

/// Sum of all elements, as a `[1]`-shaped tensor.
pub fn sum_reduce(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::SumReduce, arg)
}

/// Mean of all elements, as a `[1]`-shaped tensor.
pub fn mean_reduce(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::MeanReduce, arg)
}

/// Reshape. With `include_batch` the leading extent is inferred from the
/// incoming tensor and `new_shape` describes one sample; without it the
/// tensor is reshaped to `new_shape` directly and must carry batch size 1.
pub fn reshape(arg: impl Into<Node>, new_shape: &[usize], include_batch: bool) -> Node {
    Node::unary(
        UnaryKind::Reshape {
            target: new_shape.to_vec(),
            batched: include_batch,
        },
        arg,
    )
}

/// Collapse everything but the leading (batch) axis.
pub fn flatten(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Flatten, arg)
}

/// 2-D transpose.
pub fn transpose(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Transpose, arg)
}
