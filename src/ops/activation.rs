//! Activation operators.

use crate::graph::Node;
use crate::ops::UnaryKind;
use crate::tensor::Tensor;

pub(super) fn relu_forward(input: &Tensor) -> Tensor {
    input.map(|v| v.max(0.0))
}

pub(super) fn relu_backward(input: &Tensor, grad: &Tensor) -> Tensor {
    grad.mul(&input.map(|v| if v > 0.0 { 1.0 } else { 0.0 }))
}

pub(super) fn leaky_relu_forward(input: &Tensor, alpha: f32) -> Tensor {
    input.map(|v| if v > 0.0 { v } else { alpha * v })
}

pub(super) fn leaky_relu_backward(input: &Tensor, grad: &Tensor, alpha: f32) -> Tensor {
    grad.mul(&input.map(|v| if v > 0.0 { 1.0 } else { alpha }))
}

pub(super) fn elu_forward(input: &Tensor, alpha: f32) -> Tensor {
    input.map(|v| if v > 0.0 { v } else { alpha * (v.exp() - 1.0) })
}

pub(super) fn elu_backward(input: &Tensor, grad: &Tensor, alpha: f32) -> Tensor {
    grad.mul(&input.map(|v| if v > 0.0 { 1.0 } else { alpha * v.exp() }))
}

pub(super) fn sigmoid_forward(input: &Tensor) -> Tensor {
    input.map(|v| 1.0 / (1.0 + (-v).exp()))
}

pub(super) fn sigmoid_backward(output: &Tensor, grad: &Tensor) -> Tensor {
    grad.mul(&output.map(|y| y * (1.0 - y)))
}

pub(super) fn tanh_forward(input: &Tensor) -> Tensor {
    input.map(f32::tanh)
}

pub(super) fn tanh_backward(output: &Tensor, grad: &Tensor) -> Tensor {
    grad.mul(&output.map(|y| 1.0 - y * y))
}

/// Row-wise softmax over the last axis, stabilized by subtracting each
/// row's maximum before exponentiation.
pub(super) fn softmax_forward(input: &Tensor) -> Tensor {
    assert!(!input.has_nan(), "softmax forward: operand contains NaN");
    let cols = *input
        .shape()
        .last()
        .expect("softmax expects at least one axis");
    let mut out = input.clone();
    for row in out.as_slice_mut().chunks_mut(cols) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    out
}

/// dx = y (.) (g - sum(y (.) g)), per row.
pub(super) fn softmax_backward(output: &Tensor, grad: &Tensor) -> Tensor {
    let cols = *output.shape().last().expect("softmax output has an axis");
    let mut ans = grad.clone();
    let y = output.as_slice();
    for (r, row) in ans.as_slice_mut().chunks_mut(cols).enumerate() {
        let y_row = &y[r * cols..(r + 1) * cols];
        let dot: f32 = row.iter().zip(y_row).map(|(g, y)| g * y).sum();
        for (g, &yv) in row.iter_mut().zip(y_row) {
            *g = yv * (*g - dot);
        }
    }
    ans
}

// === Expression builders ===

/// Rectified linear unit.
pub fn relu(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Relu, arg)
}

/// Leaky rectified linear unit with negative-side slope `alpha`.
pub fn leaky_relu(arg: impl Into<Node>, alpha: f32) -> Node {
    assert!(
        alpha > 0.0 && alpha < 1.0,
        "expecting leaky_relu slope within (0, 1), but got {}",
        alpha
    );
    Node::unary(UnaryKind::LeakyRelu { alpha }, arg)
}

/// Exponential linear unit.
pub fn elu(arg: impl Into<Node>, alpha: f32) -> Node {
    assert!(alpha > 0.0, "expecting elu factor greater than 0, but got {}", alpha);
    Node::unary(UnaryKind::Elu { alpha }, arg)
}

/// Logistic sigmoid.
pub fn sigmoid(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Sigmoid, arg)
}

/// Hyperbolic tangent.
pub fn tanh(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Tanh, arg)
}

/// Softmax over the last axis.
pub fn softmax(arg: impl Into<Node>) -> Node {
    Node::unary(UnaryKind::Softmax, arg)
}
