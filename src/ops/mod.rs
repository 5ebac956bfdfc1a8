//! Operator library: forward/backward rule pairs over the tensors an
//! operator node caches.
//!
//! Every operator is a variant of [`UnaryKind`] or [`BinaryKind`]; the
//! composer in `graph::node` owns the cached input/output tensors and feeds
//! them back to the matching backward rule. Stateful operators (im2col,
//! pooling, dropout, batch normalization) carry their own concrete state
//! struct inside their variant, lazily initialized on first use and reused
//! across evaluation cycles.

mod activation;
mod arith;
mod dropout;
mod norm;
mod spatial;


pub use activation::{elu, leaky_relu, relu, sigmoid, softmax, tanh};
pub use arith::{
    abs, clip, exp, flatten, hadamard_product, identity, log, matmul, mean_reduce, minus, negative,
    one_minus, plus, reshape, square, sum_reduce, transpose,
};
pub use dropout::{drop_out, Dropout};
pub use norm::{batch_norm, BatchNorm};
pub use spatial::{
    average_pooling_2d, conv2d, conv2d_transpose, im2col, max_pooling_2d, up_sampling_2d, Im2Col,
    MaxPool2d, Padding,
};

use crate::graph::EvalCtx;
use crate::tensor::Tensor;

/// Rules for unary operator nodes.
#[derive(Debug, Clone)]
pub enum UnaryKind {
    Negative,
    Log,
    Exp,
    Abs,
    Square,
    OneMinus,
    Clip { lo: f32, hi: f32 },
    Identity,
    SumReduce,
    MeanReduce,
    Reshape { target: Vec<usize>, batched: bool },
    Flatten,
    Transpose,
    Relu,
    LeakyRelu { alpha: f32 },
    Elu { alpha: f32 },
    Sigmoid,
    Tanh,
    Softmax,
    Im2Col(Im2Col),
    MaxPool2d(MaxPool2d),
    AvgPool2d { stride: usize },
    UpSample2d { stride: usize },
    ZeroUpSample2d { stride: (usize, usize) },
    FlipSpatial,
    Dropout(Dropout),
    BatchNorm(BatchNorm),
}

/// Rules for binary operator nodes.
#[derive(Debug, Clone)]
pub enum BinaryKind {
    /// Broadcasting elementwise addition.
    Add,
    /// 2-D matrix product.
    MatMul,
    /// Broadcasting elementwise product.
    Hadamard,
}

impl UnaryKind {
    pub(crate) fn forward(&mut self, input: &Tensor, ctx: &EvalCtx) -> Tensor {
        match self {
            UnaryKind::Negative => arith::negative_forward(input),
            UnaryKind::Log => arith::log_forward(input),
            UnaryKind::Exp => arith::exp_forward(input),
            UnaryKind::Abs => arith::abs_forward(input),
            UnaryKind::Square => arith::square_forward(input),
            UnaryKind::OneMinus => arith::one_minus_forward(input),
            UnaryKind::Clip { lo, hi } => arith::clip_forward(input, *lo, *hi),
            UnaryKind::Identity => input.clone(),
            UnaryKind::SumReduce => arith::sum_reduce_forward(input),
            UnaryKind::MeanReduce => arith::mean_reduce_forward(input),
            UnaryKind::Reshape { target, batched } => {
                arith::reshape_forward(input, target, *batched)
            }
            UnaryKind::Flatten => arith::flatten_forward(input),
            UnaryKind::Transpose => arith::transpose_forward(input),
            UnaryKind::Relu => activation::relu_forward(input),
            UnaryKind::LeakyRelu { alpha } => activation::leaky_relu_forward(input, *alpha),
            UnaryKind::Elu { alpha } => activation::elu_forward(input, *alpha),
            UnaryKind::Sigmoid => activation::sigmoid_forward(input),
            UnaryKind::Tanh => activation::tanh_forward(input),
            UnaryKind::Softmax => activation::softmax_forward(input),
            UnaryKind::Im2Col(op) => op.forward(input),
            UnaryKind::MaxPool2d(op) => op.forward(input),
            UnaryKind::AvgPool2d { stride } => spatial::avg_pool_forward(input, *stride),
            UnaryKind::UpSample2d { stride } => spatial::up_sample_forward(input, *stride),
            UnaryKind::ZeroUpSample2d { stride } => spatial::zero_up_sample_forward(input, *stride),
            UnaryKind::FlipSpatial => spatial::flip_spatial(input),
            UnaryKind::Dropout(op) => op.forward(input, ctx),
            UnaryKind::BatchNorm(op) => op.forward(input, ctx),
        }
    }

    pub(crate) fn backward(
        &self,
        input: &Tensor,
        output: &Tensor,
        grad: &Tensor,
        ctx: &EvalCtx,
    ) -> Tensor {
        match self {
            UnaryKind::Negative => arith::negative_backward(grad),
            UnaryKind::Log => arith::log_backward(input, grad),
            UnaryKind::Exp => arith::exp_backward(output, grad),
            UnaryKind::Abs => arith::abs_backward(input, grad),
            UnaryKind::Square => arith::square_backward(input, grad),
            UnaryKind::OneMinus => arith::one_minus_backward(grad),
            UnaryKind::Clip { lo, hi } => arith::clip_backward(input, grad, *lo, *hi),
            UnaryKind::Identity => grad.clone(),
            UnaryKind::SumReduce => arith::sum_reduce_backward(input, grad),
            UnaryKind::MeanReduce => arith::mean_reduce_backward(input, grad),
            UnaryKind::Reshape { .. } => grad.reshape(input.shape()),
            UnaryKind::Flatten => grad.reshape(input.shape()),
            UnaryKind::Transpose => arith::transpose_forward(grad),
            UnaryKind::Relu => activation::relu_backward(input, grad),
            UnaryKind::LeakyRelu { alpha } => activation::leaky_relu_backward(input, grad, *alpha),
            UnaryKind::Elu { alpha } => activation::elu_backward(input, grad, *alpha),
            UnaryKind::Sigmoid => activation::sigmoid_backward(output, grad),
            UnaryKind::Tanh => activation::tanh_backward(output, grad),
            UnaryKind::Softmax => activation::softmax_backward(output, grad),
            UnaryKind::Im2Col(op) => op.backward(input, grad),
            UnaryKind::MaxPool2d(op) => op.backward(input, grad),
            UnaryKind::AvgPool2d { stride } => spatial::avg_pool_backward(input, grad, *stride),
            UnaryKind::UpSample2d { stride } => spatial::up_sample_backward(input, grad, *stride),
            UnaryKind::ZeroUpSample2d { stride } => {
                spatial::zero_up_sample_backward(input, grad, *stride)
            }
            UnaryKind::FlipSpatial => spatial::flip_spatial(grad),
            UnaryKind::Dropout(op) => op.backward(grad, ctx),
            UnaryKind::BatchNorm(op) => op.backward(output, grad, ctx),
        }
    }
}

impl BinaryKind {
    pub(crate) fn forward(&self, lhs: &Tensor, rhs: &Tensor) -> Tensor {
        match self {
            BinaryKind::Add => arith::add_forward(lhs, rhs),
            BinaryKind::MatMul => arith::matmul_forward(lhs, rhs),
            BinaryKind::Hadamard => arith::hadamard_forward(lhs, rhs),
        }
    }

    pub(crate) fn backward(
        &self,
        lhs_input: &Tensor,
        rhs_input: &Tensor,
        _output: &Tensor,
        grad: &Tensor,
    ) -> (Tensor, Tensor) {
        match self {
            BinaryKind::Add => arith::add_backward(lhs_input, rhs_input, grad),
            BinaryKind::MatMul => arith::matmul_backward(lhs_input, rhs_input, grad),
            BinaryKind::Hadamard => arith::hadamard_backward(lhs_input, rhs_input, grad),
        }
    }
}
