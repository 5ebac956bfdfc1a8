//! Layer builders in the Keras spirit: thin constructors that allocate
//! parameter leaves in the graph and compose core operators. No layer here
//! carries algorithmic content of its own.

#[cfg(test)]
mod tests;

use crate::graph::{Graph, InputId, Node};
use crate::ops;
use crate::ops::Padding;
use crate::tensor::Tensor;

/// L1/L2 regularization coefficients attached to a parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Regularizer {
    pub l1: f32,
    pub l2: f32,
}

impl Regularizer {
    pub fn new(l1: f32, l2: f32) -> Self {
        Self { l1, l2 }
    }
}

/// Allocate an input slot.
pub fn input(graph: &mut Graph) -> InputId {
    graph.input()
}

/// Densely connected layer: `x * W + b` with a Glorot-uniform kernel.
///
/// The bias is always allocated; with `use_bias` off it stays a
/// non-trainable zero vector, exactly like a frozen parameter.
#[derive(Debug, Clone)]
pub struct Dense {
    input_size: usize,
    output_size: usize,
    use_bias: bool,
    kernel_regularizer: Regularizer,
    bias_regularizer: Regularizer,
}

impl Dense {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        assert!(output_size > 0, "expecting output size larger than 0");
        assert!(input_size > 0, "expecting input size larger than 0");
        Self {
            input_size,
            output_size,
            use_bias: true,
            kernel_regularizer: Regularizer::default(),
            bias_regularizer: Regularizer::default(),
        }
    }

    pub fn use_bias(mut self, flag: bool) -> Self {
        self.use_bias = flag;
        self
    }

    pub fn kernel_regularizer(mut self, reg: Regularizer) -> Self {
        self.kernel_regularizer = reg;
        self
    }

    pub fn bias_regularizer(mut self, reg: Regularizer) -> Self {
        self.bias_regularizer = reg;
        self
    }

    pub fn apply(&self, graph: &mut Graph, x: impl Into<Node>) -> Node {
        let w = graph.parameter_with(
            Tensor::glorot_uniform(&[self.input_size, self.output_size]),
            self.kernel_regularizer.l1,
            self.kernel_regularizer.l2,
            true,
        );
        let b = graph.parameter_with(
            Tensor::zeros(&[1, self.output_size]),
            self.bias_regularizer.l1,
            self.bias_regularizer.l2,
            self.use_bias,
        );
        ops::plus(ops::matmul(x, w), b)
    }
}

/// 2-D convolution layer over `[batch, rows, cols, channels]` inputs.
#[derive(Debug, Clone)]
pub struct Conv2D {
    output_channels: usize,
    kernel_size: (usize, usize),
    input_shape: (usize, usize, usize),
    padding: Padding,
    strides: (usize, usize),
    dilations: (usize, usize),
    use_bias: bool,
    kernel_regularizer: Regularizer,
    bias_regularizer: Regularizer,
}

impl Conv2D {
    /// `input_shape` is `(rows, cols, channels)` of one sample.
    pub fn new(
        output_channels: usize,
        kernel_size: (usize, usize),
        input_shape: (usize, usize, usize),
    ) -> Self {
        assert!(output_channels > 0, "expecting output channels larger than 0");
        assert!(
            kernel_size.0 > 0 && kernel_size.1 > 0,
            "expecting positive kernel extents"
        );
        Self {
            output_channels,
            kernel_size,
            input_shape,
            padding: Padding::Valid,
            strides: (1, 1),
            dilations: (1, 1),
            use_bias: true,
            kernel_regularizer: Regularizer::default(),
            bias_regularizer: Regularizer::default(),
        }
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }

    pub fn dilations(mut self, dilations: (usize, usize)) -> Self {
        self.dilations = dilations;
        self
    }

    pub fn use_bias(mut self, flag: bool) -> Self {
        self.use_bias = flag;
        self
    }

    pub fn kernel_regularizer(mut self, reg: Regularizer) -> Self {
        self.kernel_regularizer = reg;
        self
    }

    pub fn bias_regularizer(mut self, reg: Regularizer) -> Self {
        self.bias_regularizer = reg;
        self
    }

    pub fn apply(&self, graph: &mut Graph, x: impl Into<Node>) -> Node {
        let (rows, cols, channels) = self.input_shape;
        let w = graph.parameter_with(
            Tensor::glorot_uniform(&[
                self.output_channels,
                self.kernel_size.0,
                self.kernel_size.1,
                channels,
            ]),
            self.kernel_regularizer.l1,
            self.kernel_regularizer.l2,
            true,
        );
        let b = graph.parameter_with(
            Tensor::zeros(&[1, 1, self.output_channels]),
            self.bias_regularizer.l1,
            self.bias_regularizer.l2,
            self.use_bias,
        );
        let convolved = ops::conv2d(
            graph,
            x,
            w,
            rows,
            cols,
            self.strides,
            self.dilations,
            self.padding,
        );
        ops::plus(convolved, b)
    }
}

/// Transposed 2-D convolution layer.
#[derive(Debug, Clone)]
pub struct Conv2DTranspose {
    output_channels: usize,
    kernel_size: (usize, usize),
    input_shape: (usize, usize, usize),
    padding: Padding,
    strides: (usize, usize),
    dilations: (usize, usize),
    use_bias: bool,
    kernel_regularizer: Regularizer,
    bias_regularizer: Regularizer,
}

impl Conv2DTranspose {
    pub fn new(
        output_channels: usize,
        kernel_size: (usize, usize),
        input_shape: (usize, usize, usize),
    ) -> Self {
        assert!(output_channels > 0, "expecting output channels larger than 0");
        assert!(
            kernel_size.0 > 0 && kernel_size.1 > 0,
            "expecting positive kernel extents"
        );
        Self {
            output_channels,
            kernel_size,
            input_shape,
            padding: Padding::Valid,
            strides: (1, 1),
            dilations: (1, 1),
            use_bias: true,
            kernel_regularizer: Regularizer::default(),
            bias_regularizer: Regularizer::default(),
        }
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }

    pub fn dilations(mut self, dilations: (usize, usize)) -> Self {
        self.dilations = dilations;
        self
    }

    pub fn use_bias(mut self, flag: bool) -> Self {
        self.use_bias = flag;
        self
    }

    pub fn apply(&self, graph: &mut Graph, x: impl Into<Node>) -> Node {
        let (rows, cols, channels) = self.input_shape;
        let w = graph.parameter_with(
            Tensor::glorot_uniform(&[
                self.output_channels,
                self.kernel_size.0,
                self.kernel_size.1,
                channels,
            ]),
            self.kernel_regularizer.l1,
            self.kernel_regularizer.l2,
            true,
        );
        let b = graph.parameter_with(
            Tensor::zeros(&[1, 1, self.output_channels]),
            self.bias_regularizer.l1,
            self.bias_regularizer.l2,
            self.use_bias,
        );
        let convolved = ops::conv2d_transpose(
            graph,
            x,
            w,
            rows,
            cols,
            self.strides,
            self.dilations,
            self.padding,
        );
        ops::plus(convolved, b)
    }
}

/// Batch-normalization layer: normalizing core plus per-channel gamma/beta
/// parameters composed through broadcasting.
#[derive(Debug, Clone)]
pub struct BatchNormalization {
    channels: usize,
    momentum: f32,
    gamma_regularizer: Regularizer,
    beta_regularizer: Regularizer,
}

impl BatchNormalization {
    pub fn new(channels: usize) -> Self {
        assert!(channels > 0, "expecting channel count larger than 0");
        Self {
            channels,
            momentum: 0.98,
            gamma_regularizer: Regularizer::default(),
            beta_regularizer: Regularizer::default(),
        }
    }

    pub fn momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn gamma_regularizer(mut self, reg: Regularizer) -> Self {
        self.gamma_regularizer = reg;
        self
    }

    pub fn beta_regularizer(mut self, reg: Regularizer) -> Self {
        self.beta_regularizer = reg;
        self
    }

    pub fn apply(&self, graph: &mut Graph, x: impl Into<Node>) -> Node {
        let gamma = graph.parameter_with(
            Tensor::ones(&[self.channels]),
            self.gamma_regularizer.l1,
            self.gamma_regularizer.l2,
            true,
        );
        let beta = graph.parameter_with(
            Tensor::zeros(&[self.channels]),
            self.beta_regularizer.l1,
            self.beta_regularizer.l2,
            true,
        );
        let normalized = ops::batch_norm(x, self.momentum);
        ops::plus(ops::hadamard_product(normalized, gamma), beta)
    }
}

/// Dropout layer.
pub fn dropout(x: impl Into<Node>, rate: f32) -> Node {
    ops::drop_out(x, rate)
}

/// Flatten layer: collapses everything but the batch axis.
pub fn flatten(x: impl Into<Node>) -> Node {
    ops::flatten(x)
}

/// Reshape layer. `new_shape` describes one sample when `include_batch` is
/// set.
pub fn reshape(x: impl Into<Node>, new_shape: &[usize], include_batch: bool) -> Node {
    ops::reshape(x, new_shape, include_batch)
}

/// Max-pooling layer.
pub fn max_pooling_2d(x: impl Into<Node>, stride: usize) -> Node {
    ops::max_pooling_2d(x, stride)
}

/// Average-pooling layer.
pub fn average_pooling_2d(x: impl Into<Node>, stride: usize) -> Node {
    ops::average_pooling_2d(x, stride)
}

/// Upsampling layer.
pub fn up_sampling_2d(x: impl Into<Node>, stride: usize) -> Node {
    ops::up_sampling_2d(x, stride)
}
