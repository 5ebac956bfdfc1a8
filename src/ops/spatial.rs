//! Spatial operators over `[batch, rows, cols, channels]` tensors:
//! image-to-column transform, convolution composed on top of it, transposed
//! convolution, pooling and upsampling.

use crate::graph::{Graph, Node, ParamId};
use crate::ops::UnaryKind;
use crate::tensor::Tensor;

use super::arith::{matmul, reshape, transpose};

/// Padding policy of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// No padding.
    Valid,
    /// Symmetric zero padding chosen so that a unit-stride convolution
    /// preserves the spatial extents. The required total padding must be
    /// even; asymmetric "same" padding is not supported.
    Same,
}

/// Marks a column-matrix cell that reads from the zero-padded border.
const PAD: u32 = u32::MAX;

fn conv_extent(input: usize, kernel: usize, padding: usize, stride: usize, dilation: usize) -> usize {
    let effective = dilation * (kernel - 1) + 1;
    assert!(
        input + 2 * padding >= effective,
        "dilated kernel extent {} exceeds padded input extent {}",
        effective,
        input + 2 * padding
    );
    (input + 2 * padding - effective) / stride + 1
}

fn same_padding(kernel: usize, stride: usize, dilation: usize) -> usize {
    let effective = dilation * (kernel - 1) + 1;
    assert!(
        effective >= stride,
        "\"same\" padding expects stride at most the dilated kernel extent {}, but got {}",
        effective,
        stride
    );
    let total = effective - stride;
    assert!(
        total % 2 == 0,
        "expecting total \"same\" padding to be even, but got {}",
        total
    );
    total / 2
}

/// Image-to-column transform.
///
/// Rewrites every sliding receptive-field window of a 4-D input into one
/// column of a 2-D matrix shaped `[kr*kc*ch, batch*out_rows*out_cols]`, so
/// that convolution becomes a single matrix product against the flattened
/// filter bank. The mapping from column cells to flat source offsets is
/// computed once and cached; the cache is keyed by the full input shape and
/// rebuilt whenever it changes. Backward scatter-adds the upstream gradient
/// through the same mapping, accumulating where receptive fields overlap.
#[derive(Debug, Clone)]
pub struct Im2Col {
    kernel: (usize, usize),
    padding: (usize, usize),
    stride: (usize, usize),
    dilation: (usize, usize),
    index_map: Vec<u32>,
    mapped_shape: Vec<usize>,
}

impl Im2Col {
    pub(crate) fn new(
        kernel: (usize, usize),
        padding: (usize, usize),
        stride: (usize, usize),
        dilation: (usize, usize),
    ) -> Self {
        assert!(kernel.0 > 0 && kernel.1 > 0, "im2col kernel extents must be positive");
        assert!(stride.0 > 0 && stride.1 > 0, "im2col strides must be positive");
        assert!(dilation.0 > 0 && dilation.1 > 0, "im2col dilations must be positive");
        Self {
            kernel,
            padding,
            stride,
            dilation,
            index_map: Vec::new(),
            mapped_shape: Vec::new(),
        }
    }

    pub(crate) fn forward(&mut self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        assert_eq!(shape.len(), 4, "im2col expects a 4-D tensor, got {:?}", shape);
        let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
        let (kr, kc) = self.kernel;
        let out_r = conv_extent(rows, kr, self.padding.0, self.stride.0, self.dilation.0);
        let out_c = conv_extent(cols, kc, self.padding.1, self.stride.1, self.dilation.1);
        let col_rows = kr * kc * ch;
        let col_cols = bs * out_r * out_c;

        if self.mapped_shape != shape {
            self.rebuild_index_map(bs, rows, cols, ch, out_r, out_c);
            self.mapped_shape = shape.to_vec();
        }

        let mut out = Tensor::zeros(&[col_rows, col_cols]);
        let src = input.as_slice();
        let dst = out.as_slice_mut();
        for (cell, &index) in self.index_map.iter().enumerate() {
            dst[cell] = if index == PAD { 0.0 } else { src[index as usize] };
        }
        out
    }

    fn rebuild_index_map(
        &mut self,
        bs: usize,
        rows: usize,
        cols: usize,
        ch: usize,
        out_r: usize,
        out_c: usize,
    ) {
        let (kr, kc) = self.kernel;
        let (pr, pc) = self.padding;
        let (sr, sc) = self.stride;
        let (dr, dc) = self.dilation;
        let col_rows = kr * kc * ch;
        let plane = out_r * out_c;
        self.index_map.resize(col_rows * bs * plane, 0);

        for row in 0..col_rows {
            // decompose the column-matrix row into its kernel offset and
            // source channel
            let w_off = row % kc;
            let h_off = (row / kc) % kr;
            let c_im = row / (kc * kr);
            for b in 0..bs {
                for h in 0..out_r {
                    let im_row = (h * sr + h_off * dr) as i64 - pr as i64;
                    for w in 0..out_c {
                        let im_col = (w * sc + w_off * dc) as i64 - pc as i64;
                        let cell = row * (bs * plane) + b * plane + h * out_c + w;
                        let in_bounds = im_row >= 0
                            && im_row < rows as i64
                            && im_col >= 0
                            && im_col < cols as i64;
                        self.index_map[cell] = if in_bounds {
                            ((b * rows * cols * ch) as i64
                                + (im_row * cols as i64 + im_col) * ch as i64
                                + c_im as i64) as u32
                        } else {
                            PAD
                        };
                    }
                }
            }
        }
    }

    pub(crate) fn backward(&self, input: &Tensor, grad: &Tensor) -> Tensor {
        assert_eq!(
            grad.len(),
            self.index_map.len(),
            "im2col backward ran against a stale index map"
        );
        let mut ans = Tensor::zeros(input.shape());
        let dst = ans.as_slice_mut();
        let g = grad.as_slice();
        for (cell, &index) in self.index_map.iter().enumerate() {
            if index != PAD {
                dst[index as usize] += g[cell];
            }
        }
        ans
    }
}

/// Max pooling over non-overlapping `stride x stride` windows.
///
/// Forward records the position that attained each window's maximum as a
/// binary mask sized to the input; backward routes each output cell's
/// gradient to exactly the marked position.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    stride: usize,
    mask: Option<Tensor>,
}

impl MaxPool2d {
    pub(crate) fn new(stride: usize) -> Self {
        assert!(
            stride > 1,
            "expecting max_pooling_2d stride greater than 1, but got {}",
            stride
        );
        Self { stride, mask: None }
    }

    pub(crate) fn forward(&mut self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        assert_eq!(shape.len(), 4, "max pooling expects a 4-D tensor, got {:?}", shape);
        let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
        let s = self.stride;
        let (out_r, out_c) = (rows / s, cols / s);
        assert!(
            out_r > 0 && out_c > 0,
            "pooling window {} exceeds input extents {:?}",
            s,
            shape
        );

        let mask = match &mut self.mask {
            Some(m) if m.shape() == shape => {
                m.fill(0.0);
                m
            }
            slot => slot.insert(Tensor::zeros(shape)),
        };

        let mut out = Tensor::zeros(&[bs, out_r, out_c, ch]);
        let src = input.as_slice();
        let dst = out.as_slice_mut();
        let msk = mask.as_slice_mut();
        let at = |b: usize, r: usize, c: usize, k: usize| ((b * rows + r) * cols + c) * ch + k;

        for b in 0..bs {
            for r in 0..out_r {
                for c in 0..out_c {
                    for k in 0..ch {
                        let (mut best_r, mut best_c) = (r * s, c * s);
                        for rr in r * s..r * s + s {
                            for cc in c * s..c * s + s {
                                if src[at(b, rr, cc, k)] > src[at(b, best_r, best_c, k)] {
                                    best_r = rr;
                                    best_c = cc;
                                }
                            }
                        }
                        msk[at(b, best_r, best_c, k)] = 1.0;
                        dst[((b * out_r + r) * out_c + c) * ch + k] = src[at(b, best_r, best_c, k)];
                    }
                }
            }
        }
        out
    }

    pub(crate) fn backward(&self, input: &Tensor, grad: &Tensor) -> Tensor {
        let shape = input.shape();
        let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
        let s = self.stride;
        let (out_r, out_c) = (rows / s, cols / s);
        let mask = self
            .mask
            .as_ref()
            .expect("max pooling backward before forward");

        let mut ans = Tensor::zeros(shape);
        let dst = ans.as_slice_mut();
        let msk = mask.as_slice();
        let g = grad.as_slice();
        let at = |b: usize, r: usize, c: usize, k: usize| ((b * rows + r) * cols + c) * ch + k;

        for b in 0..bs {
            for r in 0..out_r {
                for c in 0..out_c {
                    for k in 0..ch {
                        for rr in r * s..r * s + s {
                            for cc in c * s..c * s + s {
                                if (msk[at(b, rr, cc, k)] - 1.0).abs() < 1.0e-5 {
                                    dst[at(b, rr, cc, k)] =
                                        g[((b * out_r + r) * out_c + c) * ch + k];
                                }
                            }
                        }
                    }
                }
            }
        }
        ans
    }
}

pub(super) fn avg_pool_forward(input: &Tensor, stride: usize) -> Tensor {
    let shape = input.shape();
    assert_eq!(shape.len(), 4, "average pooling expects a 4-D tensor, got {:?}", shape);
    let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
    let (out_r, out_c) = (rows / stride, cols / stride);
    assert!(
        out_r > 0 && out_c > 0,
        "pooling window {} exceeds input extents {:?}",
        stride,
        shape
    );

    let mut out = Tensor::zeros(&[bs, out_r, out_c, ch]);
    let src = input.as_slice();
    let dst = out.as_slice_mut();
    let factor = 1.0 / (stride * stride) as f32;

    for b in 0..bs {
        for r in 0..out_r {
            for c in 0..out_c {
                for k in 0..ch {
                    let mut acc = 0.0;
                    for rr in r * stride..r * stride + stride {
                        for cc in c * stride..c * stride + stride {
                            acc += src[((b * rows + rr) * cols + cc) * ch + k];
                        }
                    }
                    dst[((b * out_r + r) * out_c + c) * ch + k] = acc * factor;
                }
            }
        }
    }
    out
}

pub(super) fn avg_pool_backward(input: &Tensor, grad: &Tensor, stride: usize) -> Tensor {
    let shape = input.shape();
    let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
    let (out_r, out_c) = (rows / stride, cols / stride);

    let mut ans = Tensor::zeros(shape);
    let dst = ans.as_slice_mut();
    let g = grad.as_slice();
    let factor = 1.0 / (stride * stride) as f32;

    for b in 0..bs {
        for r in 0..out_r {
            for c in 0..out_c {
                for k in 0..ch {
                    let upstream = g[((b * out_r + r) * out_c + c) * ch + k] * factor;
                    for rr in r * stride..r * stride + stride {
                        for cc in c * stride..c * stride + stride {
                            dst[((b * rows + rr) * cols + cc) * ch + k] = upstream;
                        }
                    }
                }
            }
        }
    }
    ans
}

pub(super) fn up_sample_forward(input: &Tensor, stride: usize) -> Tensor {
    let shape = input.shape();
    assert_eq!(shape.len(), 4, "upsampling expects a 4-D tensor, got {:?}", shape);
    let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
    let (out_r, out_c) = (rows * stride, cols * stride);

    let mut out = Tensor::zeros(&[bs, out_r, out_c, ch]);
    let src = input.as_slice();
    let dst = out.as_slice_mut();

    for b in 0..bs {
        for r in 0..rows {
            for c in 0..cols {
                for k in 0..ch {
                    let value = src[((b * rows + r) * cols + c) * ch + k];
                    for rr in r * stride..r * stride + stride {
                        for cc in c * stride..c * stride + stride {
                            dst[((b * out_r + rr) * out_c + cc) * ch + k] = value;
                        }
                    }
                }
            }
        }
    }
    out
}

pub(super) fn up_sample_backward(input: &Tensor, grad: &Tensor, stride: usize) -> Tensor {
    let shape = input.shape();
    let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
    let (out_r, out_c) = (rows * stride, cols * stride);

    let mut ans = Tensor::zeros(shape);
    let dst = ans.as_slice_mut();
    let g = grad.as_slice();

    for b in 0..bs {
        for r in 0..rows {
            for c in 0..cols {
                for k in 0..ch {
                    let mut acc = 0.0;
                    for rr in r * stride..r * stride + stride {
                        for cc in c * stride..c * stride + stride {
                            acc += g[((b * out_r + rr) * out_c + cc) * ch + k];
                        }
                    }
                    dst[((b * rows + r) * cols + c) * ch + k] += acc;
                }
            }
        }
    }
    ans
}

/// Zero-stuffing upsample used by the transposed convolution: source cells
/// land `stride` apart with zeros between them.
pub(super) fn zero_up_sample_forward(input: &Tensor, stride: (usize, usize)) -> Tensor {
    let shape = input.shape();
    assert_eq!(shape.len(), 4, "zero upsampling expects a 4-D tensor, got {:?}", shape);
    let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
    let (out_r, out_c) = ((rows - 1) * stride.0 + 1, (cols - 1) * stride.1 + 1);

    let mut out = Tensor::zeros(&[bs, out_r, out_c, ch]);
    let src = input.as_slice();
    let dst = out.as_slice_mut();

    for b in 0..bs {
        for r in 0..rows {
            for c in 0..cols {
                for k in 0..ch {
                    dst[((b * out_r + r * stride.0) * out_c + c * stride.1) * ch + k] =
                        src[((b * rows + r) * cols + c) * ch + k];
                }
            }
        }
    }
    out
}

pub(super) fn zero_up_sample_backward(
    input: &Tensor,
    grad: &Tensor,
    stride: (usize, usize),
) -> Tensor {
    let shape = input.shape();
    let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);
    let (out_r, out_c) = ((rows - 1) * stride.0 + 1, (cols - 1) * stride.1 + 1);

    let mut ans = Tensor::zeros(shape);
    let dst = ans.as_slice_mut();
    let g = grad.as_slice();

    for b in 0..bs {
        for r in 0..rows {
            for c in 0..cols {
                for k in 0..ch {
                    dst[((b * rows + r) * cols + c) * ch + k] =
                        g[((b * out_r + r * stride.0) * out_c + c * stride.1) * ch + k];
                }
            }
        }
    }
    ans
}

/// Reverse the two spatial axes of a 4-D tensor. Self-adjoint, so backward
/// applies the same flip to the gradient.
pub(super) fn flip_spatial(input: &Tensor) -> Tensor {
    let shape = input.shape();
    assert_eq!(shape.len(), 4, "spatial flip expects a 4-D tensor, got {:?}", shape);
    let (bs, rows, cols, ch) = (shape[0], shape[1], shape[2], shape[3]);

    let mut out = Tensor::zeros(shape);
    let src = input.as_slice();
    let dst = out.as_slice_mut();

    for b in 0..bs {
        for r in 0..rows {
            for c in 0..cols {
                for k in 0..ch {
                    dst[((b * rows + r) * cols + c) * ch + k] =
                        src[((b * rows + (rows - 1 - r)) * cols + (cols - 1 - c)) * ch + k];
                }
            }
        }
    }
    out
}

// === Expression builders ===

/// Image-to-column transform node.
pub fn im2col(
    arg: impl Into<Node>,
    kernel: (usize, usize),
    padding: (usize, usize),
    stride: (usize, usize),
    dilation: (usize, usize),
) -> Node {
    Node::unary(UnaryKind::Im2Col(Im2Col::new(kernel, padding, stride, dilation)), arg)
}

/// 2-D convolution of a `[batch, rows, cols, in_ch]` input against a
/// `[out_ch, kr, kc, in_ch]` filter-bank parameter.
///
/// Composes the core operators exactly: im2col on the input, the filter
/// bank flattened to `[out_ch, kr*kc*in_ch]`, one matrix product, a
/// transpose and a batch-aware reshape to `[batch, out_r, out_c, out_ch]`.
pub fn conv2d(
    graph: &Graph,
    input: impl Into<Node>,
    kernel: ParamId,
    input_rows: usize,
    input_cols: usize,
    stride: (usize, usize),
    dilation: (usize, usize),
    padding: Padding,
) -> Node {
    let kshape = graph.value(kernel).shape().to_vec();
    assert_eq!(
        kshape.len(),
        4,
        "convolution kernel must be 4-D [out_ch, rows, cols, in_ch], got {:?}",
        kshape
    );
    let pads = match padding {
        Padding::Valid => (0, 0),
        Padding::Same => (
            same_padding(kshape[1], stride.0, dilation.0),
            same_padding(kshape[2], stride.1, dilation.1),
        ),
    };
    conv2d_compose(
        input.into(),
        Node::from(kernel),
        &kshape,
        input_rows,
        input_cols,
        stride,
        dilation,
        pads,
    )
}

#[allow(clippy::too_many_arguments)]
fn conv2d_compose(
    input: Node,
    kernel: Node,
    kshape: &[usize],
    input_rows: usize,
    input_cols: usize,
    stride: (usize, usize),
    dilation: (usize, usize),
    padding: (usize, usize),
) -> Node {
    let (out_ch, kr, kc, in_ch) = (kshape[0], kshape[1], kshape[2], kshape[3]);
    let out_r = conv_extent(input_rows, kr, padding.0, stride.0, dilation.0);
    let out_c = conv_extent(input_cols, kc, padding.1, stride.1, dilation.1);

    // [BS, R, C, CH] -> [kr*kc*CH, BS*out_r*out_c]
    let columns = im2col(input, (kr, kc), padding, stride, dilation);
    // [NC, kr, kc, CH] -> [NC, kr*kc*CH]
    let kernel_flat = reshape(kernel, &[kr * kc * in_ch], true);
    // [NC, BS*out_r*out_c]
    let product = matmul(kernel_flat, columns);
    // [BS*out_r*out_c, NC] -> [BS, out_r, out_c, NC]
    reshape(transpose(product), &[out_r, out_c, out_ch], true)
}

/// Transposed 2-D convolution (the adjoint of [`conv2d`] with the same
/// geometry): the input is zero-stuffed `stride` apart, the kernel is
/// spatially flipped, and a unit-stride convolution with complementary
/// padding produces `(rows-1)*stride + k_eff - 2*padding` output extents —
/// exactly `rows*stride` under "same" padding.
pub fn conv2d_transpose(
    graph: &Graph,
    input: impl Into<Node>,
    kernel: ParamId,
    input_rows: usize,
    input_cols: usize,
    stride: (usize, usize),
    dilation: (usize, usize),
    padding: Padding,
) -> Node {
    let kshape = graph.value(kernel).shape().to_vec();
    assert_eq!(
        kshape.len(),
        4,
        "convolution kernel must be 4-D [out_ch, rows, cols, in_ch], got {:?}",
        kshape
    );
    let (kr, kc) = (kshape[1], kshape[2]);
    let (er, ec) = (dilation.0 * (kr - 1) + 1, dilation.1 * (kc - 1) + 1);
    let (pr, pc) = match padding {
        Padding::Valid => (0, 0),
        Padding::Same => (
            same_padding(kr, stride.0, dilation.0),
            same_padding(kc, stride.1, dilation.1),
        ),
    };
    assert!(
        er > pr && ec > pc,
        "transposed convolution padding ({}, {}) exceeds the dilated kernel extents ({}, {})",
        pr,
        pc,
        er,
        ec
    );

    let up_r = (input_rows - 1) * stride.0 + 1;
    let up_c = (input_cols - 1) * stride.1 + 1;
    let stuffed = Node::unary(UnaryKind::ZeroUpSample2d { stride }, input);
    let flipped = Node::unary(UnaryKind::FlipSpatial, Node::from(kernel));
    conv2d_compose(
        stuffed,
        flipped,
        &kshape,
        up_r,
        up_c,
        (1, 1),
        dilation,
        (er - 1 - pr, ec - 1 - pc),
    )
}

/// Max pooling over `stride x stride` windows.
pub fn max_pooling_2d(arg: impl Into<Node>, stride: usize) -> Node {
    Node::unary(UnaryKind::MaxPool2d(MaxPool2d::new(stride)), arg)
}

/// Average pooling over `stride x stride` windows.
pub fn average_pooling_2d(arg: impl Into<Node>, stride: usize) -> Node {
    assert!(
        stride > 1,
        "expecting average_pooling_2d stride greater than 1, but got {}",
        stride
    );
    Node::unary(UnaryKind::AvgPool2d { stride }, arg)
}

/// Nearest-neighbour upsampling: every source cell becomes a
/// `stride x stride` block.
pub fn up_sampling_2d(arg: impl Into<Node>, stride: usize) -> Node {
    assert!(
        stride > 1,
        "expecting up_sampling_2d stride greater than 1, but got {}",
        stride
    );
    Node::unary(UnaryKind::UpSample2d { stride }, arg)
}
