//! Dropout: stochastic masking gated by the evaluation context.

use crate::graph::{EvalCtx, Node};
use crate::ops::UnaryKind;
use crate::tensor::Tensor;

/// Dropout state: the keep mask of the current evaluation cycle and the
/// cycle it was drawn in.
///
/// The mask is drawn once per cycle (a new session step or a changed input
/// shape invalidates it) and reused verbatim by the matched backward call,
/// so forward and backward see the identical pattern. In inference mode the
/// operator is the identity in both directions.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
    mask: Option<Tensor>,
    mask_step: u64,
}

impl Dropout {
    pub(crate) fn new(rate: f32) -> Self {
        assert!(
            rate > 0.0 && rate < 1.0,
            "expecting drop rate within (0, 1), but got {}",
            rate
        );
        Self {
            rate,
            mask: None,
            mask_step: 0,
        }
    }

    pub(crate) fn forward(&mut self, input: &Tensor, ctx: &EvalCtx) -> Tensor {
        if !ctx.is_training() {
            return input.clone();
        }

        let stale = self.mask_step != ctx.step
            || self
                .mask
                .as_ref()
                .map_or(true, |m| m.shape() != input.shape());
        if stale {
            let rate = self.rate;
            let random = Tensor::random_standard(input.shape());
            self.mask = Some(random.map(|v| if v > rate { 1.0 } else { 0.0 }));
            self.mask_step = ctx.step;
        }

        let mask = self.mask.as_ref().expect("mask drawn above");
        // kept activations are rescaled to preserve the expected magnitude
        input.mul(mask).scale(1.0 / (1.0 - self.rate))
    }

    pub(crate) fn backward(&self, grad: &Tensor, ctx: &EvalCtx) -> Tensor {
        if !ctx.is_training() {
            return grad.clone();
        }
        let mask = self
            .mask
            .as_ref()
            .expect("dropout backward before any forward pass");
        grad.mul(mask)
    }
}

/// Dropout node with drop probability `rate`.
pub fn drop_out(arg: impl Into<Node>, rate: f32) -> Node {
    Node::unary(UnaryKind::Dropout(Dropout::new(rate)), arg)
}
