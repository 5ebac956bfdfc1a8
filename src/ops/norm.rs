//! Batch normalization with momentum-tracked running statistics.

use crate::graph::{EvalCtx, Node};
use crate::ops::UnaryKind;
use crate::tensor::Tensor;

const EPSILON: f32 = 1.0e-5;

/// Normalizes per channel (the last axis) over all leading axes.
///
/// In training mode the batch statistics normalize the input and are folded
/// into the running statistics with momentum `m`:
/// `running = m * running + (1 - m) * batch`. In inference mode the running
/// statistics normalize instead. Scale and shift (gamma/beta) are not part
/// of this operator; layer builders compose them as ordinary broadcasted
/// parameter leaves.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    momentum: f32,
    running_mean: Option<Tensor>,
    running_var: Option<Tensor>,
    batch_std: Option<Tensor>,
}

impl BatchNorm {
    pub(crate) fn new(momentum: f32) -> Self {
        assert!(
            momentum > 0.0 && momentum < 1.0,
            "expecting batch normalization momentum within (0, 1), but got {}",
            momentum
        );
        Self {
            momentum,
            running_mean: None,
            running_var: None,
            batch_std: None,
        }
    }

    /// Mean over every axis but the last, one value per channel.
    fn channel_mean(t: &Tensor) -> Tensor {
        let ch = *t.shape().last().expect("tensor has at least one axis");
        let groups = (t.len() / ch) as f32;
        let mut sums = vec![0.0f32; ch];
        for (i, &v) in t.as_slice().iter().enumerate() {
            sums[i % ch] += v;
        }
        for v in &mut sums {
            *v /= groups;
        }
        Tensor::from_vec(&[ch], sums)
    }

    fn ensure_running(&mut self, ch: usize) {
        let fresh = self
            .running_mean
            .as_ref()
            .map_or(true, |m| m.shape() != [ch].as_slice());
        if fresh {
            self.running_mean = Some(Tensor::zeros(&[ch]));
            self.running_var = Some(Tensor::ones(&[ch]));
        }
    }

    pub(crate) fn forward(&mut self, input: &Tensor, ctx: &EvalCtx) -> Tensor {
        assert!(
            input.ndim() >= 2,
            "batch normalization expects at least 2 dimensions, got {:?}",
            input.shape()
        );
        let ch = *input.shape().last().expect("shape checked above");
        self.ensure_running(ch);

        if !ctx.is_training() {
            let mean = self.running_mean.as_ref().expect("initialized above");
            let var = self.running_var.as_ref().expect("initialized above");
            return input.sub(mean).div(&var.map(|v| (v + EPSILON).sqrt()));
        }

        let mean = Self::channel_mean(input);
        let centered = input.sub(&mean);
        let var = Self::channel_mean(&centered.map(|v| v * v));
        let std = var.map(|v| (v + EPSILON).sqrt());
        let normalized = centered.div(&std);

        let running_mean = self.running_mean.as_mut().expect("initialized above");
        *running_mean = running_mean.scale(self.momentum);
        running_mean.scaled_add(1.0 - self.momentum, &mean);
        let running_var = self.running_var.as_mut().expect("initialized above");
        *running_var = running_var.scale(self.momentum);
        running_var.scaled_add(1.0 - self.momentum, &var);

        self.batch_std = Some(std);
        normalized
    }

    /// Training-mode gradient through the batch moments, per channel:
    /// `dx = (g - mean(g) - xhat * mean(g * xhat)) / std`, with the means
    /// taken over the batch axes. The cached forward output is exactly
    /// `xhat`.
    pub(crate) fn backward(&self, output: &Tensor, grad: &Tensor, ctx: &EvalCtx) -> Tensor {
        if !ctx.is_training() {
            let var = self
                .running_var
                .as_ref()
                .expect("batch normalization backward before forward");
            return grad.div(&var.map(|v| (v + EPSILON).sqrt()));
        }

        let std = self
            .batch_std
            .as_ref()
            .expect("batch normalization backward before forward");
        let g_mean = Self::channel_mean(grad);
        let gx_mean = Self::channel_mean(&grad.mul(output));
        grad.sub(&g_mean).sub(&output.mul(&gx_mean)).div(std)
    }
}

/// Batch-normalization node (statistics only; compose gamma/beta outside).
pub fn batch_norm(arg: impl Into<Node>, momentum: f32) -> Node {
    Node::unary(UnaryKind::BatchNorm(BatchNorm::new(momentum)), arg)
}
