//! Stochastic gradient descent with optional momentum.

use super::Optimizer;
use crate::graph::Graph;
use crate::tensor::Tensor;

/// SGD optimizer. The accumulated gradient is divided by the batch size
/// before it is applied, so one backward pass over a whole batch behaves
/// like an averaged update.
pub struct Sgd {
    lr: f32,
    momentum: f32,
    batch_size: usize,
    velocities: Vec<Option<Tensor>>,
}

impl Sgd {
    /// Create a new SGD optimizer.
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            batch_size: 1,
            velocities: Vec::new(),
        }
    }

    /// Declare the batch size used to normalize accumulated gradients.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        assert!(batch_size > 0, "expecting batch size larger than 0");
        self.batch_size = batch_size;
        self
    }

    fn ensure_velocities(&mut self, count: usize) {
        if self.velocities.len() != count {
            self.velocities = (0..count).map(|_| None).collect();
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, graph: &mut Graph) {
        self.ensure_velocities(graph.param_count());
        let scale = 1.0 / self.batch_size as f32;

        for id in graph.param_ids().collect::<Vec<_>>() {
            if !graph.is_trainable(id) {
                continue;
            }
            let grad = graph.grad(id).scale(scale);

            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let velocity = match &self.velocities[id.index()] {
                    Some(v) => {
                        let mut v = v.scale(self.momentum);
                        v.scaled_add(-self.lr, &grad);
                        v
                    }
                    None => grad.scale(-self.lr),
                };
                graph.value_mut(id).add_assign(&velocity);
                self.velocities[id.index()] = Some(velocity);
            } else {
                graph.value_mut(id).scaled_add(-self.lr, &grad);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
