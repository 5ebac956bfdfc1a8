//! Adam optimizer.

use super::Optimizer;
use crate::graph::Graph;
use crate::tensor::Tensor;

/// Adam with bias-corrected first and second moment estimates.
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    first_moments: Vec<Option<Tensor>>,
    second_moments: Vec<Option<Tensor>>,
}

impl Adam {
    /// Create Adam with the conventional defaults for the moment decays.
    pub fn new(lr: f32) -> Self {
        Self::with_betas(lr, 0.9, 0.999, 1.0e-8)
    }

    pub fn with_betas(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        assert!(beta1 > 0.0 && beta1 < 1.0, "expecting beta1 within (0, 1)");
        assert!(beta2 > 0.0 && beta2 < 1.0, "expecting beta2 within (0, 1)");
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            first_moments: Vec::new(),
            second_moments: Vec::new(),
        }
    }

    fn ensure_moments(&mut self, count: usize) {
        if self.first_moments.len() != count {
            self.first_moments = (0..count).map(|_| None).collect();
            self.second_moments = (0..count).map(|_| None).collect();
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, graph: &mut Graph) {
        self.ensure_moments(graph.param_count());
        self.t += 1;
        let correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for id in graph.param_ids().collect::<Vec<_>>() {
            if !graph.is_trainable(id) {
                continue;
            }
            let grad = graph.grad(id).clone();

            let m = {
                let prev = self.first_moments[id.index()]
                    .take()
                    .unwrap_or_else(|| Tensor::zeros_like(&grad));
                let mut m = prev.scale(self.beta1);
                m.scaled_add(1.0 - self.beta1, &grad);
                m
            };
            let v = {
                let prev = self.second_moments[id.index()]
                    .take()
                    .unwrap_or_else(|| Tensor::zeros_like(&grad));
                let mut v = prev.scale(self.beta2);
                v.scaled_add(1.0 - self.beta2, &grad.map(|g| g * g));
                v
            };

            let lr = self.lr;
            let epsilon = self.epsilon;
            let update = {
                let m_hat = m.scale(1.0 / correction1);
                let v_hat = v.scale(1.0 / correction2);
                m_hat.div(&v_hat.map(|x| x.sqrt() + epsilon)).scale(-lr)
            };
            graph.value_mut(id).add_assign(&update);

            self.first_moments[id.index()] = Some(m);
            self.second_moments[id.index()] = Some(v);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
