//! Optimizer trait

use crate::graph::Graph;

/// Trait for optimization algorithms over a graph's parameters.
pub trait Optimizer {
    /// Perform a single optimization step from the accumulated gradients.
    fn step(&mut self, graph: &mut Graph);

    /// Zero out all accumulated gradients.
    fn zero_grad(&mut self, graph: &mut Graph) {
        graph.zero_all_grads();
    }

    /// Get learning rate.
    fn lr(&self) -> f32;

    /// Set learning rate.
    fn set_lr(&mut self, lr: f32);
}
