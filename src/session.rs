//! Evaluation driver: owns the graph, the training/inference mode and the
//! cycle counter, and sequences forward and backward passes.

use crate::graph::{EvalCtx, Graph, InputId, Mode, Node};
use crate::tensor::Tensor;

/// Drives evaluation cycles against one graph.
///
/// A cycle is one [`Session::forward`] on a root node followed by at most
/// one matched [`Session::backward`]. The session is the only place the
/// step counter advances, which is what stateful operators key their
/// per-cycle caches (dropout masks) on.
pub struct Session {
    graph: Graph,
    mode: Mode,
    step: u64,
}

impl Session {
    /// New session in training mode.
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            mode: Mode::Train,
            step: 0,
        }
    }

    /// Switch to training mode.
    pub fn train(&mut self) {
        self.mode = Mode::Train;
    }

    /// Switch to inference mode.
    pub fn eval(&mut self) {
        self.mode = Mode::Inference;
    }

    /// Check if in training mode.
    pub fn is_training(&self) -> bool {
        self.mode == Mode::Train
    }

    /// Borrow the underlying graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutably borrow the underlying graph (input rebinding, optimizers).
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Bind a tensor to an input slot.
    pub fn bind(&mut self, id: InputId, value: Tensor) {
        self.graph.bind(id, value);
    }

    /// Begin a new evaluation cycle and run the forward pass on `root`.
    pub fn forward(&mut self, root: &mut Node) -> Tensor {
        self.step += 1;
        let ctx = EvalCtx::new(self.mode, self.step);
        root.forward(&mut self.graph, &ctx)
    }

    /// Alias for [`Session::forward`].
    pub fn run(&mut self, root: &mut Node) -> Tensor {
        self.forward(root)
    }

    /// Distribute `seed` through the graph within the current cycle,
    /// accumulating into every reachable parameter's gradient buffer.
    /// Must follow a forward pass on the same root.
    pub fn backward(&mut self, root: &mut Node, seed: &Tensor) {
        let ctx = EvalCtx::new(self.mode, self.step);
        root.backward(&mut self.graph, &ctx, seed);
    }

    /// Forward then backward with a ones seed shaped like the output,
    /// returning the output.
    pub fn run_backward(&mut self, root: &mut Node) -> Tensor {
        let output = self.forward(root);
        let seed = Tensor::ones_like(&output);
        self.backward(root, &seed);
        output
    }
}
