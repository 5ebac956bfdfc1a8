//! The expression graph's leaf arena and evaluation context.
//!
//! Leaves live in a [`Graph`] and are addressed by typed, copyable ids;
//! operator nodes reference them by id so that several parents can share one
//! parameter or input slot without duplicating its state. The
//! training/inference flag and the evaluation-cycle counter travel in an
//! explicit [`EvalCtx`] instead of process-wide state.

mod node;

#[cfg(test)]
mod tests;

pub use node::{BinaryNode, Node, UnaryNode};

use crate::tensor::Tensor;

/// Handle to a bound-input leaf (a slot the session fills before forward).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputId(pub(crate) usize);

/// Handle to a trainable parameter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub(crate) usize);

impl ParamId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Handle to an immutable constant leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstId(pub(crate) usize);

/// A by-reference edge into the leaf arena.
///
/// Operator nodes embed leaves through this id rather than by value, so a
/// leaf bound or updated after graph construction is observed by every
/// parent that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafRef {
    Input(InputId),
    Param(ParamId),
    Const(ConstId),
}

/// Trainable parameter: a value, its accumulated gradient, and optional
/// L1/L2 regularization coefficients.
#[derive(Debug, Clone)]
pub struct Param {
    value: Tensor,
    grad: Tensor,
    l1: f32,
    l2: f32,
    trainable: bool,
}

/// Training or inference, as seen by stochastic and normalizing operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Inference,
}

/// Per-cycle evaluation context threaded through every forward and backward
/// call. `step` increases once per forward pass, so stateful operators can
/// tell a new cycle from the matched backward call of the current one.
#[derive(Debug, Clone, Copy)]
pub struct EvalCtx {
    pub mode: Mode,
    pub step: u64,
}

impl EvalCtx {
    pub fn new(mode: Mode, step: u64) -> Self {
        Self { mode, step }
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Train
    }
}

/// Arena owning every leaf of one expression graph.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    inputs: Vec<Option<Tensor>>,
    params: Vec<Param>,
    consts: Vec<Tensor>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an input slot. It holds no tensor until [`Graph::bind`].
    pub fn input(&mut self) -> InputId {
        self.inputs.push(None);
        InputId(self.inputs.len() - 1)
    }

    /// Allocate a trainable parameter with no regularization.
    pub fn parameter(&mut self, value: Tensor) -> ParamId {
        self.parameter_with(value, 0.0, 0.0, true)
    }

    /// Allocate a parameter with L1/L2 regularization coefficients and a
    /// trainability flag. A non-trainable parameter ignores every gradient
    /// sent to it.
    pub fn parameter_with(&mut self, value: Tensor, l1: f32, l2: f32, trainable: bool) -> ParamId {
        let grad = Tensor::zeros_like(&value);
        self.params.push(Param {
            value,
            grad,
            l1,
            l2,
            trainable,
        });
        ParamId(self.params.len() - 1)
    }

    /// Allocate an immutable constant.
    pub fn constant(&mut self, value: Tensor) -> ConstId {
        self.consts.push(value);
        ConstId(self.consts.len() - 1)
    }

    /// Bind a tensor to an input slot, replacing any previous binding.
    pub fn bind(&mut self, id: InputId, value: Tensor) {
        self.inputs[id.0] = Some(value);
    }

    /// Tensor currently bound to an input slot, if any.
    pub fn bound(&self, id: InputId) -> Option<&Tensor> {
        self.inputs[id.0].as_ref()
    }

    /// Current value of a parameter.
    pub fn value(&self, id: ParamId) -> &Tensor {
        &self.params[id.0].value
    }

    /// Mutable value of a parameter (used by optimizers).
    pub fn value_mut(&mut self, id: ParamId) -> &mut Tensor {
        &mut self.params[id.0].value
    }

    /// Accumulated gradient of a parameter.
    pub fn grad(&self, id: ParamId) -> &Tensor {
        &self.params[id.0].grad
    }

    /// Whether a parameter receives gradient updates.
    pub fn is_trainable(&self, id: ParamId) -> bool {
        self.params[id.0].trainable
    }

    /// Zero one parameter's accumulated gradient.
    pub fn zero_grad(&mut self, id: ParamId) {
        self.params[id.0].grad.fill(0.0);
    }

    /// Zero every parameter's accumulated gradient.
    pub fn zero_all_grads(&mut self) {
        for param in &mut self.params {
            param.grad.fill(0.0);
        }
    }

    /// Number of parameters in the arena.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Ids of all parameters, in allocation order.
    pub fn param_ids(&self) -> impl Iterator<Item = ParamId> {
        (0..self.params.len()).map(ParamId)
    }

    /// Replace a parameter's value. The new tensor must match the existing
    /// shape; the gradient buffer is preserved.
    pub fn set_value(&mut self, id: ParamId, value: Tensor) {
        let param = &mut self.params[id.0];
        assert_eq!(
            param.value.shape(),
            value.shape(),
            "parameter value replaced with a different shape"
        );
        param.value = value;
    }

    /// Leaf side of the forward pass.
    pub(crate) fn leaf_forward(&self, leaf: LeafRef) -> Tensor {
        match leaf {
            LeafRef::Input(id) => self.inputs[id.0]
                .clone()
                .unwrap_or_else(|| panic!("input slot {} evaluated before bind", id.0)),
            LeafRef::Param(id) => self.params[id.0].value.clone(),
            LeafRef::Const(id) => self.consts[id.0].clone(),
        }
    }

    /// Leaf side of the backward pass. Inputs and constants absorb the
    /// gradient silently; a trainable parameter accumulates it together
    /// with its regularization contribution.
    pub(crate) fn leaf_backward(&mut self, leaf: LeafRef, grad: &Tensor) {
        let id = match leaf {
            LeafRef::Param(id) => id,
            LeafRef::Input(_) | LeafRef::Const(_) => return,
        };
        let param = &mut self.params[id.0];
        if !param.trainable {
            return;
        }
        assert_eq!(
            param.value.shape(),
            grad.shape(),
            "gradient shape {:?} does not match parameter shape {:?}",
            grad.shape(),
            param.value.shape()
        );
        param.grad.add_assign(grad);
        if param.l1 != 0.0 {
            let sign = param
                .value
                .map(|v| if v > 0.0 { 1.0 } else if v < 0.0 { -1.0 } else { 0.0 });
            param.grad.scaled_add(param.l1, &sign);
        }
        if param.l2 != 0.0 {
            let value = param.value.clone();
            param.grad.scaled_add(2.0 * param.l2, &value);
        }
    }
}
