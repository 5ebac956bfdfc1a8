//! Graph nodes: the closed variant set over leaves and operators, and the
//! unary/binary operator composer.
//!
//! Ownership discipline on edges is explicit: a nested operator is owned by
//! value by its parent (each parent evaluates its own private copy of a
//! sub-expression), while a leaf is embedded as a copyable arena id so that
//! any number of parents observe the same bound input or parameter. The
//! `From` conversions below are the node-reference normalizer: they decide
//! the edge representation from the operand's category alone.

use crate::graph::{ConstId, EvalCtx, Graph, InputId, LeafRef, ParamId};
use crate::ops::{BinaryKind, UnaryKind};
use crate::tensor::Tensor;

/// One node of the expression graph.
#[derive(Debug, Clone)]
pub enum Node {
    /// Shared reference to a leaf in the graph arena.
    Leaf(LeafRef),
    /// Owned unary operator.
    Unary(Box<UnaryNode>),
    /// Owned binary operator.
    Binary(Box<BinaryNode>),
}

/// Unary operator node: one operand edge, the operator rule, and the cached
/// input/output of the latest forward call.
#[derive(Debug, Clone)]
pub struct UnaryNode {
    pub(crate) kind: UnaryKind,
    pub(crate) arg: Node,
    pub(crate) input: Option<Tensor>,
    pub(crate) output: Option<Tensor>,
}

/// Binary operator node: two operand edges, the operator rule, and the
/// cached inputs/output of the latest forward call.
#[derive(Debug, Clone)]
pub struct BinaryNode {
    pub(crate) kind: BinaryKind,
    pub(crate) lhs: Node,
    pub(crate) rhs: Node,
    pub(crate) lhs_input: Option<Tensor>,
    pub(crate) rhs_input: Option<Tensor>,
    pub(crate) output: Option<Tensor>,
}

impl Node {
    /// Compose a unary operator over an operand.
    pub fn unary(kind: UnaryKind, arg: impl Into<Node>) -> Node {
        Node::Unary(Box::new(UnaryNode {
            kind,
            arg: arg.into(),
            input: None,
            output: None,
        }))
    }

    /// Compose a binary operator over two operands.
    pub fn binary(kind: BinaryKind, lhs: impl Into<Node>, rhs: impl Into<Node>) -> Node {
        Node::Binary(Box::new(BinaryNode {
            kind,
            lhs: lhs.into(),
            rhs: rhs.into(),
            lhs_input: None,
            rhs_input: None,
            output: None,
        }))
    }

    /// Forward pass: recursively pull operands, apply the operator rule,
    /// cache inputs and output, return the output.
    ///
    /// Calling forward twice recomputes; there is no memoization across
    /// calls, so a rebound input is always observed.
    pub fn forward(&mut self, graph: &mut Graph, ctx: &EvalCtx) -> Tensor {
        match self {
            Node::Leaf(leaf) => graph.leaf_forward(*leaf),
            Node::Unary(node) => node.forward(graph, ctx),
            Node::Binary(node) => node.forward(graph, ctx),
        }
    }

    /// Backward pass: apply the operator's backward rule to the cached
    /// tensors of the latest forward call and push one gradient per operand
    /// down the graph until it reaches the leaves.
    ///
    /// Must run after a forward pass in the same evaluation cycle; the
    /// session is responsible for the sequencing.
    pub fn backward(&mut self, graph: &mut Graph, ctx: &EvalCtx, grad: &Tensor) {
        match self {
            Node::Leaf(leaf) => graph.leaf_backward(*leaf, grad),
            Node::Unary(node) => node.backward(graph, ctx, grad),
            Node::Binary(node) => node.backward(graph, ctx, grad),
        }
    }
}

impl UnaryNode {
    fn forward(&mut self, graph: &mut Graph, ctx: &EvalCtx) -> Tensor {
        let input = self.arg.forward(graph, ctx);
        let output = self.kind.forward(&input, ctx);
        self.input = Some(input);
        self.output = Some(output.clone());
        output
    }

    fn backward(&mut self, graph: &mut Graph, ctx: &EvalCtx, grad: &Tensor) {
        let input = self
            .input
            .as_ref()
            .expect("backward called before any forward pass");
        let output = self
            .output
            .as_ref()
            .expect("backward called before any forward pass");
        let down = self.kind.backward(input, output, grad, ctx);
        self.arg.backward(graph, ctx, &down);
    }
}

impl BinaryNode {
    fn forward(&mut self, graph: &mut Graph, ctx: &EvalCtx) -> Tensor {
        let lhs_input = self.lhs.forward(graph, ctx);
        let rhs_input = self.rhs.forward(graph, ctx);
        let output = self.kind.forward(&lhs_input, &rhs_input);
        self.lhs_input = Some(lhs_input);
        self.rhs_input = Some(rhs_input);
        self.output = Some(output.clone());
        output
    }

    fn backward(&mut self, graph: &mut Graph, ctx: &EvalCtx, grad: &Tensor) {
        let lhs_input = self
            .lhs_input
            .as_ref()
            .expect("backward called before any forward pass");
        let rhs_input = self
            .rhs_input
            .as_ref()
            .expect("backward called before any forward pass");
        let output = self
            .output
            .as_ref()
            .expect("backward called before any forward pass");
        let (lhs_grad, rhs_grad) = self.kind.backward(lhs_input, rhs_input, output, grad);
        self.lhs.backward(graph, ctx, &lhs_grad);
        self.rhs.backward(graph, ctx, &rhs_grad);
    }
}

// === Node-reference normalizer ===

impl From<LeafRef> for Node {
    fn from(leaf: LeafRef) -> Node {
        Node::Leaf(leaf)
    }
}

impl From<InputId> for Node {
    fn from(id: InputId) -> Node {
        Node::Leaf(LeafRef::Input(id))
    }
}

impl From<ParamId> for Node {
    fn from(id: ParamId) -> Node {
        Node::Leaf(LeafRef::Param(id))
    }
}

impl From<ConstId> for Node {
    fn from(id: ConstId) -> Node {
        Node::Leaf(LeafRef::Const(id))
    }
}

// === Operator overloads ===
//
// `*` is the matrix product, as in the expression builders `plus`, `minus`
// and `matmul`. Elementwise multiplication is `hadamard_product`.

impl<R: Into<Node>> std::ops::Add<R> for Node {
    type Output = Node;
    fn add(self, rhs: R) -> Node {
        crate::ops::plus(self, rhs)
    }
}

impl<R: Into<Node>> std::ops::Sub<R> for Node {
    type Output = Node;
    fn sub(self, rhs: R) -> Node {
        crate::ops::minus(self, rhs)
    }
}

impl<R: Into<Node>> std::ops::Mul<R> for Node {
    type Output = Node;
    fn mul(self, rhs: R) -> Node {
        crate::ops::matmul(self, rhs)
    }
}

impl std::ops::Neg for Node {
    type Output = Node;
    fn neg(self) -> Node {
        crate::ops::negative(self)
    }
}

macro_rules! leaf_operator_overloads {
    ($($id:ty),*) => {$(
        impl<R: Into<Node>> std::ops::Add<R> for $id {
            type Output = Node;
            fn add(self, rhs: R) -> Node {
                crate::ops::plus(self, rhs)
            }
        }

        impl<R: Into<Node>> std::ops::Sub<R> for $id {
            type Output = Node;
            fn sub(self, rhs: R) -> Node {
                crate::ops::minus(self, rhs)
            }
        }

        impl<R: Into<Node>> std::ops::Mul<R> for $id {
            type Output = Node;
            fn mul(self, rhs: R) -> Node {
                crate::ops::matmul(self, rhs)
            }
        }

        impl std::ops::Neg for $id {
            type Output = Node;
            fn neg(self) -> Node {
                crate::ops::negative(self)
            }
        }
    )*};
}

leaf_operator_overloads!(InputId, ParamId, ConstId, LeafRef);
