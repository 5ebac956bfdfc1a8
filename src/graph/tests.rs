//! Tests for the leaf arena and the node composer.

use super::*;
use crate::ops::{hadamard_product, plus};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

fn train_ctx() -> EvalCtx {
    EvalCtx::new(Mode::Train, 1)
}

#[test]
fn test_constant_forward_returns_value() {
    let mut graph = Graph::new();
    let c = graph.constant(Tensor::from_vec(&[2], vec![1.0, 2.0]));
    let mut node = Node::from(c);
    let out = node.forward(&mut graph, &train_ctx());
    assert_eq!(out.as_slice(), &[1.0, 2.0]);
}

#[test]
fn test_input_forward_observes_latest_binding() {
    let mut graph = Graph::new();
    let x = graph.input();
    let mut node = Node::from(x);

    graph.bind(x, Tensor::from_vec(&[2], vec![1.0, 1.0]));
    assert_eq!(node.forward(&mut graph, &train_ctx()).as_slice(), &[1.0, 1.0]);

    graph.bind(x, Tensor::from_vec(&[2], vec![5.0, 6.0]));
    assert_eq!(node.forward(&mut graph, &train_ctx()).as_slice(), &[5.0, 6.0]);
}

#[test]
#[should_panic(expected = "evaluated before bind")]
fn test_unbound_input_fails_fast() {
    let mut graph = Graph::new();
    let x = graph.input();
    let mut node = Node::from(x);
    node.forward(&mut graph, &train_ctx());
}

#[test]
fn test_parameter_gradient_accumulates_across_backward_calls() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[2], vec![1.0, 2.0]));
    let mut node = Node::from(w);
    let ctx = train_ctx();

    node.forward(&mut graph, &ctx);
    node.backward(&mut graph, &ctx, &Tensor::from_vec(&[2], vec![1.0, 1.0]));
    assert_eq!(graph.grad(w).as_slice(), &[1.0, 1.0]);

    node.backward(&mut graph, &ctx, &Tensor::from_vec(&[2], vec![0.5, 0.5]));
    assert_eq!(graph.grad(w).as_slice(), &[1.5, 1.5]);

    graph.zero_grad(w);
    assert_eq!(graph.grad(w).as_slice(), &[0.0, 0.0]);
}

#[test]
fn test_non_trainable_parameter_ignores_gradients() {
    let mut graph = Graph::new();
    let w = graph.parameter_with(Tensor::from_vec(&[2], vec![1.0, 2.0]), 0.0, 0.0, false);
    let mut node = Node::from(w);
    let ctx = train_ctx();

    node.forward(&mut graph, &ctx);
    node.backward(&mut graph, &ctx, &Tensor::from_vec(&[2], vec![3.0, 3.0]));
    assert_eq!(graph.grad(w).as_slice(), &[0.0, 0.0]);
}

#[test]
fn test_input_and_constant_ignore_gradients() {
    let mut graph = Graph::new();
    let x = graph.input();
    let c = graph.constant(Tensor::from_vec(&[2], vec![1.0, 1.0]));
    graph.bind(x, Tensor::from_vec(&[2], vec![2.0, 2.0]));

    let mut node = plus(x, c);
    let ctx = train_ctx();
    node.forward(&mut graph, &ctx);
    // reaches both leaves without touching any state
    node.backward(&mut graph, &ctx, &Tensor::from_vec(&[2], vec![1.0, 1.0]));
}

#[test]
fn test_l2_regularization_contributes_to_gradient() {
    let mut graph = Graph::new();
    let w = graph.parameter_with(Tensor::from_vec(&[2], vec![1.0, -2.0]), 0.0, 0.1, true);
    let mut node = Node::from(w);
    let ctx = train_ctx();

    node.forward(&mut graph, &ctx);
    node.backward(&mut graph, &ctx, &Tensor::from_vec(&[2], vec![1.0, 1.0]));
    // grad = g + 2 * l2 * w
    let grad = graph.grad(w);
    assert_abs_diff_eq!(grad.as_slice()[0], 1.0 + 0.2);
    assert_abs_diff_eq!(grad.as_slice()[1], 1.0 - 0.4);
}

#[test]
fn test_l1_regularization_contributes_sign() {
    let mut graph = Graph::new();
    let w = graph.parameter_with(Tensor::from_vec(&[3], vec![2.0, -3.0, 0.0]), 0.5, 0.0, true);
    let mut node = Node::from(w);
    let ctx = train_ctx();

    node.forward(&mut graph, &ctx);
    node.backward(&mut graph, &ctx, &Tensor::zeros(&[3]));
    let grad = graph.grad(w);
    assert_abs_diff_eq!(grad.as_slice()[0], 0.5);
    assert_abs_diff_eq!(grad.as_slice()[1], -0.5);
    assert_abs_diff_eq!(grad.as_slice()[2], 0.0);
}

#[test]
fn test_shared_leaf_receives_gradient_from_every_parent() {
    // y = w + w: both edges reference the same arena slot, so the
    // gradient arrives twice.
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[2], vec![1.0, 2.0]));
    let mut node = plus(w, w);
    let ctx = train_ctx();

    let out = node.forward(&mut graph, &ctx);
    assert_eq!(out.as_slice(), &[2.0, 4.0]);

    node.backward(&mut graph, &ctx, &Tensor::from_vec(&[2], vec![1.0, 1.0]));
    assert_eq!(graph.grad(w).as_slice(), &[2.0, 2.0]);
}

#[test]
fn test_cloned_operator_is_a_private_copy() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[1], vec![3.0]));
    let base = hadamard_product(w, w);
    let mut left = base.clone();
    let mut right = base;
    let ctx = train_ctx();

    // both copies evaluate independently against the shared leaf
    assert_eq!(left.forward(&mut graph, &ctx).as_slice(), &[9.0]);
    assert_eq!(right.forward(&mut graph, &ctx).as_slice(), &[9.0]);
}

#[test]
fn test_forward_recomputes_without_memoization() {
    let mut graph = Graph::new();
    let x = graph.input();
    let c = graph.constant(Tensor::from_vec(&[1], vec![10.0]));
    let mut node = plus(x, c);
    let ctx = train_ctx();

    graph.bind(x, Tensor::from_vec(&[1], vec![1.0]));
    assert_eq!(node.forward(&mut graph, &ctx).as_slice(), &[11.0]);

    graph.bind(x, Tensor::from_vec(&[1], vec![2.0]));
    assert_eq!(node.forward(&mut graph, &ctx).as_slice(), &[12.0]);
}

#[test]
#[should_panic(expected = "backward called before any forward pass")]
fn test_backward_before_forward_fails_fast() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[1], vec![1.0]));
    let mut node = plus(w, w);
    node.backward(&mut graph, &train_ctx(), &Tensor::ones(&[1]));
}

#[test]
fn test_operator_overloads_build_the_same_graph() {
    // `*` is the matrix product; `+` broadcasts
    let mut graph = Graph::new();
    let x = graph.input();
    let w = graph.parameter(Tensor::from_vec(&[2, 1], vec![3.0, 4.0]));
    let b = graph.parameter(Tensor::zeros(&[1, 1]));
    let mut y = x * w + b;

    graph.bind(x, Tensor::from_vec(&[1, 2], vec![1.0, 2.0]));
    let out = y.forward(&mut graph, &train_ctx());
    assert_eq!(out.as_slice(), &[11.0]);

    let mut negated = -(x * w);
    let out = negated.forward(&mut graph, &train_ctx());
    assert_eq!(out.as_slice(), &[-11.0]);
}

#[test]
fn test_set_value_preserves_gradient_buffer() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[2], vec![1.0, 2.0]));
    let mut node = Node::from(w);
    let ctx = train_ctx();
    node.forward(&mut graph, &ctx);
    node.backward(&mut graph, &ctx, &Tensor::ones(&[2]));

    graph.set_value(w, Tensor::from_vec(&[2], vec![7.0, 8.0]));
    assert_eq!(graph.value(w).as_slice(), &[7.0, 8.0]);
    assert_eq!(graph.grad(w).as_slice(), &[1.0, 1.0]);
}
