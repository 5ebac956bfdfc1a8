//! Tests for the optimizers.

use super::*;
use crate::graph::Graph;
use crate::loss::squared_loss;
use crate::session::Session;
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

#[test]
fn test_sgd_steps_against_the_gradient() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[1], vec![1.0]));
    let target = graph.constant(Tensor::from_vec(&[1], vec![3.0]));
    let mut loss = squared_loss(w, target);

    let mut session = Session::new(graph);
    session.run_backward(&mut loss);

    // d(w-3)^2/dw at w=1 is -4; a step of lr 0.1 moves w to 1.4
    let mut sgd = Sgd::new(0.1, 0.0);
    sgd.step(session.graph_mut());
    assert_abs_diff_eq!(session.graph().value(w).scalar_value(), 1.4, epsilon = 1e-5);
}

#[test]
fn test_sgd_batch_size_scales_the_update() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[1], vec![1.0]));
    let target = graph.constant(Tensor::from_vec(&[1], vec![3.0]));
    let mut loss = squared_loss(w, target);

    let mut session = Session::new(graph);
    session.run_backward(&mut loss);

    let mut sgd = Sgd::new(0.1, 0.0).batch_size(4);
    sgd.step(session.graph_mut());
    assert_abs_diff_eq!(session.graph().value(w).scalar_value(), 1.1, epsilon = 1e-5);
}

#[test]
fn test_sgd_momentum_accumulates_velocity() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[1], vec![0.0]));
    let mut sgd = Sgd::new(1.0, 0.5);

    // two identical unit gradients: the second step moves further
    let before = {
        let mut node = crate::graph::Node::from(w);
        let mut session = Session::new(graph);
        session.forward(&mut node);
        session.backward(&mut node, &Tensor::ones(&[1]));
        sgd.step(session.graph_mut());
        let after_first = session.graph().value(w).scalar_value();

        sgd.zero_grad(session.graph_mut());
        session.forward(&mut node);
        session.backward(&mut node, &Tensor::ones(&[1]));
        sgd.step(session.graph_mut());
        (after_first, session.graph().value(w).scalar_value())
    };

    // step 1: v = -1, w = -1; step 2: v = -1.5, w = -2.5
    assert_abs_diff_eq!(before.0, -1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(before.1, -2.5, epsilon = 1e-5);
}

#[test]
fn test_sgd_skips_frozen_parameters() {
    let mut graph = Graph::new();
    let w = graph.parameter_with(Tensor::from_vec(&[1], vec![1.0]), 0.0, 0.0, false);
    graph.zero_all_grads();

    let mut sgd = Sgd::new(0.1, 0.0);
    sgd.step(&mut graph);
    assert_abs_diff_eq!(graph.value(w).scalar_value(), 1.0);
}

#[test]
fn test_adam_moves_toward_the_minimum() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[1], vec![5.0]));
    let target = graph.constant(Tensor::from_vec(&[1], vec![0.0]));
    let mut loss = squared_loss(w, target);

    let mut session = Session::new(graph);
    let mut adam = Adam::new(0.1);

    let initial = session.run_backward(&mut loss).scalar_value();
    adam.step(session.graph_mut());
    adam.zero_grad(session.graph_mut());

    for _ in 0..50 {
        session.run_backward(&mut loss);
        adam.step(session.graph_mut());
        adam.zero_grad(session.graph_mut());
    }
    let last = session.run(&mut loss).scalar_value();
    assert!(last < initial, "loss went from {} to {}", initial, last);
    assert!(session.graph().value(w).scalar_value().abs() < 5.0);
}

#[test]
fn test_zero_grad_clears_accumulated_gradients() {
    let mut graph = Graph::new();
    let w = graph.parameter(Tensor::from_vec(&[2], vec![1.0, 2.0]));
    let mut node = crate::graph::Node::from(w);

    let mut session = Session::new(graph);
    session.forward(&mut node);
    session.backward(&mut node, &Tensor::ones(&[2]));
    assert_eq!(session.graph().grad(w).as_slice(), &[1.0, 1.0]);

    let mut sgd = Sgd::new(0.1, 0.0);
    sgd.zero_grad(session.graph_mut());
    assert_eq!(session.graph().grad(w).as_slice(), &[0.0, 0.0]);
}

#[test]
fn test_learning_rate_accessors() {
    let mut sgd = Sgd::new(0.1, 0.0);
    assert_abs_diff_eq!(sgd.lr(), 0.1);
    sgd.set_lr(0.01);
    assert_abs_diff_eq!(sgd.lr(), 0.01);

    let mut adam = Adam::new(0.001);
    assert_abs_diff_eq!(adam.lr(), 0.001);
    adam.set_lr(0.1);
    assert_abs_diff_eq!(adam.lr(), 0.1);
}
