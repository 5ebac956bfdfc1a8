//! Tests for the layer builders.

use super::*;
use crate::session::Session;
use approx::assert_abs_diff_eq;

#[test]
fn test_dense_output_shape_and_parameter_count() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = Dense::new(4, 3).apply(&mut graph, x);
    assert_eq!(graph.param_count(), 2); // kernel + bias

    let mut session = Session::new(graph);
    session.bind(x, Tensor::ones(&[2, 4]));
    let out = session.forward(&mut y);
    assert_eq!(out.shape(), &[2, 3]);
}

#[test]
fn test_dense_without_bias_keeps_bias_frozen() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = Dense::new(2, 2).use_bias(false).apply(&mut graph, x);
    let bias = graph.param_ids().nth(1).unwrap();
    assert!(!graph.is_trainable(bias));

    let mut session = Session::new(graph);
    session.bind(x, Tensor::ones(&[1, 2]));
    session.run_backward(&mut y);

    // the frozen zero bias ignores the gradient entirely
    assert_eq!(session.graph().value(bias).as_slice(), &[0.0, 0.0]);
    assert_eq!(session.graph().grad(bias).as_slice(), &[0.0, 0.0]);
}

#[test]
fn test_dense_kernel_receives_gradient() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = Dense::new(2, 1).apply(&mut graph, x);
    let kernel = graph.param_ids().next().unwrap();

    let mut session = Session::new(graph);
    session.bind(x, Tensor::from_vec(&[1, 2], vec![1.0, 2.0]));
    session.run_backward(&mut y);

    // dW = x^T . g
    assert_eq!(session.graph().grad(kernel).as_slice(), &[1.0, 2.0]);
}

#[test]
fn test_conv2d_layer_same_padding_shape() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = Conv2D::new(8, (3, 3), (5, 5, 3))
        .padding(Padding::Same)
        .apply(&mut graph, x);

    let mut session = Session::new(graph);
    session.bind(x, Tensor::ones(&[2, 5, 5, 3]));
    let out = session.forward(&mut y);
    assert_eq!(out.shape(), &[2, 5, 5, 8]);
}

#[test]
fn test_conv2d_layer_valid_padding_shape() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = Conv2D::new(4, (3, 3), (6, 6, 1)).apply(&mut graph, x);

    let mut session = Session::new(graph);
    session.bind(x, Tensor::ones(&[1, 6, 6, 1]));
    let out = session.forward(&mut y);
    assert_eq!(out.shape(), &[1, 4, 4, 4]);
}

#[test]
fn test_conv2d_transpose_layer_upsamples() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = Conv2DTranspose::new(2, (3, 3), (3, 3, 4))
        .strides((2, 2))
        .apply(&mut graph, x);

    let mut session = Session::new(graph);
    session.bind(x, Tensor::ones(&[1, 3, 3, 4]));
    let out = session.forward(&mut y);
    // (3-1)*2 + 3 = 7
    assert_eq!(out.shape(), &[1, 7, 7, 2]);
}

#[test]
fn test_batch_normalization_layer_learns_scale_and_shift() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = BatchNormalization::new(2).apply(&mut graph, x);
    assert_eq!(graph.param_count(), 2); // gamma + beta

    let mut session = Session::new(graph);
    session.bind(
        x,
        Tensor::from_vec(&[4, 2], vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]),
    );
    let out = session.run_backward(&mut y);
    assert_eq!(out.shape(), &[4, 2]);

    // with gamma = 1 and beta = 0 the output is the normalized input
    for ch in 0..2 {
        let mean: f32 = out.as_slice().iter().skip(ch).step_by(2).sum::<f32>() / 4.0;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-4);
    }

    // beta's gradient is the channel sum of the upstream ones
    let beta = session.graph().param_ids().nth(1).unwrap();
    assert_eq!(session.graph().grad(beta).as_slice(), &[4.0, 4.0]);
}

#[test]
fn test_pooling_and_flatten_layers_compose() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let pooled = max_pooling_2d(x, 2);
    let mut y = flatten(pooled);

    let mut session = Session::new(graph);
    session.bind(x, Tensor::ones(&[2, 4, 4, 3]));
    let out = session.forward(&mut y);
    assert_eq!(out.shape(), &[2, 12]);
}

#[test]
fn test_dropout_layer_is_identity_when_evaluating() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = dropout(x, 0.5);

    let mut session = Session::new(graph);
    session.eval();
    session.bind(x, Tensor::from_vec(&[2], vec![3.0, -4.0]));
    let out = session.forward(&mut y);
    assert_eq!(out.as_slice(), &[3.0, -4.0]);
}

#[test]
fn test_reshape_layer_round_trip() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let mut y = reshape(x, &[2, 2], true);

    let mut session = Session::new(graph);
    session.bind(x, Tensor::ones(&[3, 4]));
    let out = session.forward(&mut y);
    assert_eq!(out.shape(), &[3, 2, 2]);
}

#[test]
fn test_regularized_dense_adds_weight_decay() {
    let mut graph = Graph::new();
    let x = input(&mut graph);
    let layer = Dense::new(1, 1).kernel_regularizer(Regularizer::new(0.0, 0.5));
    let mut y = layer.apply(&mut graph, x);
    let kernel = graph.param_ids().next().unwrap();
    let w0 = graph.value(kernel).as_slice()[0];

    let mut session = Session::new(graph);
    session.bind(x, Tensor::from_vec(&[1, 1], vec![1.0]));
    session.run_backward(&mut y);

    // grad = x + 2 * l2 * w
    let expected = 1.0 + 2.0 * 0.5 * w0;
    assert_abs_diff_eq!(
        session.graph().grad(kernel).as_slice()[0],
        expected,
        epsilon = 1e-5
    );
}
