//! Loss constructors: pure compositions of core operators, so gradients
//! flow through the graph like any other expression.

use crate::graph::Node;
use crate::ops::{
    clip, hadamard_product, log, mean_reduce, minus, negative, one_minus, plus, square, sum_reduce,
};

const PROBABILITY_EPSILON: f32 = 1.0e-7;

/// Sum of squared errors: `sum((prediction - target)^2)`.
pub fn squared_loss(prediction: impl Into<Node>, target: impl Into<Node>) -> Node {
    sum_reduce(square(minus(prediction, target)))
}

/// Mean squared error: `mean((prediction - target)^2)`.
pub fn mse_loss(prediction: impl Into<Node>, target: impl Into<Node>) -> Node {
    mean_reduce(square(minus(prediction, target)))
}

/// Binary cross-entropy over probabilities:
/// `-mean(y*log(p) + (1-y)*log(1-p))`, with `p` clipped away from 0 and 1
/// for numeric safety.
pub fn binary_cross_entropy(prediction: impl Into<Node>, target: impl Into<Node>) -> Node {
    let p = clip(prediction, PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
    let y: Node = target.into();
    let kept = hadamard_product(y.clone(), log(p.clone()));
    let dropped = hadamard_product(one_minus(y), log(one_minus(p)));
    negative(mean_reduce(plus(kept, dropped)))
}
