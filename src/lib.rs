//! # Grafo: Reverse-Mode Autodiff over an Expression Graph
//!
//! Grafo builds expression graphs over tensor-valued leaves (bound inputs,
//! trainable parameters, constants) and composable operators, and drives two
//! passes per evaluation cycle: forward evaluation producing intermediate
//! tensors, and backward propagation distributing a gradient to every leaf
//! that can receive one.
//!
//! ## Architecture
//!
//! - **tensor**: ndarray-backed dense tensors with broadcasting, reductions
//!   and a GEMM primitive
//! - **graph**: the leaf arena, the node composer and the evaluation context
//! - **ops**: forward/backward operator rules (arithmetic, shape,
//!   activations, im2col convolution, pooling, dropout, batch norm)
//! - **layer**: Keras-style builders composing core operators
//! - **loss**: loss expressions built from core operators
//! - **optim**: SGD and Adam over the graph's parameters
//! - **session**: the evaluation driver (bind, forward, backward)
//! - **io**: parameter persistence (JSON)
//!
//! ## Example
//!
//! ```
//! use grafo::{Graph, Session, Tensor};
//! use grafo::ops::{matmul, plus};
//!
//! let mut graph = Graph::new();
//! let x = graph.input();
//! let w = graph.parameter(Tensor::from_vec(&[2, 1], vec![3.0, 4.0]));
//! let b = graph.parameter(Tensor::zeros(&[1, 1]));
//! let mut y = plus(matmul(x, w), b);
//!
//! let mut session = Session::new(graph);
//! session.bind(x, Tensor::from_vec(&[1, 2], vec![1.0, 2.0]));
//! let out = session.forward(&mut y);
//! assert_eq!(out.as_slice(), &[11.0]);
//!
//! session.backward(&mut y, &Tensor::ones(&[1, 1]));
//! assert_eq!(session.graph().grad(w).as_slice(), &[1.0, 2.0]);
//! ```

pub mod error;
pub mod graph;
pub mod io;
pub mod layer;
pub mod loss;
pub mod ops;
pub mod optim;
pub mod session;
pub mod tensor;

// Re-export commonly used types
pub use error::{Error, Result};
pub use graph::{ConstId, EvalCtx, Graph, InputId, LeafRef, Mode, Node, ParamId};
pub use session::Session;
pub use tensor::Tensor;
