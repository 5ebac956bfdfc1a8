//! Parameter persistence: value and shape of every parameter leaf, stored
//! as JSON in arena order. This is the crate's only recoverable error
//! surface.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::tensor::Tensor;

/// Serialized form of one parameter leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Serializable snapshot of a graph's parameters, in arena order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphState {
    pub params: Vec<ParamRecord>,
}

/// Capture the current parameter values.
pub fn to_state(graph: &Graph) -> GraphState {
    let params = graph
        .param_ids()
        .map(|id| {
            let value = graph.value(id);
            ParamRecord {
                shape: value.shape().to_vec(),
                data: value.as_slice().to_vec(),
            }
        })
        .collect();
    GraphState { params }
}

/// Restore parameter values from a snapshot. The snapshot must carry one
/// record per parameter, each with the parameter's exact shape.
pub fn from_state(graph: &mut Graph, state: &GraphState) -> Result<()> {
    if state.params.len() != graph.param_count() {
        return Err(Error::ParameterCount {
            expected: graph.param_count(),
            got: state.params.len(),
        });
    }
    for (id, record) in graph.param_ids().collect::<Vec<_>>().into_iter().zip(&state.params) {
        let expected = graph.value(id).shape().to_vec();
        if record.shape != expected {
            return Err(Error::ShapeMismatch {
                expected,
                got: record.shape.clone(),
            });
        }
        let numel: usize = record.shape.iter().product();
        if record.data.len() != numel {
            return Err(Error::Serialization(format!(
                "record holds {} values for shape {:?}",
                record.data.len(),
                record.shape
            )));
        }
        graph.set_value(id, Tensor::from_vec(&record.shape, record.data.clone()));
    }
    Ok(())
}

/// Save all parameters to a JSON file.
pub fn save_params(graph: &Graph, path: impl AsRef<Path>) -> Result<()> {
    let state = to_state(graph);
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &state)
        .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
    writer.flush()?;
    Ok(())
}

/// Load all parameters from a JSON file written by [`save_params`].
pub fn load_params(graph: &mut Graph, path: impl AsRef<Path>) -> Result<()> {
    let file = File::open(path)?;
    let state: GraphState = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?;
    from_state(graph, &state)
}
