use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::model::{argmax_rows, DeepMlp};
use crate::prelude::MlpError;

/// One node of the inference graph. Parameters are baked in as constants;
/// there is no variable indirection left.
#[derive(Serialize, Deserialize)]
pub enum GraphOp {
    MatMul {
        name: String,
        weights: Array2<f32>,
    },
    /// Affine-quantized weight constant: `value = scale * (q - zero_point)`.
    QuantizedMatMul {
        name: String,
        shape: (usize, usize),
        quantized: Vec<u8>,
        scale: f32,
        zero_point: u8,
    },
    BiasAdd {
        name: String,
        bias: Vec<f32>,
    },
    Relu,
}

/// The deployment artifact: the static chain from the input placeholder to
/// the prediction output, with every trained parameter embedded as a
/// constant. Training-only pieces (loss, optimizer, dropout) have no
/// representation here at all.
#[derive(Serialize, Deserialize)]
pub struct FrozenGraph {
    input_width: usize,
    output_width: usize,
    ops: Vec<GraphOp>,
}

impl FrozenGraph {
    /// Converts the model's current parameter values into constants and
    /// keeps only the inference chain.
    pub fn freeze(model: &DeepMlp) -> Self {
        let last = model.layers().len() - 1;
        let mut ops = Vec::new();
        for (l, layer) in model.layers().iter().enumerate() {
            ops.push(GraphOp::MatMul {
                name: format!("W_{}", layer.name()),
                weights: layer.weights().clone(),
            });
            ops.push(GraphOp::BiasAdd {
                name: format!("b_{}", layer.name()),
                bias: layer.bias().to_vec(),
            });
            if l < last {
                ops.push(GraphOp::Relu);
            }
        }
        Self {
            input_width: model.input_width(),
            output_width: model.output_width(),
            ops,
        }
    }

    pub fn input_width(&self) -> usize { self.input_width }

    pub fn output_width(&self) -> usize { self.output_width }

    pub fn ops(&self) -> &[GraphOp] { &self.ops }

    pub fn ops_mut(&mut self) -> &mut [GraphOp] { &mut self.ops }

    pub fn is_quantized(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, GraphOp::QuantizedMatMul { .. }))
    }

    /// Replays the graph on an input batch, producing logits.
    pub fn run(
        &self,
        input: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        if input.ncols() != self.input_width {
            return Err(MlpError(format!(
                "input width {} does not match the graph's {}",
                input.ncols(),
                self.input_width
            )))?;
        }
        let mut current = input.to_owned();
        for op in &self.ops {
            current = match op {
                GraphOp::MatMul { weights, .. } => current.dot(weights),
                GraphOp::QuantizedMatMul { name, shape, quantized, scale, zero_point } => {
                    let weights = dequantize(name, *shape, quantized, *scale, *zero_point)?;
                    current.dot(&weights)
                }
                GraphOp::BiasAdd { bias, .. } => current + &ndarray::aview1(bias),
                GraphOp::Relu => {
                    current.mapv_inplace(|v| v.max(0.0));
                    current
                }
            };
        }
        Ok(current)
    }

    /// Runs the graph and decodes class indices (argmax over the logits).
    pub fn predict(
        &self,
        input: &Array2<f32>,
    ) -> Result<Vec<usize>> {
        Ok(argmax_rows(&self.run(input)?))
    }

    /// Serializes the artifact as one self-contained binary file.
    pub fn write(
        &self,
        path: &Path,
    ) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create '{}'", parent.display()))?;
            }
        }
        let file = File::create(path).with_context(|| format!("failed to create '{}'", path.display()))?;
        bincode::serialize_into(BufWriter::new(file), self)
            .with_context(|| format!("failed to write graph to '{}'", path.display()))?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
        let graph = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("failed to read graph from '{}'", path.display()))?;
        Ok(graph)
    }
}

fn dequantize(
    name: &str,
    shape: (usize, usize),
    quantized: &[u8],
    scale: f32,
    zero_point: u8,
) -> Result<Array2<f32>> {
    if quantized.len() != shape.0 * shape.1 {
        return Err(MlpError(format!("'{}': quantized data does not fill shape {:?}", name, shape)))?;
    }
    let values = quantized
        .iter()
        .map(|&q| scale * (q as f32 - zero_point as f32))
        .collect();
    Ok(Array2::from_shape_vec(shape, values)?)
}
