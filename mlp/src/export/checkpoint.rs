use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::model::DeepMlp;
use crate::prelude::MlpError;

/// One parameter tensor, flattened for serialization.
#[derive(Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// Snapshot of every parameter tensor of a model at one point in training.
/// Optimizer state is deliberately not part of it.
#[derive(Serialize, Deserialize)]
pub struct Checkpoint {
    tensors: Vec<NamedTensor>,
}

impl Checkpoint {
    pub fn capture(model: &DeepMlp) -> Self {
        let mut tensors = Vec::with_capacity(model.layers().len() * 2);
        for layer in model.layers() {
            tensors.push(NamedTensor {
                name: format!("W_{}", layer.name()),
                shape: vec![layer.in_width(), layer.out_width()],
                values: layer.weights().iter().copied().collect(),
            });
            tensors.push(NamedTensor {
                name: format!("b_{}", layer.name()),
                shape: vec![layer.out_width()],
                values: layer.bias().iter().copied().collect(),
            });
        }
        Self { tensors }
    }

    pub fn tensors(&self) -> &[NamedTensor] { &self.tensors }

    /// Writes the snapshot as a single binary file, creating parent
    /// directories as needed.
    pub fn save(
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
            .with_context(|| format!("failed to write checkpoint to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
        let checkpoint = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("failed to read checkpoint from '{}'", path.display()))?;
        Ok(checkpoint)
    }

    /// Copies the captured values back into `model`. The model must have
    /// been built with the same layer shapes.
    pub fn restore(
        &self,
        model: &mut DeepMlp,
    ) -> Result<()> {
        if self.tensors.len() != model.layers().len() * 2 {
            return Err(MlpError(format!(
                "checkpoint holds {} tensors, model expects {}",
                self.tensors.len(),
                model.layers().len() * 2
            )))?;
        }
        for (l, layer) in model.layers_mut().iter_mut().enumerate() {
            let weight_tensor = &self.tensors[2 * l];
            let bias_tensor = &self.tensors[2 * l + 1];
            if weight_tensor.name != format!("W_{}", layer.name())
                || bias_tensor.name != format!("b_{}", layer.name())
            {
                return Err(MlpError(format!(
                    "checkpoint tensor order mismatch at layer '{}'",
                    layer.name()
                )))?;
            }
            if weight_tensor.shape.len() != 2 {
                return Err(MlpError(format!("'{}' is not a matrix", weight_tensor.name)))?;
            }
            let weights =
                Array2::from_shape_vec((weight_tensor.shape[0], weight_tensor.shape[1]), weight_tensor.values.clone())
                    .with_context(|| format!("'{}' shape/value mismatch", weight_tensor.name))?;
            layer.set_weights(weights)?;
            layer.set_bias(Array1::from_vec(bias_tensor.values.clone()))?;
        }
        Ok(())
    }
}
