use std::path::{Path, PathBuf};

use anyhow::Result;
use itertools::Itertools;
use ndarray::Array2;
use num_format::ToFormattedString;
use rustc_hash::FxHashMap;

use crate::dataset::DataSet;
use crate::model::{accuracy, argmax_rows, DeepMlp};
use crate::util::format;

pub mod checkpoint;
pub mod frozen;
pub mod quant;

pub use checkpoint::Checkpoint;
pub use frozen::FrozenGraph;

/// What the export produced, for the caller's final confirmation lines.
pub struct ExportReport {
    pub test_accuracy: f32,
    pub checkpoint_path: PathBuf,
    pub graph_path: PathBuf,
}

/// Post-training pipeline, strictly ordered: evaluate the test partition,
/// persist the checkpoint, freeze the inference graph (optionally
/// quantized), write the artifact.
pub struct Exporter<'a> {
    model: &'a DeepMlp,
    checkpoint_path: PathBuf,
    graph_path: PathBuf,
    quantize: bool,
}

impl<'a> Exporter<'a> {
    pub fn new(
        model: &'a DeepMlp,
        checkpoint_path: &Path,
        graph_path: &Path,
    ) -> Self {
        Self {
            model,
            checkpoint_path: checkpoint_path.to_path_buf(),
            graph_path: graph_path.to_path_buf(),
            quantize: false,
        }
    }

    /// Additionally quantizes the weight constants of the artifact.
    pub fn with_quantization(
        mut self,
        quantize: bool,
    ) -> Self {
        self.quantize = quantize;
        self
    }

    pub fn run(
        &self,
        test_set: &DataSet,
    ) -> Result<ExportReport> {
        // the whole test partition fits in one pass
        let logits = self.model.forward(test_set.images())?;
        let test_accuracy = accuracy(&logits, test_set.labels());
        log::info!(
            "test accuracy {} ({} examples)",
            test_accuracy,
            test_set.len().to_formatted_string(&format::number_format())
        );
        log::info!("prediction distribution: {}", prediction_distribution_line(&logits));

        Checkpoint::capture(self.model).save(&self.checkpoint_path)?;
        log::info!("saved checkpoint to '{}'", self.checkpoint_path.display());

        let mut graph = FrozenGraph::freeze(self.model);
        if self.quantize {
            graph = quant::quantize(graph);
            log::info!("quantized {} weight constants", self.model.layers().len());
        }
        graph.write(&self.graph_path)?;
        log::info!("written graph to '{}'", self.graph_path.display());

        Ok(ExportReport {
            test_accuracy,
            checkpoint_path: self.checkpoint_path.clone(),
            graph_path: self.graph_path.clone(),
        })
    }
}

fn prediction_distribution_line(logits: &Array2<f32>) -> String {
    let mut class_counts = FxHashMap::<usize, usize>::default();
    for class in argmax_rows(logits) {
        class_counts.entry(class).and_modify(|e| *e += 1).or_insert(1);
    }
    let total = logits.nrows();
    class_counts
        .iter()
        .sorted()
        .map(|(&class, &count)| {
            let ratio = 100.0 * count as f32 / total as f32;
            format!("{} {:.1}%", class, ratio)
        })
        .join(", ")
}
