use anyhow::Result;
use num_format::ToFormattedString;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dataset::{BatchSampler, DataSet};
use crate::model::{accuracy, DeepMlp};
use crate::prelude::MlpError;
use crate::util::format;
use crate::util::immutable::Immutable;

pub mod adam;
pub mod loss;

pub use adam::Adam;

/// Training hyper-parameters. Parsed once, never mutated afterwards.
pub struct Parameter {
    /// Fixed Adam learning rate
    pub learning_rate: f32,
    /// Total number of mini-batch steps before the loop stops
    pub num_iterations: usize,
    /// Examples per mini-batch
    pub batch_size: usize,
    /// Report training accuracy every n steps
    pub log_every_iters: usize,
    /// Seed for batch order and dropout masks
    pub seed: u64,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            num_iterations: 20_000,
            batch_size: 50,
            log_every_iters: 100,
            seed: 1,
        }
    }
}

/// Outcome of one training step.
pub struct StepReport {
    pub step: usize,
    pub loss: f32,
    /// Accuracy on the step's own mini-batch; only measured on reporting steps.
    pub training_accuracy: Option<f32>,
}

/// The mini-batch gradient-descent loop.
///
/// Each step draws one batch from the training partition, computes the
/// softmax cross-entropy loss and its gradients, and applies one Adam
/// update. Every `log_every_iters` steps the accuracy on the current batch
/// is measured (an intentionally noisy progress signal - the batch is not a
/// held-out set) and reported. The loop stops after exactly
/// `num_iterations` steps: no early stopping, no schedule.
pub struct Trainer {
    param: Immutable<Parameter>,
    model: DeepMlp,
    optimizer: Adam,
    sampler: BatchSampler,
    train_set: DataSet,
    rng: StdRng,
    steps_done: usize,
}

impl Trainer {
    pub fn new(
        model: DeepMlp,
        train_set: DataSet,
        param: Parameter,
    ) -> Result<Self> {
        if param.batch_size == 0 {
            return Err(MlpError::from("batch size must be non-zero"))?;
        }
        if param.log_every_iters == 0 {
            return Err(MlpError::from("reporting interval must be non-zero"))?;
        }
        let optimizer = Adam::new(&model, param.learning_rate);
        let sampler = BatchSampler::new(train_set.len(), param.seed)?;
        // separate stream from the sampler's
        let rng = StdRng::seed_from_u64(param.seed.wrapping_add(1));
        Ok(Self {
            param: Immutable::new(param),
            model,
            optimizer,
            sampler,
            train_set,
            rng,
            steps_done: 0,
        })
    }

    pub fn is_done(&self) -> bool { self.steps_done >= self.param.num_iterations }

    pub fn steps_done(&self) -> usize { self.steps_done }

    pub fn model(&self) -> &DeepMlp { &self.model }

    /// Hands the trained model over to the exporter.
    pub fn into_model(self) -> DeepMlp { self.model }

    /// Runs one mini-batch step: sample, (optionally) report, update.
    pub fn train_step(&mut self) -> Result<StepReport> {
        let indices = self.sampler.next_batch(self.param.batch_size);
        let (images, labels) = self.train_set.batch(&indices);

        // measured before the update, on the raw batch, dropout inactive
        let training_accuracy = if self.steps_done % self.param.log_every_iters == 0 {
            let logits = self.model.forward(&images)?;
            let batch_accuracy = accuracy(&logits, &labels);
            log::info!("step {}, training accuracy {}", self.steps_done, batch_accuracy);
            Some(batch_accuracy)
        } else {
            None
        };

        let (logits, cache) = self.model.forward_training(&images, &mut self.rng)?;
        let (loss_value, dlogits) = loss::softmax_cross_entropy(&logits, &labels);
        let grads = self.model.backward(&cache, &dlogits);
        self.optimizer.step(&mut self.model, &grads);
        self.steps_done += 1;

        Ok(StepReport { step: self.steps_done, loss: loss_value, training_accuracy })
    }

    /// Drives [Self::train_step] until the iteration budget is exhausted.
    pub fn run(&mut self) -> Result<()> {
        while !self.is_done() {
            self.train_step()?;
        }
        log::info!(
            "training done after {} iterations",
            self.steps_done.to_formatted_string(&format::number_format())
        );
        Ok(())
    }
}
