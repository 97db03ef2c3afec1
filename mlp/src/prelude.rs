use std::fmt::{Display, Formatter};

/// Width of one flattened input image (28x28 grayscale).
pub const IMAGE_WIDTH: usize = 784;
/// Number of digit classes = width of the one-hot label vector.
pub const NUM_CLASSES: usize = 10;

pub use crate::dataset::{BatchSampler, DataSet, DataSplits};
pub use crate::export::{Checkpoint, Exporter, FrozenGraph};
pub use crate::model::DeepMlp;
pub use crate::train::{Parameter, Trainer};

#[derive(Debug)]
pub struct MlpError(pub String);

impl MlpError {
    pub fn from(msg: &str) -> Self { MlpError(msg.to_string()) }
}

impl Display for MlpError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MlpError {}
