use anyhow::Result;
use ndarray::{Array2, Axis};
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::prelude::{MlpError, NUM_CLASSES};

mod mnist;

pub use mnist::load_mnist;

/// One labeled partition. Rows of `images` are flattened examples with
/// values in `[0, 1]`; rows of `labels` are one-hot class vectors.
#[derive(Debug)]
pub struct DataSet {
    images: Array2<f32>,
    labels: Array2<f32>,
}

impl DataSet {
    pub fn new(
        images: Array2<f32>,
        labels: Array2<f32>,
    ) -> Result<Self> {
        if images.nrows() != labels.nrows() {
            return Err(MlpError(format!(
                "example count mismatch: {} images vs {} labels",
                images.nrows(),
                labels.nrows()
            )))?;
        }
        for (i, row) in labels.axis_iter(Axis(0)).enumerate() {
            let sum: f32 = row.sum();
            if (sum - 1.0).abs() > 1e-6 {
                return Err(MlpError(format!("label row {} is not one-hot (sum = {})", i, sum)))?;
            }
        }
        Ok(Self { images, labels })
    }

    /// Builds a partition from per-example rows. Test helper for synthetic data.
    pub fn from_rows(rows: &[(Vec<f32>, usize)]) -> Result<Self> {
        if rows.is_empty() {
            return Err(MlpError::from("cannot build an empty partition"))?;
        }
        let width = rows[0].0.len();
        let mut images = Array2::zeros((rows.len(), width));
        let mut labels = Array2::zeros((rows.len(), NUM_CLASSES));
        for (i, (features, class)) in rows.iter().enumerate() {
            if features.len() != width {
                return Err(MlpError(format!(
                    "row {} has width {}, expected {}",
                    i,
                    features.len(),
                    width
                )))?;
            }
            if *class >= NUM_CLASSES {
                return Err(MlpError(format!("row {} has class {} out of range", i, class)))?;
            }
            for (j, &v) in features.iter().enumerate() {
                images[[i, j]] = v;
            }
            labels[[i, *class]] = 1.0;
        }
        DataSet::new(images, labels)
    }

    pub fn len(&self) -> usize { self.images.nrows() }

    pub fn is_empty(&self) -> bool { self.images.nrows() == 0 }

    pub fn images(&self) -> &Array2<f32> { &self.images }

    pub fn labels(&self) -> &Array2<f32> { &self.labels }

    /// Gathers the image and label rows at `indices` into dense batch matrices.
    pub fn batch(
        &self,
        indices: &[usize],
    ) -> (Array2<f32>, Array2<f32>) {
        debug_assert!(!indices.iter().any(|&i| i >= self.len()));
        (self.images.select(Axis(0), indices), self.labels.select(Axis(0), indices))
    }
}

/// The three disjoint partitions produced by the loader.
#[derive(Debug)]
pub struct DataSplits {
    pub train: DataSet,
    pub validation: DataSet,
    pub test: DataSet,
}

/// Epoch-shuffled cursor over the example indices of one partition.
///
/// `next_batch(k)` hands out exactly `k` indices. Within one epoch no index
/// repeats, so consecutive calls cover the whole partition before any example
/// is seen a second time. Crossing an epoch boundary reshuffles the order.
pub struct BatchSampler {
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl BatchSampler {
    pub fn new(
        num_examples: usize,
        seed: u64,
    ) -> Result<Self> {
        if num_examples == 0 {
            return Err(MlpError::from("cannot sample batches from an empty partition"))?;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..num_examples).collect();
        order.shuffle(&mut rng);
        Ok(Self { order, cursor: 0, rng })
    }

    pub fn next_batch(
        &mut self,
        n: usize,
    ) -> Vec<usize> {
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            let take = (n - batch.len()).min(self.order.len() - self.cursor);
            batch.extend_from_slice(&self.order[self.cursor..self.cursor + take]);
            self.cursor += take;
        }
        batch
    }
}
