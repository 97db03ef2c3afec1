use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::Bernoulli;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::prelude::{MlpError, IMAGE_WIDTH, NUM_CLASSES};

pub mod init;

/// Layer widths of the published digit classifier.
pub const CLASSIFIER_WIDTHS: [usize; 4] = [IMAGE_WIDTH, 128, 64, NUM_CLASSES];
/// Fraction of hidden activations zeroed by the dropout variant.
pub const CLASSIFIER_DROPOUT: f32 = 0.5;

/// One affine transform: `output = input · W + b`, with `W` of shape
/// `[in_width, out_width]` and `b` of shape `[out_width]`.
pub struct Dense {
    name: String,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    fn new<R: Rng>(
        index: usize,
        in_width: usize,
        out_width: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            name: format!("fc{}", index + 1),
            weights: init::truncated_normal(in_width, out_width, init::WEIGHT_STDDEV, rng),
            bias: init::constant_bias(out_width),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn in_width(&self) -> usize { self.weights.nrows() }

    pub fn out_width(&self) -> usize { self.weights.ncols() }

    pub fn weights(&self) -> &Array2<f32> { &self.weights }

    pub fn bias(&self) -> &Array1<f32> { &self.bias }

    pub fn set_weights(
        &mut self,
        weights: Array2<f32>,
    ) -> Result<()> {
        if weights.dim() != self.weights.dim() {
            return Err(MlpError(format!(
                "layer '{}': weight shape {:?} does not match {:?}",
                self.name,
                weights.dim(),
                self.weights.dim()
            )))?;
        }
        self.weights = weights;
        Ok(())
    }

    pub fn set_bias(
        &mut self,
        bias: Array1<f32>,
    ) -> Result<()> {
        if bias.len() != self.bias.len() {
            return Err(MlpError(format!(
                "layer '{}': bias width {} does not match {}",
                self.name,
                bias.len(),
                self.bias.len()
            )))?;
        }
        self.bias = bias;
        Ok(())
    }

    fn affine(
        &self,
        input: &Array2<f32>,
    ) -> Array2<f32> {
        input.dot(&self.weights) + &self.bias
    }
}

/// Intermediate values of one training forward pass, kept for the backward
/// pass: the input and every post-activation (`activations`), every
/// pre-activation (`zscores`), and the scaled dropout mask per hidden layer.
pub struct ForwardCache {
    activations: Vec<Array2<f32>>,
    zscores: Vec<Array2<f32>>,
    masks: Vec<Option<Array2<f32>>>,
}

/// Loss gradients for every parameter tensor, in layer order.
pub struct Gradients {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
}

/// Feed-forward classifier: stacked dense layers with ReLU between all but
/// the last, and optional dropout on the hidden activations during training.
///
/// The structure is fixed at construction; only the parameter values change
/// (by the optimizer during training, or by a checkpoint restore).
pub struct DeepMlp {
    layers: Vec<Dense>,
    dropout: Option<f32>,
}

impl DeepMlp {
    /// Builds the network with freshly initialized parameters.
    ///
    /// # Arguments
    /// * `widths` layer widths from input to output, e.g. `[784, 128, 64, 10]`
    /// * `dropout` fraction of hidden activations to zero during training, if any
    /// * `rng` source for the weight initializer (inject a seeded one for reproducibility)
    pub fn new<R: Rng>(
        widths: &[usize],
        dropout: Option<f32>,
        rng: &mut R,
    ) -> Result<Self> {
        if widths.len() < 2 {
            return Err(MlpError::from("need at least an input and an output width"))?;
        }
        if widths.iter().any(|&w| w == 0) {
            return Err(MlpError::from("layer widths must be non-zero"))?;
        }
        if let Some(rate) = dropout {
            if !(0.0..1.0).contains(&rate) || rate == 0.0 {
                return Err(MlpError(format!("dropout rate {} outside (0, 1)", rate)))?;
            }
        }
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Dense::new(i, pair[0], pair[1], rng))
            .collect();
        Ok(Self { layers, dropout })
    }

    /// The published 784→128→64→10 classifier.
    pub fn classifier<R: Rng>(rng: &mut R) -> Result<Self> {
        Self::new(&CLASSIFIER_WIDTHS, None, rng)
    }

    /// The sibling variant regularized with 50% dropout on hidden layers.
    pub fn classifier_with_dropout<R: Rng>(rng: &mut R) -> Result<Self> {
        Self::new(&CLASSIFIER_WIDTHS, Some(CLASSIFIER_DROPOUT), rng)
    }

    pub fn layers(&self) -> &[Dense] { &self.layers }

    pub fn layers_mut(&mut self) -> &mut [Dense] { &mut self.layers }

    pub fn dropout(&self) -> Option<f32> { self.dropout }

    pub fn input_width(&self) -> usize { self.layers[0].in_width() }

    pub fn output_width(&self) -> usize { self.layers[self.layers.len() - 1].out_width() }

    fn check_input(
        &self,
        input: &Array2<f32>,
    ) -> Result<()> {
        if input.ncols() != self.input_width() {
            return Err(MlpError(format!(
                "input width {} does not match the model's {}",
                input.ncols(),
                self.input_width()
            )))?;
        }
        Ok(())
    }

    /// Inference pass: `[batch, in] -> [batch, out]` logits. Dropout is
    /// inactive here.
    pub fn forward(
        &self,
        input: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        self.check_input(input)?;
        let last = self.layers.len() - 1;
        let mut current = input.to_owned();
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = layer.affine(&current);
            if l < last {
                z.mapv_inplace(|v| v.max(0.0));
            }
            current = z;
        }
        Ok(current)
    }

    /// Training pass: like [Self::forward] but with dropout active and all
    /// intermediate values cached for [Self::backward].
    pub fn forward_training<R: Rng>(
        &self,
        input: &Array2<f32>,
        rng: &mut R,
    ) -> Result<(Array2<f32>, ForwardCache)> {
        self.check_input(input)?;
        let last = self.layers.len() - 1;
        let mut cache = ForwardCache {
            activations: vec![input.to_owned()],
            zscores: Vec::with_capacity(self.layers.len()),
            masks: Vec::with_capacity(last),
        };
        let mut current = input.to_owned();
        for (l, layer) in self.layers.iter().enumerate() {
            let z = layer.affine(&current);
            cache.zscores.push(z.clone());
            current = z;
            if l < last {
                current.mapv_inplace(|v| v.max(0.0));
                cache.masks.push(match self.dropout {
                    Some(rate) => {
                        let mask = dropout_mask(current.dim(), rate, rng);
                        current *= &mask;
                        Some(mask)
                    }
                    None => None,
                });
            }
            cache.activations.push(current.clone());
        }
        let logits = cache.activations.last().expect("at least one layer").clone();
        Ok((logits, cache))
    }

    /// Chain-rule pass from the loss gradient w.r.t. the logits down to every
    /// parameter tensor.
    pub fn backward(
        &self,
        cache: &ForwardCache,
        dlogits: &Array2<f32>,
    ) -> Gradients {
        let mut weights = Vec::with_capacity(self.layers.len());
        let mut biases = Vec::with_capacity(self.layers.len());
        let mut delta = dlogits.to_owned();

        for l in (0..self.layers.len()).rev() {
            weights.push(cache.activations[l].t().dot(&delta));
            biases.push(delta.sum_axis(Axis(0)));
            if l > 0 {
                delta = delta.dot(&self.layers[l].weights().t());
                if let Some(mask) = &cache.masks[l - 1] {
                    delta *= mask;
                }
                // gate through the ReLU of the previous layer
                delta.zip_mut_with(&cache.zscores[l - 1], |d, &z| {
                    if z <= 0.0 {
                        *d = 0.0;
                    }
                });
            }
        }
        weights.reverse();
        biases.reverse();
        Gradients { weights, biases }
    }

    /// Decodes a batch of inputs to class indices (argmax over the logits).
    pub fn predict(
        &self,
        input: &Array2<f32>,
    ) -> Result<Vec<usize>> {
        Ok(argmax_rows(&self.forward(input)?))
    }
}

fn dropout_mask<R: Rng>(
    dim: (usize, usize),
    rate: f32,
    rng: &mut R,
) -> Array2<f32> {
    let keep = 1.0 - rate;
    let dist = Bernoulli::new(keep as f64).expect("dropout rate checked at construction");
    let scale = 1.0 / keep;
    Array2::<bool>::random_using(dim, dist, rng).mapv(|kept| if kept { scale } else { 0.0 })
}

pub fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

pub fn argmax_rows(matrix: &Array2<f32>) -> Vec<usize> {
    matrix.axis_iter(Axis(0)).map(argmax).collect()
}

/// Fraction of rows whose logits argmax matches the one-hot label.
pub fn accuracy(
    logits: &Array2<f32>,
    labels: &Array2<f32>,
) -> f32 {
    debug_assert_eq!(logits.dim(), labels.dim());
    let hits = logits
        .axis_iter(Axis(0))
        .zip(labels.axis_iter(Axis(0)))
        .filter(|(prediction, label)| argmax(prediction.view()) == argmax(label.view()))
        .count();
    hits as f32 / logits.nrows() as f32
}
