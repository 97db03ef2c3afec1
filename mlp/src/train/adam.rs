use ndarray::{Array1, Array2, Zip};

use crate::model::{DeepMlp, Gradients};

/// Adaptive moment estimation. Owns the per-parameter first and second
/// moment running estimates and the step counter; callers only ever hand it
/// gradients. The moments are not persisted, a checkpoint captures
/// parameter values only.
pub struct Adam {
    learning_rate: f32,
    betas: (f32, f32),
    eps: f32,
    step_count: usize,
    weight_moments: Vec<(Array2<f32>, Array2<f32>)>,
    bias_moments: Vec<(Array1<f32>, Array1<f32>)>,
}

impl Adam {
    pub fn new(
        model: &DeepMlp,
        learning_rate: f32,
    ) -> Self {
        let weight_moments = model
            .layers()
            .iter()
            .map(|l| (Array2::zeros(l.weights().dim()), Array2::zeros(l.weights().dim())))
            .collect();
        let bias_moments = model
            .layers()
            .iter()
            .map(|l| (Array1::zeros(l.bias().len()), Array1::zeros(l.bias().len())))
            .collect();
        Self {
            learning_rate,
            betas: (0.9, 0.999),
            eps: 1e-8,
            step_count: 0,
            weight_moments,
            bias_moments,
        }
    }

    /// Applies one in-place update to every parameter tensor of `model`.
    pub fn step(
        &mut self,
        model: &mut DeepMlp,
        grads: &Gradients,
    ) {
        self.step_count += 1;
        let (beta1, beta2) = self.betas;
        let bias_correction1 = 1.0 - beta1.powi(self.step_count as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.step_count as i32);
        let lr = self.learning_rate;
        let eps = self.eps;

        for (l, layer) in model.layers_mut().iter_mut().enumerate() {
            let (m, v) = &mut self.weight_moments[l];
            let mut weights = layer.weights().clone();
            Zip::from(&mut weights)
                .and(&mut *m)
                .and(&mut *v)
                .and(&grads.weights[l])
                .for_each(|w, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
            layer.set_weights(weights).expect("shape unchanged by the update");

            let (m, v) = &mut self.bias_moments[l];
            let mut bias = layer.bias().clone();
            Zip::from(&mut bias)
                .and(&mut *m)
                .and(&mut *v)
                .and(&grads.biases[l])
                .for_each(|b, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *b -= lr * m_hat / (v_hat.sqrt() + eps);
                });
            layer.set_bias(bias).expect("shape unchanged by the update");
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn tiny_model() -> DeepMlp {
        DeepMlp::new(&[3, 2], None, &mut StdRng::seed_from_u64(1)).unwrap()
    }

    fn unit_gradients(model: &DeepMlp) -> Gradients {
        Gradients {
            weights: model.layers().iter().map(|l| Array2::ones(l.weights().dim())).collect(),
            biases: model.layers().iter().map(|l| Array1::ones(l.bias().len())).collect(),
        }
    }

    #[test]
    fn test_first_step_moves_parameters_by_roughly_the_learning_rate() {
        let mut model = tiny_model();
        let before = model.layers()[0].weights().clone();
        let grads = unit_gradients(&model);
        let mut adam = Adam::new(&model, 1e-2);

        adam.step(&mut model, &grads);

        // with bias correction, the very first Adam step is ~lr per element
        let after = model.layers()[0].weights();
        for (b, a) in before.iter().zip(after.iter()) {
            let delta = b - a;
            assert!((delta - 1e-2).abs() < 1e-4, "delta: {}", delta);
        }
    }

    #[test]
    fn test_zero_gradient_leaves_parameters_unchanged() {
        let mut model = tiny_model();
        let before = model.layers()[0].weights().clone();
        let grads = Gradients {
            weights: vec![Array2::zeros((3, 2))],
            biases: vec![Array1::zeros(2)],
        };
        let mut adam = Adam::new(&model, 1e-2);

        adam.step(&mut model, &grads);

        assert_eq!(&before, model.layers()[0].weights());
    }

    #[test]
    fn test_moments_accumulate_across_steps() {
        let mut model = tiny_model();
        let grads = unit_gradients(&model);
        let mut adam = Adam::new(&model, 1e-3);

        adam.step(&mut model, &grads);
        let after_one = model.layers()[0].weights().clone();
        adam.step(&mut model, &grads);
        let after_two = model.layers()[0].weights().clone();

        // constant gradient keeps pushing in the same direction
        for (one, two) in after_one.iter().zip(after_two.iter()) {
            assert!(two < one);
        }
    }
}
