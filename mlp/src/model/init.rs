use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::{Distribution, Normal};
use rand::Rng;

/// Standard deviation of the weight initializer.
pub const WEIGHT_STDDEV: f32 = 0.1;
/// Constant every bias element starts from.
pub const BIAS_VALUE: f32 = 0.1;

/// Samples a weight matrix from a truncated normal distribution: mean 0,
/// the given stddev, and any draw beyond two standard deviations discarded
/// and resampled.
pub fn truncated_normal<R: Rng>(
    rows: usize,
    cols: usize,
    stddev: f32,
    rng: &mut R,
) -> Array2<f32> {
    let normal = Normal::new(0.0_f32, stddev).expect("stddev is a positive constant");
    let bound = 2.0 * stddev;
    Array2::from_shape_fn((rows, cols), |_| loop {
        let v = normal.sample(rng);
        if v.abs() <= bound {
            break v;
        }
    })
}

pub fn constant_bias(width: usize) -> Array1<f32> {
    Array1::from_elem(width, BIAS_VALUE)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_samples_stay_within_two_stddev() {
        let mut rng = StdRng::seed_from_u64(1);
        let w = truncated_normal(64, 32, WEIGHT_STDDEV, &mut rng);
        let bound = 2.0 * WEIGHT_STDDEV;
        assert!(w.iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn test_sampling_is_deterministic_for_a_fixed_seed() {
        let a = truncated_normal(8, 8, WEIGHT_STDDEV, &mut StdRng::seed_from_u64(99));
        let b = truncated_normal(8, 8, WEIGHT_STDDEV, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_samples_are_not_all_identical() {
        let mut rng = StdRng::seed_from_u64(5);
        let w = truncated_normal(4, 4, WEIGHT_STDDEV, &mut rng);
        let first = w[[0, 0]];
        assert!(w.iter().any(|&v| v != first));
    }

    #[test]
    fn test_bias_is_constant() {
        let b = constant_bias(10);
        assert!(b.iter().all(|&v| v == BIAS_VALUE));
    }
}
