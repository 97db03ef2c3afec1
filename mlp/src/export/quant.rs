use crate::export::frozen::{FrozenGraph, GraphOp};

/// Rewrites every float weight constant of `graph` into an affine-quantized
/// u8 constant, shrinking the artifact to roughly a quarter of its size.
/// Biases stay in f32 (they are small and their precision matters most at
/// the output). Prediction quality degrades slightly; the plain export path
/// never calls this.
pub fn quantize(mut graph: FrozenGraph) -> FrozenGraph {
    for op in graph.ops_mut() {
        if let GraphOp::MatMul { name, weights } = op {
            let (quantized, scale, zero_point) = quantize_values(weights.iter().copied());
            let shape = weights.dim();
            let name = std::mem::take(name);
            *op = GraphOp::QuantizedMatMul { name, shape, quantized, scale, zero_point };
        }
    }
    graph
}

/// Maps values onto `0..=255` so that `scale * (q - zero_point)` recovers
/// them with at most half a quantization step of error.
fn quantize_values(values: impl Iterator<Item = f32> + Clone) -> (Vec<u8>, f32, u8) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for v in values.clone() {
        min = min.min(v);
        max = max.max(v);
    }
    // always representable zero keeps the scheme affine
    min = min.min(0.0);
    max = max.max(0.0);

    let scale = ((max - min) / 255.0).max(f32::MIN_POSITIVE);
    let zero_point = (-min / scale).round().clamp(0.0, 255.0) as u8;

    let quantized = values
        .map(|v| ((v / scale) + zero_point as f32).round().clamp(0.0, 255.0) as u8)
        .collect();
    (quantized, scale, zero_point)
}
