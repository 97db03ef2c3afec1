use ndarray::{Array2, Axis, Zip};

/// Softmax cross-entropy against one-hot labels, averaged over the batch.
///
/// Returns the loss together with its gradient w.r.t. the logits. For
/// softmax followed by cross-entropy the two fuse into
/// `(softmax(logits) - labels) / batch_size`.
pub fn softmax_cross_entropy(
    logits: &Array2<f32>,
    labels: &Array2<f32>,
) -> (f32, Array2<f32>) {
    debug_assert_eq!(logits.dim(), labels.dim());
    let batch_size = logits.nrows() as f32;

    let mut probs = logits.to_owned();
    let mut total_loss = 0.0_f32;
    for (mut row, label_row) in probs.axis_iter_mut(Axis(0)).zip(labels.axis_iter(Axis(0))) {
        // shift by the row max so exp() cannot overflow
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let mut sum = 0.0_f32;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        let inv = 1.0 / sum;
        for (p, &y) in row.iter_mut().zip(label_row.iter()) {
            *p *= inv;
            if y > 0.0 {
                total_loss -= y * (*p + 1e-9).ln();
            }
        }
    }

    let mut dlogits = probs;
    Zip::from(&mut dlogits).and(labels).for_each(|p, &y| {
        *p = (*p - y) / batch_size;
    });

    (total_loss / batch_size, dlogits)
}
