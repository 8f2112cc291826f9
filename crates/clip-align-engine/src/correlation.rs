use ndarray::ArrayView2;
use rustfft::{FftPlanner, num_complex::Complex};

use clip_align_types::{AlignError, AlignResult};

/// Smallest power of two covering both sequences.
pub fn transform_length(query_frames: usize, reference_frames: usize) -> usize {
    query_frames.max(reference_frames).max(1).next_power_of_two()
}

/// Circular cross-correlation of two descriptor sequences via the frequency
/// domain.
///
/// Each descriptor dimension is transformed independently along the time
/// axis; per frequency bin the query-conjugate cross term is summed over all
/// dimensions and divided by the query's summed energy plus `lambda`. The
/// regularizer keeps bins with near-zero query energy from blowing up. The
/// returned score sequence has the transform length `N` and is periodic:
/// interpreting the peak as a linear offset requires wrap-around correction
/// downstream.
pub fn correlation_scores(
    query: ArrayView2<'_, f32>,
    reference: ArrayView2<'_, f32>,
    lambda: f32,
) -> AlignResult<Vec<f32>> {
    if query.ncols() != reference.ncols() {
        return Err(AlignError::DimensionMismatch {
            query: query.ncols(),
            reference: reference.ncols(),
        });
    }
    let dims = query.ncols();
    let n = transform_length(query.nrows(), reference.nrows());

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut cross = vec![Complex::new(0.0f32, 0.0); n];
    let mut energy = vec![0.0f32; n];
    let mut query_spectrum = vec![Complex::new(0.0f32, 0.0); n];
    let mut reference_spectrum = vec![Complex::new(0.0f32, 0.0); n];

    for d in 0..dims {
        fill_padded(&mut query_spectrum, query.column(d));
        fill_padded(&mut reference_spectrum, reference.column(d));
        forward.process(&mut query_spectrum);
        forward.process(&mut reference_spectrum);
        for k in 0..n {
            cross[k] += query_spectrum[k].conj() * reference_spectrum[k];
            energy[k] += query_spectrum[k].norm_sqr();
        }
    }

    for k in 0..n {
        cross[k] /= energy[k] + lambda;
    }
    inverse.process(&mut cross);

    // The inverse transform is unnormalized; the imaginary residue is
    // floating-point noise and is discarded.
    let scale = 1.0 / n as f32;
    Ok(cross.iter().map(|value| value.re * scale).collect())
}

fn fill_padded(buffer: &mut [Complex<f32>], column: ndarray::ArrayView1<'_, f32>) {
    for value in buffer.iter_mut() {
        *value = Complex::new(0.0, 0.0);
    }
    for (slot, &value) in buffer.iter_mut().zip(column.iter()) {
        slot.re = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Deterministic xorshift values in [-0.5, 0.5).
    fn pseudo_random_matrix(rows: usize, cols: usize, mut seed: u64) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |_| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed >> 40) as f32 / (1u64 << 24) as f32 - 0.5
        })
    }

    fn argmax(scores: &[f32]) -> usize {
        scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(idx, _)| idx)
            .unwrap()
    }

    #[test]
    fn transform_length_is_a_covering_power_of_two() {
        for (tq, tr) in [(1, 1), (60, 600), (513, 100), (1024, 1024)] {
            let n = transform_length(tq, tr);
            assert!(n.is_power_of_two());
            assert!(n >= tq.max(tr));
        }
        assert_eq!(transform_length(60, 600), 1024);
        assert_eq!(transform_length(0, 0), 1);
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        let query = Array2::<f32>::zeros((10, 8));
        let reference = Array2::<f32>::zeros((10, 9));
        let err = correlation_scores(query.view(), reference.view(), 0.1).unwrap_err();
        assert!(matches!(
            err,
            AlignError::DimensionMismatch {
                query: 8,
                reference: 9
            }
        ));
    }

    #[test]
    fn self_correlation_peaks_at_zero_offset() {
        let matrix = pseudo_random_matrix(64, 12, 0x5eed);
        let scores = correlation_scores(matrix.view(), matrix.view(), 0.01).unwrap();
        assert_eq!(scores.len(), 64);
        assert_eq!(argmax(&scores), 0);
    }

    #[test]
    fn embedded_query_is_located_in_the_reference() {
        let reference = pseudo_random_matrix(600, 24, 0xfeed_beef);
        let query = reference.slice(ndarray::s![195..255, ..]).to_owned();

        let scores = correlation_scores(query.view(), reference.view(), 0.1).unwrap();
        assert_eq!(scores.len(), 1024);
        let peak = argmax(&scores) as i64;
        assert!((peak - 195).abs() <= 1, "peak at {peak}, expected 195");
    }
}
