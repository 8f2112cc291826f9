use ndarray::{Array1, Array2, ArrayView2, Axis};

use clip_align_types::{AlignError, AlignResult};

const EIGENVALUE_FLOOR: f64 = 1e-5;
const JACOBI_SWEEPS: usize = 64;
const JACOBI_TOLERANCE: f64 = 1e-10;

/// Frozen whitened principal-component basis for raw keypoint descriptors.
///
/// Fit once from a descriptor pool, then shared read-only across every frame
/// it is applied to. `transform` is a pure function of its inputs; whether a
/// model is refit per video or reused across videos is the caller's decision.
#[derive(Debug, Clone)]
pub struct ProjectionModel {
    dim: usize,
    mean: Array1<f32>,
    /// One principal axis per row, `dim x raw_dim`.
    basis: Array2<f32>,
    whitening: Array1<f32>,
}

impl ProjectionModel {
    /// Fit a whitened basis of `dim` components from a pool of raw
    /// descriptors (one descriptor per row).
    pub fn fit(pool: ArrayView2<'_, f32>, dim: usize) -> AlignResult<Self> {
        let samples = pool.nrows();
        let raw_dim = pool.ncols();
        if samples == 0 || raw_dim == 0 {
            return Err(AlignError::insufficient_data(
                "cannot fit a projection on an empty descriptor pool",
            ));
        }
        let dim = dim.min(raw_dim).max(1);

        let mean = pool
            .mean_axis(Axis(0))
            .expect("non-empty pool has a mean");
        let mut centered = Array2::<f64>::zeros((samples, raw_dim));
        for (i, row) in pool.rows().into_iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                centered[[i, j]] = (value - mean[j]) as f64;
            }
        }
        let covariance = centered.t().dot(&centered) / samples as f64;

        let (eigenvalues, eigenvectors) = symmetric_eigen(&covariance);
        let mut order: Vec<usize> = (0..raw_dim).collect();
        order.sort_by(|&a, &b| {
            eigenvalues[b]
                .partial_cmp(&eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut basis = Array2::<f32>::zeros((dim, raw_dim));
        let mut whitening = Array1::<f32>::zeros(dim);
        for (k, &col) in order.iter().take(dim).enumerate() {
            for j in 0..raw_dim {
                basis[[k, j]] = eigenvectors[[j, col]] as f32;
            }
            let eigenvalue = eigenvalues[col].max(0.0);
            whitening[k] = (1.0 / (eigenvalue + EIGENVALUE_FLOOR).sqrt()) as f32;
        }

        Ok(Self {
            dim,
            mean,
            basis,
            whitening,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn raw_dim(&self) -> usize {
        self.basis.ncols()
    }

    /// Project raw descriptors (one per row) through the frozen basis.
    pub fn transform(&self, raw: ArrayView2<'_, f32>) -> Array2<f32> {
        let samples = raw.nrows();
        let mut out = Array2::<f32>::zeros((samples, self.dim));
        for (i, row) in raw.rows().into_iter().enumerate() {
            for k in 0..self.dim {
                let mut dot = 0.0f32;
                for j in 0..self.raw_dim().min(row.len()) {
                    dot += (row[j] - self.mean[j]) * self.basis[[k, j]];
                }
                out[[i, k]] = dot * self.whitening[k];
            }
        }
        out
    }
}

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns (eigenvalues, eigenvectors-as-columns). Adequate for the small
/// covariance matrices produced by keypoint descriptors (32–128 wide).
fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..JACOBI_SWEEPS {
        let mut off_diagonal = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diagonal += a[[p, q]] * a[[p, q]];
            }
        }
        if off_diagonal.sqrt() <= JACOBI_TOLERANCE {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[[p, q]].abs() <= JACOBI_TOLERANCE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * a[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for j in 0..n {
                    let apj = a[[p, j]];
                    let aqj = a[[q, j]];
                    a[[p, j]] = c * apj - s * aqj;
                    a[[q, j]] = s * apj + c * aqj;
                }
                for i in 0..n {
                    let aip = a[[i, p]];
                    let aiq = a[[i, q]];
                    a[[i, p]] = c * aip - s * aiq;
                    a[[i, q]] = s * aip + c * aiq;
                }
                for i in 0..n {
                    let vip = v[[i, p]];
                    let viq = v[[i, q]];
                    v[[i, p]] = c * vip - s * viq;
                    v[[i, q]] = s * vip + c * viq;
                }
            }
        }
    }

    let eigenvalues: Vec<f64> = (0..n).map(|i| a[[i, i]]).collect();
    (eigenvalues, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn correlated_pool() -> Array2<f32> {
        // Points spread along the (1, 1) diagonal with small orthogonal
        // jitter, so the dominant axis is unambiguous.
        let mut pool = Array2::<f32>::zeros((40, 2));
        for i in 0..40 {
            let t = i as f32 - 20.0;
            let jitter = if i % 2 == 0 { 0.05 } else { -0.05 };
            pool[[i, 0]] = t + jitter;
            pool[[i, 1]] = t - jitter;
        }
        pool
    }

    #[test]
    fn fit_rejects_empty_pool() {
        let pool = Array2::<f32>::zeros((0, 32));
        let err = ProjectionModel::fit(pool.view(), 8).unwrap_err();
        assert!(matches!(err, AlignError::InsufficientData { .. }));
    }

    #[test]
    fn fit_clamps_dim_to_raw_width() {
        let pool = correlated_pool();
        let model = ProjectionModel::fit(pool.view(), 16).unwrap();
        assert_eq!(model.dim(), 2);
        assert_eq!(model.raw_dim(), 2);
    }

    #[test]
    fn dominant_axis_follows_the_variance() {
        let pool = correlated_pool();
        let model = ProjectionModel::fit(pool.view(), 1).unwrap();
        // First principal axis should be close to the normalized diagonal.
        let axis = [model.basis[[0, 0]], model.basis[[0, 1]]];
        let diagonal = std::f32::consts::FRAC_1_SQRT_2;
        let dot = (axis[0] * diagonal + axis[1] * diagonal).abs();
        assert!(dot > 0.99, "axis {axis:?} not aligned with diagonal");
    }

    #[test]
    fn whitened_projection_has_unit_variance() {
        let pool = correlated_pool();
        let model = ProjectionModel::fit(pool.view(), 2).unwrap();
        let projected = model.transform(pool.view());
        let variance = projected
            .column(0)
            .iter()
            .map(|v| v * v)
            .sum::<f32>()
            / pool.nrows() as f32;
        assert!((variance - 1.0).abs() < 0.05, "variance was {variance}");
    }

    #[test]
    fn transform_is_pure() {
        let pool = correlated_pool();
        let model = ProjectionModel::fit(pool.view(), 2).unwrap();
        let raw = array![[1.5f32, -0.5], [0.0, 0.25]];
        let first = model.transform(raw.view());
        let second = model.transform(raw.view());
        assert_eq!(first, second);
    }
}
