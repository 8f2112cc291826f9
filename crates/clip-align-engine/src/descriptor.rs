use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};

use crate::projection::ProjectionModel;
use crate::sampler::SampledVideo;
use clip_align_types::{AlignResult, GrayFrame};
use clip_align_vision::{FlowField, VisionOps};

const NORM_EPSILON: f32 = 1e-6;

/// One row per sampled frame, `pca_dim + motion_bins` columns.
pub type DescriptorMatrix = Array2<f32>;

/// Pool raw keypoint descriptors across every sampled frame of a video.
///
/// This is the input to [`ProjectionModel::fit`]; frames without keypoints
/// contribute nothing.
pub fn collect_descriptor_pool(
    ops: &dyn VisionOps,
    video: &SampledVideo,
) -> AlignResult<Array2<f32>> {
    let raw_dim = ops.descriptor_width();
    let mut pool = Array2::<f32>::zeros((0, raw_dim));
    for frame in video.frames() {
        let frame = frame?;
        if let Some(descriptors) = ops.detect(&frame)? {
            for row in descriptors.rows() {
                pool.push_row(row).expect("descriptor rows share one width");
            }
        }
    }
    Ok(pool)
}

/// Computes one fixed-length signature per sampled frame.
///
/// The appearance half is the mean of the frame's keypoint descriptors after
/// projection through the frozen model; the motion half is an
/// orientation-binned histogram of dense optical flow against the previous
/// frame. Only the immediately preceding frame is retained while walking the
/// sequence.
pub struct DescriptorExtractor {
    model: Arc<ProjectionModel>,
    ops: Arc<dyn VisionOps>,
    motion_bins: usize,
}

impl DescriptorExtractor {
    pub fn new(model: Arc<ProjectionModel>, ops: Arc<dyn VisionOps>, motion_bins: usize) -> Self {
        Self {
            model,
            ops,
            motion_bins,
        }
    }

    pub fn descriptor_width(&self) -> usize {
        self.model.dim() + self.motion_bins
    }

    pub fn extract(&self, video: &SampledVideo) -> AlignResult<DescriptorMatrix> {
        let width = self.descriptor_width();
        let mut matrix = Array2::<f32>::zeros((video.frame_count(), width));
        let mut previous: Option<GrayFrame> = None;

        for (index, frame) in video.frames().enumerate() {
            let frame = frame?;
            let appearance = self.appearance(&frame)?;
            let motion = match previous.as_ref() {
                Some(prev) => {
                    let flow = self.ops.flow(prev, &frame)?;
                    motion_histogram(&flow, self.motion_bins)
                }
                None => vec![0.0; self.motion_bins],
            };

            let mut descriptor = matrix.row_mut(index);
            for (j, value) in appearance.iter().enumerate() {
                descriptor[j] = *value;
            }
            for (j, value) in motion.iter().enumerate() {
                descriptor[self.model.dim() + j] = *value;
            }
            l2_normalize(descriptor.as_slice_mut().expect("row is contiguous"));

            previous = Some(frame);
        }
        Ok(matrix)
    }

    /// Mean projected keypoint descriptor, or the zero vector when the frame
    /// has no keypoints.
    fn appearance(&self, frame: &GrayFrame) -> AlignResult<Array1<f32>> {
        match self.ops.detect(frame)? {
            Some(raw) if raw.nrows() > 0 => {
                let projected = self.model.transform(raw.view());
                Ok(projected
                    .mean_axis(Axis(0))
                    .expect("projected matrix is non-empty"))
            }
            _ => Ok(Array1::zeros(self.model.dim())),
        }
    }
}

/// Magnitude-weighted histogram of flow orientations over `bins` equal-width
/// angular bins spanning [0°, 360°), normalized to sum 1. All-zero when the
/// field carries no magnitude; that is an expected degenerate input, not an
/// error.
pub fn motion_histogram(flow: &FlowField, bins: usize) -> Vec<f32> {
    let mut histogram = vec![0.0f32; bins];
    if bins == 0 {
        return histogram;
    }
    let bin_width = 360.0 / bins as f32;
    let mut total = 0.0f32;
    for (&dx, &dy) in flow.dx.iter().zip(flow.dy.iter()) {
        let magnitude = (dx * dx + dy * dy).sqrt();
        if magnitude <= 0.0 {
            continue;
        }
        let mut angle = dy.atan2(dx).to_degrees();
        if angle < 0.0 {
            angle += 360.0;
        }
        let bin = ((angle / bin_width) as usize).min(bins - 1);
        histogram[bin] += magnitude;
        total += magnitude;
    }
    if total > 0.0 {
        for value in &mut histogram {
            *value /= total;
        }
    }
    histogram
}

/// Scale to unit norm, unless the vector is effectively zero already.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= NORM_EPSILON {
        return;
    }
    for value in values.iter_mut() {
        *value /= norm;
    }
}
