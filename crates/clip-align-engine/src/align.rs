use std::path::PathBuf;
use std::sync::Arc;

use crate::correlation::correlation_scores;
use crate::descriptor::{DescriptorExtractor, collect_descriptor_pool};
use crate::projection::ProjectionModel;
use crate::sampler::FrameSampler;
use clip_align_types::{AlignError, AlignResult, AlignmentConfig, AlignmentResult};
use clip_align_vision::{DynFrameSourceProvider, VisionOps};

/// One video to be sampled: where its artifacts live and how to open it.
///
/// `open` is deferred so the sampler can skip decoding entirely when the work
/// directory already holds a mapping.
pub struct VideoSource {
    pub work_dir: PathBuf,
    pub open: Box<dyn FnOnce() -> AlignResult<DynFrameSourceProvider> + Send>,
}

pub struct PairRequest {
    pub pair_id: String,
    pub query: VideoSource,
    pub reference: VideoSource,
}

/// Outcome of one pair in a batch; failures are isolated per pair.
pub struct PairOutcome {
    pub pair_id: String,
    pub outcome: AlignResult<AlignmentResult>,
}

/// Sequences sampler, projection, extraction, and correlation for
/// query/reference pairs.
///
/// Whether the projection fitted for the first query is reused for later
/// pairs is the explicit `reuse_projection` configuration switch; there is no
/// hidden fit-on-first-use state beyond it.
pub struct AlignmentOrchestrator {
    config: AlignmentConfig,
    ops: Arc<dyn VisionOps>,
    projection: Option<Arc<ProjectionModel>>,
}

impl AlignmentOrchestrator {
    pub fn new(config: AlignmentConfig, ops: Arc<dyn VisionOps>) -> AlignResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ops,
            projection: None,
        })
    }

    pub async fn align_pair(&mut self, pair: PairRequest) -> AlignResult<AlignmentResult> {
        let sampler = FrameSampler::new(self.config.target_fps, self.config.max_pixels);
        let query = sampler.sample(&pair.query.work_dir, pair.query.open).await?;
        let reference = sampler
            .sample(&pair.reference.work_dir, pair.reference.open)
            .await?;

        let model = match self.projection.clone() {
            Some(model) if self.config.reuse_projection => model,
            _ => {
                let pool = collect_descriptor_pool(self.ops.as_ref(), &query)?;
                if pool.nrows() == 0 {
                    return Err(AlignError::insufficient_data(format!(
                        "query '{}' yielded no keypoint descriptors to fit a projection",
                        pair.pair_id
                    )));
                }
                let model = Arc::new(ProjectionModel::fit(pool.view(), self.config.pca_dim)?);
                if self.config.reuse_projection {
                    self.projection = Some(Arc::clone(&model));
                }
                model
            }
        };

        let extractor =
            DescriptorExtractor::new(model, Arc::clone(&self.ops), self.config.motion_bins);
        let query_matrix = extractor.extract(&query)?;
        let reference_matrix = extractor.extract(&reference)?;

        let scores = correlation_scores(
            query_matrix.view(),
            reference_matrix.view(),
            self.config.lambda,
        )?;

        let corrected = resolve_offset(&scores);
        // Policy: only forward shifts of the reference relative to the query
        // are considered valid; negative offsets clamp to the reference start.
        let clamped = corrected.max(0) as usize;

        let mapping = reference.mapping();
        // A peak inside the zero-padded tail maps to the last sampled frame.
        let sampled_offset = clamped.min(mapping.len().saturating_sub(1));
        let original_frame = mapping.original_frame(sampled_offset).ok_or_else(|| {
            AlignError::insufficient_data(format!(
                "reference for '{}' has an empty sample mapping",
                pair.pair_id
            ))
        })?;
        let seconds = mapping.original_seconds(sampled_offset).unwrap_or(0.0);

        Ok(AlignmentResult {
            pair_id: pair.pair_id,
            offset_sampled_frames: sampled_offset as i64,
            offset_original_frames: original_frame,
            offset_seconds: seconds,
        })
    }

    /// Align every pair in order. A failure on one pair never aborts the
    /// rest; each outcome is reported individually.
    pub async fn align_batch(&mut self, pairs: Vec<PairRequest>) -> Vec<PairOutcome> {
        let mut outcomes = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let pair_id = pair.pair_id.clone();
            let outcome = self.align_pair(pair).await;
            outcomes.push(PairOutcome { pair_id, outcome });
        }
        outcomes
    }
}

/// Argmax of the score sequence with circular wrap-around correction.
///
/// Scores past `N/2` represent negative offsets in the periodic correlation;
/// they come back as negative values here and are clamped by the caller's
/// offset policy.
pub fn resolve_offset(scores: &[f32]) -> i64 {
    let n = scores.len();
    if n == 0 {
        return 0;
    }
    let raw = scores
        .iter()
        .enumerate()
        .max_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    if raw > n / 2 {
        raw as i64 - n as i64
    } else {
        raw as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_around_maps_tail_peaks_to_negative_offsets() {
        let mut scores = vec![0.0f32; 1024];
        scores[1023] = 1.0;
        assert_eq!(resolve_offset(&scores), -1);
        assert_eq!(resolve_offset(&scores).max(0), 0);
    }

    #[test]
    fn leading_peaks_stay_positive() {
        let mut scores = vec![0.0f32; 1024];
        scores[195] = 1.0;
        assert_eq!(resolve_offset(&scores), 195);
    }

    #[test]
    fn midpoint_is_not_wrapped() {
        let mut scores = vec![0.0f32; 8];
        scores[4] = 1.0;
        assert_eq!(resolve_offset(&scores), 4);
        scores[4] = 0.0;
        scores[5] = 1.0;
        assert_eq!(resolve_offset(&scores), -3);
    }

    #[test]
    fn empty_scores_resolve_to_zero() {
        assert_eq!(resolve_offset(&[]), 0);
    }
}
