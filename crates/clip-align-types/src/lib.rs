//! Shared domain models for the clip-align workspace.
//!
//! This crate centralizes lightweight data structures used across the vision,
//! engine, and CLI crates. Keep it backend-agnostic and avoid heavy
//! dependencies so all crates can depend on it without pulling native SDKs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AlignResult<T> = Result<T, AlignError>;

/// Current on-disk schema for [`FrameSampleMapping`].
pub const MAPPING_SCHEMA_VERSION: u32 = 1;

/// A single decoded grayscale frame.
///
/// Pixels are stored row-major with an explicit stride so backends can hand
/// over padded planes without copying. The buffer is shared; cloning a frame
/// is cheap.
#[derive(Clone)]
pub struct GrayFrame {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for GrayFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrayFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl GrayFrame {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> AlignResult<Self> {
        let required =
            stride
                .checked_mul(height as usize)
                .ok_or_else(|| AlignError::InvalidFrame {
                    reason: "calculated plane length overflowed".into(),
                })?;
        if data.len() < required {
            return Err(AlignError::InvalidFrame {
                reason: format!(
                    "insufficient plane bytes: got {} expected at least {}",
                    data.len(),
                    required
                ),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            timestamp,
            data: Arc::from(data.into_boxed_slice()),
            frame_index: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Row `y` of the frame, trimmed to `width` pixels.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize]
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }
}

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("cannot open video source {path}: {message}")]
    SourceUnavailable { path: PathBuf, message: String },

    #[error("cannot read or write artifact {path}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("descriptor width mismatch: query has {query}, reference has {reference}")]
    DimensionMismatch { query: usize, reference: usize },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AlignError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn source_unavailable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn persist(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persist {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Persisted record tying sampled frames back to the original video timeline.
///
/// `original_indices[i]` is the index, in the source video's own frame
/// numbering, of the `i`-th sampled frame. The sequence is strictly
/// increasing; for the constant-step sampler it equals `i * sampling_step`.
/// Written once per video and reused verbatim on later runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSampleMapping {
    pub schema_version: u32,
    pub original_fps: f64,
    pub sampling_step: u32,
    pub original_indices: Vec<u64>,
}

impl FrameSampleMapping {
    pub fn new(original_fps: f64, sampling_step: u32, original_indices: Vec<u64>) -> Self {
        Self {
            schema_version: MAPPING_SCHEMA_VERSION,
            original_fps,
            sampling_step,
            original_indices,
        }
    }

    /// Number of sampled frames covered by this mapping.
    pub fn len(&self) -> usize {
        self.original_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original_indices.is_empty()
    }

    /// Original frame index of the sampled frame at `sampled_offset`.
    pub fn original_frame(&self, sampled_offset: usize) -> Option<u64> {
        self.original_indices.get(sampled_offset).copied()
    }

    /// Timestamp in seconds of the sampled frame at `sampled_offset`.
    pub fn original_seconds(&self, sampled_offset: usize) -> Option<f64> {
        if self.original_fps <= 0.0 {
            return None;
        }
        self.original_frame(sampled_offset)
            .map(|frame| frame as f64 / self.original_fps)
    }
}

/// Outcome of aligning one query/reference pair.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentResult {
    pub pair_id: String,
    /// Best offset in sampled-frame units of the reference, after wrap-around
    /// correction and the forward-shift clamp.
    pub offset_sampled_frames: i64,
    pub offset_original_frames: u64,
    pub offset_seconds: f64,
}

/// Tunables shared by every pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentConfig {
    /// Target sampling rate in frames per second.
    pub target_fps: f64,
    /// Per-frame pixel budget; larger frames are downscaled, never upscaled.
    pub max_pixels: u32,
    /// Output dimension of the appearance projection.
    pub pca_dim: usize,
    /// Number of orientation bins in the motion histogram.
    pub motion_bins: usize,
    /// Regularization added to the query energy spectrum before division.
    pub lambda: f32,
    /// Reuse the projection fitted for the first query across later pairs.
    pub reuse_projection: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            target_fps: 5.0,
            max_pixels: 320 * 240,
            pca_dim: 16,
            motion_bins: 8,
            lambda: 0.1,
            reuse_projection: true,
        }
    }
}

impl AlignmentConfig {
    pub fn validate(&self) -> AlignResult<()> {
        if !(self.target_fps > 0.0) {
            return Err(AlignError::configuration(
                "target_fps must be greater than zero",
            ));
        }
        if self.max_pixels == 0 {
            return Err(AlignError::configuration(
                "max_pixels must be greater than zero",
            ));
        }
        if self.pca_dim == 0 {
            return Err(AlignError::configuration(
                "pca_dim must be greater than zero",
            ));
        }
        if self.motion_bins == 0 {
            return Err(AlignError::configuration(
                "motion_bins must be greater than zero",
            ));
        }
        if !(self.lambda >= 0.0) {
            return Err(AlignError::configuration("lambda must be non-negative"));
        }
        Ok(())
    }

    /// Width of one frame descriptor: appearance part plus motion part.
    pub fn descriptor_width(&self) -> usize {
        self.pca_dim + self.motion_bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_short_buffer() {
        let err = GrayFrame::from_owned(4, 4, 4, None, vec![0; 8]).unwrap_err();
        assert!(matches!(err, AlignError::InvalidFrame { .. }));
    }

    #[test]
    fn frame_row_respects_stride() {
        let mut data = vec![0u8; 6 * 2];
        data[6] = 7;
        let frame = GrayFrame::from_owned(4, 2, 6, None, data).unwrap();
        assert_eq!(frame.row(1), &[7, 0, 0, 0]);
    }

    #[test]
    fn mapping_resolves_original_frame_and_time() {
        let mapping = FrameSampleMapping::new(30.0, 3, vec![0, 3, 6, 9, 12, 15]);
        assert_eq!(mapping.len(), 6);
        assert_eq!(mapping.original_frame(5), Some(15));
        assert_eq!(mapping.original_seconds(5), Some(0.5));
        assert_eq!(mapping.original_frame(6), None);
    }

    #[test]
    fn mapping_round_trips_through_json() {
        let mapping = FrameSampleMapping::new(29.97, 6, vec![0, 6, 12]);
        let encoded = serde_json::to_string(&mapping).unwrap();
        let decoded: FrameSampleMapping = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, mapping);
        assert_eq!(decoded.schema_version, MAPPING_SCHEMA_VERSION);
    }

    #[test]
    fn config_validation_catches_bad_values() {
        let mut config = AlignmentConfig::default();
        assert!(config.validate().is_ok());
        config.target_fps = 0.0;
        assert!(config.validate().is_err());
        config = AlignmentConfig::default();
        config.motion_bins = 0;
        assert!(config.validate().is_err());
    }
}
