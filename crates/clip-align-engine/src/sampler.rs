use std::path::{Path, PathBuf};

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use tokio_stream::StreamExt;

use crate::ops::fit_to_pixel_budget;
use clip_align_types::{
    AlignError, AlignResult, FrameSampleMapping, GrayFrame, MAPPING_SCHEMA_VERSION,
};
use clip_align_vision::DynFrameSourceProvider;

const MAPPING_FILENAME: &str = "mapping.json";
const FRAMES_DIRNAME: &str = "frames";

/// Deterministic fixed-step frame sampler.
///
/// Given a frame source, keeps every `step`-th frame where `step =
/// round(original_fps / target_fps)` floored at 1, downscales each kept frame
/// to the pixel budget, and persists both the frames and the
/// [`FrameSampleMapping`] under a per-video work directory. Re-running against
/// an existing mapping loads it verbatim and never opens the source again.
pub struct FrameSampler {
    target_fps: f64,
    max_pixels: u32,
}

impl FrameSampler {
    pub fn new(target_fps: f64, max_pixels: u32) -> Self {
        Self {
            target_fps,
            max_pixels,
        }
    }

    pub fn sampling_step(&self, original_fps: f64) -> u32 {
        if !(original_fps > 0.0) || !(self.target_fps > 0.0) {
            return 1;
        }
        let step = (original_fps / self.target_fps).round();
        if step < 1.0 { 1 } else { step as u32 }
    }

    /// Sample a video into `work_dir`, or load the existing output.
    ///
    /// `open` is only invoked when no persisted mapping exists, which is what
    /// makes this stage idempotent: the second run for the same work dir does
    /// not decode.
    pub async fn sample<F>(&self, work_dir: &Path, open: F) -> AlignResult<SampledVideo>
    where
        F: FnOnce() -> AlignResult<DynFrameSourceProvider>,
    {
        if let Some(existing) = load_mapping(work_dir).await? {
            return Ok(SampledVideo {
                mapping: existing,
                dir: work_dir.to_path_buf(),
            });
        }

        let provider = open()?;
        let metadata = provider.metadata();
        let original_fps = metadata.fps.unwrap_or(self.target_fps);
        let step = self.sampling_step(original_fps);

        let frames_dir = work_dir.join(FRAMES_DIRNAME);
        tokio::fs::create_dir_all(&frames_dir)
            .await
            .map_err(|err| AlignError::persist(&frames_dir, err.to_string()))?;

        let mut stream = provider.into_stream();
        let mut original_indices = Vec::new();
        let mut fallback_index: u64 = 0;
        while let Some(item) = stream.next().await {
            let frame = item?;
            let original_index = frame.frame_index().unwrap_or(fallback_index);
            fallback_index = original_index + 1;
            if original_index % step as u64 != 0 {
                continue;
            }
            let fitted = fit_to_pixel_budget(&frame, self.max_pixels);
            let path = frame_path(work_dir, original_indices.len());
            write_frame(&path, &fitted).await?;
            original_indices.push(original_index);
        }

        if original_indices.is_empty() {
            return Err(AlignError::insufficient_data(format!(
                "video produced no sampled frames under {}",
                work_dir.display()
            )));
        }

        let mapping = FrameSampleMapping::new(original_fps, step, original_indices);
        store_mapping(work_dir, &mapping).await?;
        Ok(SampledVideo {
            mapping,
            dir: work_dir.to_path_buf(),
        })
    }
}

/// A sampled video: its mapping plus the on-disk frame sequence.
///
/// Frames are re-read lazily from disk, one at a time, so consumers never hold
/// the whole video in memory and the sequence can be walked more than once.
#[derive(Debug)]
pub struct SampledVideo {
    mapping: FrameSampleMapping,
    dir: PathBuf,
}

impl SampledVideo {
    pub fn mapping(&self) -> &FrameSampleMapping {
        &self.mapping
    }

    pub fn into_mapping(self) -> FrameSampleMapping {
        self.mapping
    }

    pub fn frame_count(&self) -> usize {
        self.mapping.len()
    }

    pub fn frame_at(&self, sample_index: usize) -> AlignResult<GrayFrame> {
        let path = frame_path(&self.dir, sample_index);
        let decoded = image::open(&path)
            .map_err(|err| AlignError::persist(&path, err.to_string()))?
            .to_luma8();
        let (width, height) = decoded.dimensions();
        GrayFrame::from_owned(width, height, width as usize, None, decoded.into_raw()).map(
            |frame| {
                let original = self.mapping.original_frame(sample_index);
                frame.with_frame_index(original)
            },
        )
    }

    /// Ordered, lazy pass over the sampled frames.
    pub fn frames(&self) -> impl Iterator<Item = AlignResult<GrayFrame>> + '_ {
        (0..self.frame_count()).map(|index| self.frame_at(index))
    }
}

fn frame_path(dir: &Path, sample_index: usize) -> PathBuf {
    dir.join(FRAMES_DIRNAME)
        .join(format!("frame_{sample_index:06}.png"))
}

async fn write_frame(path: &Path, frame: &GrayFrame) -> AlignResult<()> {
    let width = frame.width();
    let height = frame.height();
    let mut packed = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        packed.extend_from_slice(frame.row(y));
    }
    let mut encoded = Vec::new();
    PngEncoder::new(&mut encoded)
        .write_image(&packed, width, height, image::ColorType::L8)
        .map_err(|err| AlignError::persist(path, err.to_string()))?;
    tokio::fs::write(path, encoded)
        .await
        .map_err(|err| AlignError::persist(path, err.to_string()))
}

async fn load_mapping(dir: &Path) -> AlignResult<Option<FrameSampleMapping>> {
    let path = dir.join(MAPPING_FILENAME);
    let contents = match tokio::fs::read(&path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(AlignError::persist(&path, err.to_string())),
    };
    let mapping: FrameSampleMapping = serde_json::from_slice(&contents)
        .map_err(|err| AlignError::persist(&path, err.to_string()))?;
    if mapping.schema_version != MAPPING_SCHEMA_VERSION {
        return Err(AlignError::persist(
            &path,
            format!(
                "unsupported mapping schema {} (expected {})",
                mapping.schema_version, MAPPING_SCHEMA_VERSION
            ),
        ));
    }
    Ok(Some(mapping))
}

async fn store_mapping(dir: &Path, mapping: &FrameSampleMapping) -> AlignResult<()> {
    let path = dir.join(MAPPING_FILENAME);
    let encoded = serde_json::to_vec_pretty(mapping)
        .map_err(|err| AlignError::persist(&path, err.to_string()))?;
    // Write-then-rename within the same directory keeps the artifact atomic.
    let staging = dir.join(format!("{MAPPING_FILENAME}.tmp"));
    tokio::fs::write(&staging, encoded)
        .await
        .map_err(|err| AlignError::persist(&staging, err.to_string()))?;
    tokio::fs::rename(&staging, &path)
        .await
        .map_err(|err| AlignError::persist(&path, err.to_string()))
}
