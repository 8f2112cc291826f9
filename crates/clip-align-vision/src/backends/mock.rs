use std::path::PathBuf;
use std::time::Duration;

use ndarray::Array2;
use tokio::sync::mpsc::Sender;

use crate::core::{
    DynFrameSourceProvider, FlowField, FrameSourceProvider, FrameStream, VideoMetadata, VisionOps,
    spawn_stream_from_channel,
};
use clip_align_types::{AlignResult, GrayFrame};

const MOCK_DESCRIPTOR_WIDTH: usize = 32;
const MOCK_KEYPOINTS: usize = 8;

/// Deterministic synthetic frame source.
///
/// Frame content is a pure function of `content_start + index`, so two
/// providers whose ranges overlap emit byte-identical frames for the shared
/// indices. Tests use this to cut a "query excerpt" out of a longer
/// "reference" without touching a real container.
pub struct MockProvider {
    _input: Option<PathBuf>,
    width: u32,
    height: u32,
    stride: usize,
    frame_count: usize,
    fps: f64,
    content_start: u64,
    channel_capacity: usize,
}

impl MockProvider {
    const DEFAULT_CHANNEL_CAPACITY: usize = 8;

    pub fn new(input: Option<PathBuf>, channel_capacity: Option<usize>) -> Self {
        Self {
            _input: input,
            width: 64,
            height: 48,
            stride: 64,
            frame_count: 120,
            fps: 30.0,
            content_start: 0,
            channel_capacity: channel_capacity
                .unwrap_or(Self::DEFAULT_CHANNEL_CAPACITY)
                .max(1),
        }
    }

    /// Synthetic clip spanning `frame_count` frames whose content begins at
    /// absolute content index `content_start`.
    pub fn synthetic(frame_count: usize, content_start: u64, fps: f64) -> Self {
        let mut provider = Self::new(None, None);
        provider.frame_count = frame_count;
        provider.content_start = content_start;
        provider.fps = fps;
        provider
    }

    fn render(&self, content_index: u64) -> Vec<u8> {
        let mut buffer = vec![0u8; self.stride * self.height as usize];
        for (row, chunk) in buffer.chunks_mut(self.stride).enumerate() {
            for (col, px) in chunk.iter_mut().enumerate().take(self.width as usize) {
                let value = row as u64 * 7 + col as u64 * 3 + content_index * 11;
                *px = (value % 256) as u8;
            }
        }
        buffer
    }

    fn emit_frames(&self, tx: Sender<AlignResult<GrayFrame>>) {
        let frame_seconds = if self.fps > 0.0 { 1.0 / self.fps } else { 0.0 };
        for index in 0..self.frame_count {
            if tx.is_closed() {
                break;
            }
            let content_index = self.content_start + index as u64;
            let timestamp = Some(Duration::from_secs_f64(index as f64 * frame_seconds));
            let frame = GrayFrame::from_owned(
                self.width,
                self.height,
                self.stride,
                timestamp,
                self.render(content_index),
            )
            .map(|frame| frame.with_frame_index(Some(index as u64)));
            if tx.blocking_send(frame).is_err() {
                break;
            }
        }
    }
}

impl FrameSourceProvider for MockProvider {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: Some(Duration::from_secs_f64(
                self.frame_count as f64 / self.fps.max(1.0),
            )),
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: Some(self.frame_count as u64),
        }
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            provider.emit_frames(tx);
        })
    }
}

pub fn boxed_mock(
    input: Option<PathBuf>,
    channel_capacity: Option<usize>,
) -> AlignResult<DynFrameSourceProvider> {
    Ok(Box::new(MockProvider::new(input, channel_capacity)))
}

/// Deterministic stand-in for the real detector and flow estimator.
///
/// Descriptors are sampled straight from the frame bytes, so identical frame
/// content always produces identical descriptors; flow is the brightness
/// delta between consecutive frames.
#[derive(Debug, Default)]
pub struct MockVisionOps;

impl VisionOps for MockVisionOps {
    fn descriptor_width(&self) -> usize {
        MOCK_DESCRIPTOR_WIDTH
    }

    fn detect(&self, frame: &GrayFrame) -> AlignResult<Option<Array2<f32>>> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let mut descriptors = Array2::<f32>::zeros((MOCK_KEYPOINTS, MOCK_DESCRIPTOR_WIDTH));
        for k in 0..MOCK_KEYPOINTS {
            let row = frame.row((k * height / MOCK_KEYPOINTS) as u32);
            for j in 0..MOCK_DESCRIPTOR_WIDTH {
                let col = j * width / MOCK_DESCRIPTOR_WIDTH;
                descriptors[[k, j]] = row[col] as f32 / 255.0;
            }
        }
        Ok(Some(descriptors))
    }

    fn flow(&self, prev: &GrayFrame, curr: &GrayFrame) -> AlignResult<FlowField> {
        let width = prev.width().min(curr.width());
        let height = prev.height().min(curr.height());
        let pixels = (width as usize) * (height as usize);
        let mut dx = Vec::with_capacity(pixels);
        let mut dy = Vec::with_capacity(pixels);
        for y in 0..height {
            let prev_row = prev.row(y);
            let curr_row = curr.row(y);
            for x in 0..width as usize {
                let delta = curr_row[x] as f32 - prev_row[x] as f32;
                dx.push(delta / 255.0);
                dy.push(0.0);
            }
        }
        Ok(FlowField {
            width,
            height,
            dx,
            dy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test(flavor = "multi_thread")]
    async fn mock_backend_emits_frames() {
        let provider = Box::new(MockProvider::new(None, None)) as DynFrameSourceProvider;
        let metadata = provider.metadata();
        assert_eq!(metadata.total_frames, Some(120));
        assert_eq!(metadata.fps, Some(30.0));

        let mut stream = provider.into_stream();
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.frame_index(), Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overlapping_content_ranges_match_byte_for_byte() {
        let reference = Box::new(MockProvider::synthetic(20, 0, 30.0));
        let excerpt = Box::new(MockProvider::synthetic(5, 10, 30.0));

        let ref_frames: Vec<_> = (reference as DynFrameSourceProvider)
            .into_stream()
            .collect::<Vec<_>>()
            .await;
        let query_frames: Vec<_> = (excerpt as DynFrameSourceProvider)
            .into_stream()
            .collect::<Vec<_>>()
            .await;

        let reference_tenth = ref_frames[10].as_ref().unwrap();
        let query_first = query_frames[0].as_ref().unwrap();
        assert_eq!(reference_tenth.data(), query_first.data());
    }

    #[test]
    fn mock_descriptors_are_content_deterministic() {
        let ops = MockVisionOps;
        let provider = MockProvider::synthetic(1, 42, 30.0);
        let frame = GrayFrame::from_owned(64, 48, 64, None, provider.render(42)).unwrap();
        let again = GrayFrame::from_owned(64, 48, 64, None, provider.render(42)).unwrap();
        let a = ops.detect(&frame).unwrap().unwrap();
        let b = ops.detect(&again).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ncols(), ops.descriptor_width());
    }
}
