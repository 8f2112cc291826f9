use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::stream::unfold;
use ndarray::Array2;
use tokio::sync::mpsc::{self, Sender};

use clip_align_types::{AlignResult, GrayFrame};

pub type FrameStream = Pin<Box<dyn Stream<Item = AlignResult<GrayFrame>> + Send>>;

pub type DynFrameSourceProvider = Box<dyn FrameSourceProvider>;

#[derive(Debug, Clone, Copy, Default)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

/// A source of decoded grayscale frames, in presentation order.
pub trait FrameSourceProvider: Send + 'static {
    fn metadata(&self) -> VideoMetadata;

    fn into_stream(self: Box<Self>) -> FrameStream;
}

/// Dense optical flow between two consecutive frames, one (dx, dy) vector per
/// pixel, row-major.
#[derive(Debug, Clone)]
pub struct FlowField {
    pub width: u32,
    pub height: u32,
    pub dx: Vec<f32>,
    pub dy: Vec<f32>,
}

impl FlowField {
    pub fn len(&self) -> usize {
        self.dx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dx.is_empty()
    }
}

/// Black-box per-frame vision capabilities consumed by the engine.
///
/// Implementations are pure with respect to their inputs; degenerate outputs
/// (no keypoints found) are expressed as `None`, not errors.
pub trait VisionOps: Send + Sync + 'static {
    /// Raw descriptor width produced by [`VisionOps::detect`].
    fn descriptor_width(&self) -> usize;

    /// Detect local keypoints and return their raw descriptors as one row per
    /// keypoint, or `None` when the frame yields no keypoints.
    fn detect(&self, frame: &GrayFrame) -> AlignResult<Option<Array2<f32>>>;

    /// Estimate dense optical flow from `prev` to `curr`.
    fn flow(&self, prev: &GrayFrame, curr: &GrayFrame) -> AlignResult<FlowField>;
}

/// Bridge a blocking decode loop into a bounded async stream.
pub fn spawn_stream_from_channel(
    capacity: usize,
    task: impl FnOnce(Sender<AlignResult<GrayFrame>>) + Send + 'static,
) -> FrameStream {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::task::spawn_blocking(move || task(tx));
    let stream = unfold(rx, |mut receiver| async {
        receiver.recv().await.map(|item| (item, receiver))
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_stream_from_channel_pushes_values() {
        let stream = spawn_stream_from_channel(2, move |tx| {
            tx.blocking_send(GrayFrame::from_owned(2, 2, 2, None, vec![1, 2, 3, 4]))
                .unwrap();
        });
        let mut stream = stream;
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame.data(), &[1, 2, 3, 4]);
    }
}
