use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use ndarray::Array2;
use opencv::core::{self, Mat, Point2f, Ptr, Vector};
use opencv::features2d::{Feature2DTrait, ORB, ORB_ScoreType};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use opencv::{imgproc, video};
use tokio::sync::mpsc::Sender;

use crate::core::{
    DynFrameSourceProvider, FlowField, FrameSourceProvider, FrameStream, VideoMetadata, VisionOps,
    spawn_stream_from_channel,
};
use clip_align_types::{AlignError, AlignResult, GrayFrame};

const BACKEND: &str = "opencv";
const ORB_FEATURES: i32 = 500;
const ORB_DESCRIPTOR_WIDTH: usize = 32;

pub struct OpenCvProvider {
    input: PathBuf,
    capture: VideoCapture,
    metadata: VideoMetadata,
    channel_capacity: usize,
}

impl OpenCvProvider {
    const DEFAULT_CHANNEL_CAPACITY: usize = 8;

    pub fn new(input: PathBuf, channel_capacity: Option<usize>) -> AlignResult<Self> {
        let capture = VideoCapture::from_file(
            input.to_str().ok_or_else(|| {
                AlignError::configuration("input path is not valid UTF-8")
            })?,
            videoio::CAP_ANY,
        )
        .map_err(|err| AlignError::source_unavailable(&input, err.to_string()))?;
        let opened = capture
            .is_opened()
            .map_err(|err| AlignError::source_unavailable(&input, err.to_string()))?;
        if !opened {
            return Err(AlignError::source_unavailable(
                &input,
                "VideoCapture refused to open the file",
            ));
        }

        let metadata = Self::probe(&capture);
        Ok(Self {
            input,
            capture,
            metadata,
            channel_capacity: channel_capacity
                .unwrap_or(Self::DEFAULT_CHANNEL_CAPACITY)
                .max(1),
        })
    }

    fn probe(capture: &VideoCapture) -> VideoMetadata {
        let prop = |id: i32| capture.get(id).ok().filter(|value| *value > 0.0);
        let fps = prop(videoio::CAP_PROP_FPS);
        let total_frames = prop(videoio::CAP_PROP_FRAME_COUNT).map(|value| value as u64);
        let duration = match (fps, total_frames) {
            (Some(fps), Some(frames)) if fps > 0.0 => {
                Some(Duration::from_secs_f64(frames as f64 / fps))
            }
            _ => None,
        };
        VideoMetadata {
            duration,
            fps,
            width: prop(videoio::CAP_PROP_FRAME_WIDTH).map(|value| value as u32),
            height: prop(videoio::CAP_PROP_FRAME_HEIGHT).map(|value| value as u32),
            total_frames,
        }
    }

    fn emit_frames(mut self, tx: Sender<AlignResult<GrayFrame>>) {
        let mut bgr = Mat::default();
        let mut index: u64 = 0;
        let frame_seconds = self.metadata.fps.map(|fps| 1.0 / fps);
        loop {
            if tx.is_closed() {
                break;
            }
            match self.capture.read(&mut bgr) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    let _ = tx.blocking_send(Err(AlignError::source_unavailable(
                        &self.input,
                        err.to_string(),
                    )));
                    break;
                }
            }
            let timestamp = frame_seconds.map(|s| Duration::from_secs_f64(index as f64 * s));
            let frame = to_gray_frame(&bgr, index, timestamp);
            let stop = frame.is_err();
            if tx.blocking_send(frame).is_err() || stop {
                break;
            }
            index += 1;
        }
    }
}

impl FrameSourceProvider for OpenCvProvider {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            provider.emit_frames(tx);
        })
    }
}

pub fn boxed_opencv(
    input: PathBuf,
    channel_capacity: Option<usize>,
) -> AlignResult<DynFrameSourceProvider> {
    Ok(Box::new(OpenCvProvider::new(input, channel_capacity)?))
}

fn to_gray_frame(bgr: &Mat, index: u64, timestamp: Option<Duration>) -> AlignResult<GrayFrame> {
    let mut gray = Mat::default();
    imgproc::cvt_color(bgr, &mut gray, imgproc::COLOR_BGR2GRAY, 0)
        .map_err(|err| AlignError::InvalidFrame {
            reason: err.to_string(),
        })?;
    let width = gray.cols() as u32;
    let height = gray.rows() as u32;
    let data = gray
        .data_bytes()
        .map_err(|err| AlignError::InvalidFrame {
            reason: err.to_string(),
        })?
        .to_vec();
    GrayFrame::from_owned(width, height, width as usize, timestamp, data)
        .map(|frame| frame.with_frame_index(Some(index)))
}

fn gray_to_mat(frame: &GrayFrame) -> AlignResult<Mat> {
    let width = frame.width() as usize;
    let height = frame.height();
    let mut packed = Vec::with_capacity(width * height as usize);
    for y in 0..height {
        packed.extend_from_slice(frame.row(y));
    }
    Mat::from_slice(&packed)
        .and_then(|mat| mat.reshape(1, height as i32).map(|m| m.clone_pointee()))
        .map_err(|err| AlignError::InvalidFrame {
            reason: err.to_string(),
        })
}

pub struct OpenCvVisionOps {
    orb: Mutex<Ptr<ORB>>,
}

impl OpenCvVisionOps {
    pub fn new() -> AlignResult<Self> {
        let orb = ORB::create(
            ORB_FEATURES,
            1.2,
            8,
            31,
            0,
            2,
            ORB_ScoreType::HARRIS_SCORE,
            31,
            20,
        )
        .map_err(|err| AlignError::configuration(format!("{BACKEND}: {err}")))?;
        Ok(Self {
            orb: Mutex::new(orb),
        })
    }
}

impl VisionOps for OpenCvVisionOps {
    fn descriptor_width(&self) -> usize {
        ORB_DESCRIPTOR_WIDTH
    }

    fn detect(&self, frame: &GrayFrame) -> AlignResult<Option<Array2<f32>>> {
        let image = gray_to_mat(frame)?;
        let mut keypoints = Vector::<core::KeyPoint>::new();
        let mut descriptors = Mat::default();
        {
            let mut orb = self
                .orb
                .lock()
                .map_err(|_| AlignError::configuration(format!("{BACKEND}: ORB lock poisoned")))?;
            orb.detect_and_compute(
                &image,
                &core::no_array(),
                &mut keypoints,
                &mut descriptors,
                false,
            )
            .map_err(|err| AlignError::configuration(format!("{BACKEND}: {err}")))?;
        }
        let rows = descriptors.rows();
        if rows <= 0 {
            return Ok(None);
        }
        let bytes = descriptors
            .data_bytes()
            .map_err(|err| AlignError::configuration(format!("{BACKEND}: {err}")))?;
        let mut out = Array2::<f32>::zeros((rows as usize, ORB_DESCRIPTOR_WIDTH));
        for (i, row) in bytes.chunks_exact(ORB_DESCRIPTOR_WIDTH).enumerate() {
            for (j, &value) in row.iter().enumerate() {
                out[[i, j]] = value as f32;
            }
        }
        Ok(Some(out))
    }

    fn flow(&self, prev: &GrayFrame, curr: &GrayFrame) -> AlignResult<FlowField> {
        let prev_mat = gray_to_mat(prev)?;
        let curr_mat = gray_to_mat(curr)?;
        let mut flow = Mat::default();
        video::calc_optical_flow_farneback(
            &prev_mat, &curr_mat, &mut flow, 0.5, 3, 15, 3, 5, 1.2, 0,
        )
        .map_err(|err| AlignError::configuration(format!("{BACKEND}: {err}")))?;

        let width = flow.cols() as u32;
        let height = flow.rows() as u32;
        let vectors = flow
            .data_typed::<Point2f>()
            .map_err(|err| AlignError::configuration(format!("{BACKEND}: {err}")))?;
        let mut dx = Vec::with_capacity(vectors.len());
        let mut dy = Vec::with_capacity(vectors.len());
        for vector in vectors {
            dx.push(vector.x);
            dy.push(vector.y);
        }
        Ok(FlowField {
            width,
            height,
            dx,
            dy,
        })
    }
}
