pub mod backends;
pub mod config;
pub mod core;

pub use config::{Backend, Configuration};
pub use core::{
    DynFrameSourceProvider, FlowField, FrameSourceProvider, FrameStream, VideoMetadata, VisionOps,
    spawn_stream_from_channel,
};
