pub mod align;
pub mod correlation;
pub mod descriptor;
pub mod ops;
pub mod projection;
pub mod sampler;

pub use align::{AlignmentOrchestrator, PairRequest, resolve_offset};
pub use correlation::{correlation_scores, transform_length};
pub use descriptor::{DescriptorExtractor, DescriptorMatrix};
pub use projection::ProjectionModel;
pub use sampler::{FrameSampler, SampledVideo};
