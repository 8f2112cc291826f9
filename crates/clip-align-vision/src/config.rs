use std::env;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::{DynFrameSourceProvider, VisionOps};
use clip_align_types::{AlignError, AlignResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    OpenCv,
}

impl FromStr for Backend {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "opencv" => Ok(Backend::OpenCv),
            other => Err(AlignError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::OpenCv => "opencv",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compiled_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-opencv")]
    {
        backends.push(Backend::OpenCv);
    }
    backends.push(Backend::Mock);
    backends
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    pub channel_capacity: Option<NonZeroUsize>,
}

impl Default for Configuration {
    fn default() -> Self {
        let backend = compiled_backends()
            .into_iter()
            .next()
            .unwrap_or(Backend::Mock);
        Self {
            backend,
            input: None,
            channel_capacity: None,
        }
    }
}

impl Configuration {
    pub fn from_env() -> AlignResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var("CLIPALIGN_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(path) = env::var("CLIPALIGN_INPUT") {
            config.input = Some(PathBuf::from(path));
        }
        if let Ok(capacity) = env::var("CLIPALIGN_CHANNEL_CAPACITY") {
            let parsed: usize = capacity.parse().map_err(|_| {
                AlignError::configuration(format!(
                    "failed to parse CLIPALIGN_CHANNEL_CAPACITY='{capacity}' as a positive integer"
                ))
            })?;
            let Some(value) = NonZeroUsize::new(parsed) else {
                return Err(AlignError::configuration(
                    "CLIPALIGN_CHANNEL_CAPACITY must be greater than zero",
                ));
            };
            config.channel_capacity = Some(value);
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn create_provider(&self) -> AlignResult<DynFrameSourceProvider> {
        let channel_capacity = self.channel_capacity.map(NonZeroUsize::get);

        match self.backend {
            Backend::Mock => crate::backends::mock::boxed_mock(self.input.clone(), channel_capacity),
            Backend::OpenCv => {
                #[cfg(feature = "backend-opencv")]
                {
                    let path = self.input.clone().ok_or_else(|| {
                        AlignError::configuration("opencv backend requires an input path")
                    })?;
                    crate::backends::opencv::boxed_opencv(path, channel_capacity)
                }
                #[cfg(not(feature = "backend-opencv"))]
                {
                    Err(AlignError::unsupported("opencv"))
                }
            }
        }
    }

    pub fn create_ops(&self) -> AlignResult<Arc<dyn VisionOps>> {
        match self.backend {
            Backend::Mock => Ok(Arc::new(crate::backends::mock::MockVisionOps::default())),
            Backend::OpenCv => {
                #[cfg(feature = "backend-opencv")]
                {
                    Ok(Arc::new(crate::backends::opencv::OpenCvVisionOps::new()?))
                }
                #[cfg(not(feature = "backend-opencv"))]
                {
                    Err(AlignError::unsupported("opencv"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_known_names() {
        assert_eq!(Backend::from_str("mock").unwrap(), Backend::Mock);
        assert_eq!(Backend::from_str("OpenCV").unwrap(), Backend::OpenCv);
        assert!(Backend::from_str("gstreamer").is_err());
    }

    #[test]
    fn mock_backend_is_always_compiled() {
        assert!(Configuration::available_backends().contains(&Backend::Mock));
    }
}
