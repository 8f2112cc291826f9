use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::{CliArgs, CliSources};
use clip_align_types::AlignmentConfig;

const DEFAULT_WORK_DIR: &str = "clip-align-work";
const DEFAULT_REPORT: &str = "alignment.json";
const PROJECT_CONFIG: &str = "clip-align.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<String>,
    work_dir: Option<String>,
    report: Option<String>,
    target_fps: Option<f64>,
    max_pixels: Option<u32>,
    pca_dim: Option<usize>,
    motion_bins: Option<usize>,
    lambda: Option<f32>,
    reuse_projection: Option<bool>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub backend: Option<String>,
    pub work_dir: PathBuf,
    pub report: PathBuf,
    pub align: AlignmentConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    let Some(project_path) = env::current_dir()
        .ok()
        .map(|dir| dir.join(PROJECT_CONFIG))
    else {
        return Ok((FileConfig::default(), None));
    };
    if !project_path.exists() {
        return Ok((FileConfig::default(), None));
    }
    let config = read_config(&project_path)?;
    Ok((config, Some(project_path)))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let mut backend = normalize_string(cli.backend.clone());
    if backend.is_none() {
        backend = normalize_string(file.backend);
    }

    let work_dir = cli
        .work_dir
        .clone()
        .or_else(|| normalize_string(file.work_dir).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

    let report = cli
        .report
        .clone()
        .or_else(|| normalize_string(file.report).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT));

    let mut align = AlignmentConfig {
        target_fps: cli.target_fps,
        max_pixels: cli.max_pixels,
        pca_dim: cli.pca_dim,
        motion_bins: cli.motion_bins,
        lambda: cli.lambda,
        reuse_projection: cli.reuse_projection,
    };

    if !sources.target_fps_from_cli {
        if let Some(value) = file.target_fps {
            if !(value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "target_fps",
                    value: value.to_string(),
                });
            }
            align.target_fps = value;
        }
    }
    if !sources.max_pixels_from_cli {
        if let Some(value) = file.max_pixels {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "max_pixels",
                    value: value.to_string(),
                });
            }
            align.max_pixels = value;
        }
    }
    if !sources.pca_dim_from_cli {
        if let Some(value) = file.pca_dim {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "pca_dim",
                    value: value.to_string(),
                });
            }
            align.pca_dim = value;
        }
    }
    if !sources.motion_bins_from_cli {
        if let Some(value) = file.motion_bins {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "motion_bins",
                    value: value.to_string(),
                });
            }
            align.motion_bins = value;
        }
    }
    if !sources.lambda_from_cli {
        if let Some(value) = file.lambda {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "lambda",
                    value: value.to_string(),
                });
            }
            align.lambda = value;
        }
    }
    if !sources.reuse_projection_from_cli {
        if let Some(value) = file.reuse_projection {
            align.reuse_projection = value;
        }
    }

    Ok(EffectiveSettings {
        backend,
        work_dir,
        report,
        align,
    })
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
