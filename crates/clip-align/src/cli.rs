use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};

/// Which tunables were given on the command line, as opposed to falling back
/// to their clap defaults. Needed so the config file can fill gaps without
/// being shadowed by defaults.
#[derive(Debug, Default)]
pub struct CliSources {
    pub target_fps_from_cli: bool,
    pub max_pixels_from_cli: bool,
    pub pca_dim_from_cli: bool,
    pub motion_bins_from_cli: bool,
    pub lambda_from_cli: bool,
    pub reuse_projection_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            target_fps_from_cli: value_from_cli(matches, "target_fps"),
            max_pixels_from_cli: value_from_cli(matches, "max_pixels"),
            pca_dim_from_cli: value_from_cli(matches, "pca_dim"),
            motion_bins_from_cli: value_from_cli(matches, "motion_bins"),
            lambda_from_cli: value_from_cli(matches, "lambda"),
            reuse_projection_from_cli: value_from_cli(matches, "reuse_projection"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "clip-align",
    about = "Locate where short query clips fall inside longer reference videos",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Query clip path; repeat for multiple pairs
    #[arg(long = "query", value_name = "FILE")]
    pub queries: Vec<PathBuf>,

    /// Reference video path; one per --query, in the same order
    #[arg(long = "reference", value_name = "FILE")]
    pub references: Vec<PathBuf>,

    /// Lock decoding and vision to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Directory for sampled frames and mapping artifacts
    #[arg(long = "work-dir")]
    pub work_dir: Option<PathBuf>,

    /// Path of the JSON alignment report
    #[arg(long = "report", value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Print the list of available backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// Frame sampling rate in frames per second
    #[arg(long = "target-fps", default_value_t = 5.0)]
    pub target_fps: f64,

    /// Per-frame pixel budget; larger frames are downscaled
    #[arg(
        long = "max-pixels",
        default_value_t = 320 * 240,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_pixels: u32,

    /// Appearance projection dimension
    #[arg(long = "pca-dim", default_value_t = 16)]
    pub pca_dim: usize,

    /// Number of motion-histogram orientation bins
    #[arg(long = "motion-bins", default_value_t = 8)]
    pub motion_bins: usize,

    /// Correlation regularization constant
    #[arg(long = "lambda", default_value_t = 0.1)]
    pub lambda: f32,

    /// Reuse the projection fitted for the first query across all pairs
    #[arg(
        long = "reuse-projection",
        action = clap::ArgAction::Set,
        default_value_t = true
    )]
    pub reuse_projection: bool,
}
