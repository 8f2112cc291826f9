mod cli;
mod report;
mod settings;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::{AbortHandle, Abortable};
use indicatif::{ProgressBar, ProgressStyle};

use clip_align_engine::align::{AlignmentOrchestrator, PairOutcome, PairRequest, VideoSource};
use clip_align_types::{AlignError, AlignResult};
use clip_align_vision::{Backend, Configuration};

use cli::parse_cli;
use report::{PairRecord, write_report};
use settings::{EffectiveSettings, resolve_settings};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AlignResult<()> {
    let (args, sources) = parse_cli();

    if args.list_backends {
        print_available_backends();
        return Ok(());
    }

    let settings = match resolve_settings(&args, &sources) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if args.queries.is_empty() {
        return Err(AlignError::configuration(
            "at least one --query/--reference pair is required",
        ));
    }
    if args.queries.len() != args.references.len() {
        return Err(AlignError::configuration(format!(
            "got {} queries but {} references; each --query needs one --reference",
            args.queries.len(),
            args.references.len()
        )));
    }

    let backend = resolve_backend(&settings)?;
    let base_config = Configuration {
        backend,
        input: None,
        channel_capacity: None,
    };
    let ops = base_config.create_ops()?;

    let mut work_dirs = WorkDirAllocator::new(settings.work_dir.clone());
    let mut pairs = Vec::with_capacity(args.queries.len());
    for (query, reference) in args.queries.iter().zip(args.references.iter()) {
        let pair_id = format!(
            "{}~{}",
            display_name(query),
            display_name(reference)
        );
        pairs.push(PairRequest {
            pair_id,
            query: video_source(&base_config, query, work_dirs.dir_for(query)),
            reference: video_source(&base_config, reference, work_dirs.dir_for(reference)),
        });
    }

    let mut orchestrator = AlignmentOrchestrator::new(settings.align, ops)?;

    let (abort_handle, abort_reg) = AbortHandle::new_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_handle.abort();
        }
    });

    let progress = ProgressBar::new(pairs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let run = async {
        let mut outcomes: Vec<PairOutcome> = Vec::with_capacity(pairs.len());
        for pair in pairs {
            progress.set_message(pair.pair_id.clone());
            let pair_id = pair.pair_id.clone();
            let outcome = orchestrator.align_pair(pair).await;
            if let Err(err) = &outcome {
                eprintln!("pair '{pair_id}' failed: {err}");
            }
            outcomes.push(PairOutcome { pair_id, outcome });
            progress.inc(1);
        }
        outcomes
    };

    let outcomes = match Abortable::new(run, abort_reg).await {
        Ok(outcomes) => outcomes,
        Err(_aborted) => {
            progress.abandon_with_message("interrupted");
            eprintln!("interrupted before all pairs completed");
            std::process::exit(130);
        }
    };
    progress.finish_and_clear();

    for outcome in &outcomes {
        match &outcome.outcome {
            Ok(result) => println!(
                "{}: offset {} frames ({:.3}s)",
                outcome.pair_id, result.offset_original_frames, result.offset_seconds
            ),
            Err(err) => println!("{}: failed ({err})", outcome.pair_id),
        }
    }

    let records: Vec<PairRecord> = outcomes.iter().map(PairRecord::from).collect();
    write_report(&settings.report, &records).await?;
    println!("report written to {}", settings.report.display());

    if outcomes.iter().any(|outcome| outcome.outcome.is_err()) {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_backend(settings: &EffectiveSettings) -> AlignResult<Backend> {
    let backend = match settings.backend.as_deref() {
        Some(name) => Backend::from_str(name)?,
        None => Configuration::from_env().unwrap_or_default().backend,
    };
    let available = Configuration::available_backends();
    if !available.contains(&backend) {
        return Err(AlignError::unsupported(backend.as_str()));
    }
    Ok(backend)
}

fn video_source(base: &Configuration, input: &Path, work_dir: PathBuf) -> VideoSource {
    let config = base.clone().with_input(input);
    VideoSource {
        work_dir,
        open: Box::new(move || config.create_provider()),
    }
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Assigns each distinct video path a stable work directory, so a reference
/// shared by several pairs is sampled once and its mapping reused.
struct WorkDirAllocator {
    root: PathBuf,
    assigned: HashMap<PathBuf, PathBuf>,
}

impl WorkDirAllocator {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            assigned: HashMap::new(),
        }
    }

    fn dir_for(&mut self, video: &Path) -> PathBuf {
        if let Some(dir) = self.assigned.get(video) {
            return dir.clone();
        }
        let index = self.assigned.len();
        let dir = self
            .root
            .join(format!("{index:03}-{}", display_name(video)));
        self.assigned.insert(video.to_path_buf(), dir.clone());
        dir
    }
}

fn print_available_backends() {
    println!("available backends:");
    for backend in Configuration::available_backends() {
        println!("  {backend}");
    }
}
