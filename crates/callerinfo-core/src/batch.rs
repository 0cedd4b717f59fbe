//! Batch rewriting of a class directory
//!
//! The runner discovers every `.class` file below the target directory, keeps
//! the ones the filter selects and rewrites them on a scoped worker pool fed by
//! a channel. Changed classes are written back through a temporary file in the
//! same directory, so an interrupted run never leaves a truncated class behind.

use crate::config::{Config, ConfigError};
use crate::driver::{rewrite_artifact, RewrittenArtifact};
use crate::error::RewriteError;
use crate::filter::ClassFilter;
use crate::rewriter::RewriteRules;
use crossbeam::channel;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that abort a batch run
#[derive(Debug, Error)]
pub enum BatchError {
    /// Target is missing or not a directory
    #[error("Path {0} is not a valid target/classes directory!")]
    TargetNotDirectory(PathBuf),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid discovery pattern
    #[error("Invalid class file pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// Reading or writing a file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A class could not be rewritten
    #[error("Failed to rewrite {path}: {source}")]
    Rewrite {
        /// Class file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: RewriteError,
    },

    /// A worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,
}

impl BatchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        BatchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A class that could not be rewritten in a `keep-going` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Class file
    pub path: PathBuf,
    /// Error message
    pub message: String,
}

/// What a batch run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Whether a configuration warning turned the run into a no-op
    pub skipped: bool,
    /// `.class` files found below the target
    pub scanned: usize,
    /// Files the filter selected
    pub selected: usize,
    /// Classes that changed (written back unless dry-run)
    pub rewritten: usize,
    /// Wrapped call sites over all classes
    pub call_sites: usize,
    /// Classes skipped after an error, sorted by path
    pub failures: Vec<Failure>,
}

struct Outcome {
    path: PathBuf,
    result: Result<RewrittenArtifact, BatchError>,
}

/// Rewrites every selected class below a target directory
#[derive(Debug, Clone)]
pub struct BatchRunner {
    config: Config,
}

impl BatchRunner {
    /// Create a runner for a configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The configuration this runner uses
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run over the configured target directory
    pub fn run(&self) -> Result<BatchSummary, BatchError> {
        let config = &self.config;

        let warnings = config.validate();
        for warning in &warnings {
            warn!("{}", warning);
        }
        if warnings.iter().any(|w| w.skips_run()) {
            return Ok(BatchSummary {
                skipped: true,
                ..BatchSummary::default()
            });
        }

        let (rules, filter) = config.rules()?;
        let target = &config.target;
        if !target.is_dir() {
            return Err(BatchError::TargetNotDirectory(target.clone()));
        }

        let targets: Vec<String> = rules.targets.iter().map(ToString::to_string).collect();
        info!(
            "Searching for {} usages in all .class files in {} with filterClasses='{:?}', injection='{}', includePackageName='{}'",
            targets.join(", "),
            target.display(),
            config.filters,
            config.injection,
            config.include_package_name
        );
        info!(
            "Make sure to add the MDC parameter '{}' to your logging pattern, otherwise they wont be printed in your logs",
            config.injection_key
        );

        let scanned = discover(target)?;
        let selected = select(&scanned, &filter);
        debug!(
            "{} class files found, {} selected",
            scanned.len(),
            selected.len()
        );

        let mut outcomes = self.rewrite_all(&selected, &rules)?;
        outcomes.sort_by(|a, b| a.path.cmp(&b.path));

        let mut summary = BatchSummary {
            scanned: scanned.len(),
            selected: selected.len(),
            ..BatchSummary::default()
        };
        for outcome in outcomes {
            match outcome.result {
                Ok(artifact) => {
                    if artifact.call_sites > 0 {
                        info!(
                            "{} - {} SLF4J log statements found",
                            artifact.class_name, artifact.call_sites
                        );
                    }
                    if artifact.changed {
                        summary.rewritten += 1;
                        summary.call_sites += artifact.call_sites;
                    }
                }
                Err(err) if config.runner.keep_going => {
                    warn!("Skipping {}: {}", outcome.path.display(), err);
                    summary.failures.push(Failure {
                        path: outcome.path,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    error!("{}", err);
                    return Err(err);
                }
            }
        }

        Ok(summary)
    }

    fn rewrite_all(
        &self,
        paths: &[PathBuf],
        rules: &RewriteRules,
    ) -> Result<Vec<Outcome>, BatchError> {
        let runner = &self.config.runner;
        let workers = runner.worker_count().min(paths.len().max(1));
        let abort = AtomicBool::new(false);
        let (job_tx, job_rx) = channel::unbounded::<&Path>();
        let (result_tx, result_rx) = channel::unbounded::<Outcome>();

        for path in paths {
            // Cannot fail, `job_rx` is still alive.
            let _ = job_tx.send(path.as_path());
        }
        drop(job_tx);

        crossbeam::scope(|scope| {
            for _ in 0..workers {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let abort = &abort;
                scope.spawn(move |_| {
                    for path in jobs.iter() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        let result = rewrite_file(path, rules, runner.dry_run);
                        if result.is_err() && !runner.keep_going {
                            abort.store(true, Ordering::Relaxed);
                        }
                        let outcome = Outcome {
                            path: path.to_path_buf(),
                            result,
                        };
                        if results.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
        })
        .map_err(|_| BatchError::WorkerPanicked)?;
        drop(result_tx);

        Ok(result_rx.iter().collect())
    }
}

/// All `.class` files below `target`, sorted
fn discover(target: &Path) -> Result<Vec<PathBuf>, BatchError> {
    // The directory itself may contain glob metacharacters.
    let root = glob::Pattern::escape(&target.to_string_lossy());
    let pattern = format!("{}/**/*.class", root.trim_end_matches('/'));
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            BatchError::io(&path, e.into())
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn rewrite_file(
    path: &Path,
    rules: &RewriteRules,
    dry_run: bool,
) -> Result<RewrittenArtifact, BatchError> {
    let bytes = std::fs::read(path).map_err(|e| BatchError::io(path, e))?;
    let artifact = rewrite_artifact(&bytes, rules).map_err(|source| BatchError::Rewrite {
        path: path.to_path_buf(),
        source,
    })?;
    if artifact.changed && !dry_run {
        write_atomically(path, &artifact.bytes).map_err(|e| BatchError::io(path, e))?;
    }
    Ok(artifact)
}

/// Replace `path` with `bytes` via a temporary file in the same directory
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// The discovered classes that `filter` selects, in discovery order
fn select(scanned: &[PathBuf], filter: &ClassFilter) -> Vec<PathBuf> {
    scanned
        .iter()
        .filter(|path| filter.select(path))
        .cloned()
        .collect()
}
