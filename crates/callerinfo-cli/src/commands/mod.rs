//! CLI command implementations

pub mod inject;
pub mod show_config;

use anyhow::Context;
use callerinfo_core::{Config, Level, CONFIG_FILE};
use clap::Args;
use std::path::{Path, PathBuf};

/// Configuration file plus command-line overrides
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Configuration file [default: ./callerinfo.toml if present]
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory with compiled classes
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Injected value, with %class, %method and %line
    #[arg(long, value_name = "TEMPLATE")]
    pub injection: Option<String>,

    /// MDC key for the injected value
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// Keep the package path in %class
    #[arg(long)]
    pub include_package_name: bool,

    /// Logger level to instrument (repeatable)
    #[arg(long = "level", value_name = "LEVEL")]
    pub levels: Vec<Level>,

    /// Explicit owner#methodPattern to instrument instead of logger levels (repeatable)
    #[arg(long = "injected-method", value_name = "METHOD")]
    pub injected_methods: Vec<String>,

    /// Class name pattern to include (repeatable)
    #[arg(long = "include", value_name = "REGEX")]
    pub includes: Vec<String>,

    /// Class name pattern to exclude (repeatable)
    #[arg(long = "exclude", value_name = "REGEX")]
    pub excludes: Vec<String>,

    /// Do not emit MDC.put before log statements
    #[arg(long)]
    pub no_inject: bool,

    /// Do not emit MDC.remove after log statements
    #[arg(long)]
    pub no_remove: bool,

    /// Worker threads (0 = one per CPU)
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Skip classes that fail to rewrite
    #[arg(long)]
    pub keep_going: bool,

    /// Rewrite in memory only
    #[arg(long)]
    pub dry_run: bool,
}

impl ConfigArgs {
    /// Load the configuration file, if any, and apply the overrides
    pub fn load(&self) -> anyhow::Result<Config> {
        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.is_file()),
        };
        let config = match path {
            Some(path) => load_file(&path)?,
            None => Config::default(),
        };
        Ok(self.apply(config))
    }

    fn apply(&self, mut config: Config) -> Config {
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(injection) = &self.injection {
            config.injection = injection.clone();
        }
        if let Some(key) = &self.key {
            config.injection_key = key.clone();
        }
        if self.include_package_name {
            config.include_package_name = true;
        }
        if !self.levels.is_empty() {
            config.levels = self.levels.clone();
        }
        if !self.injected_methods.is_empty() {
            config.injected_methods = Some(self.injected_methods.clone());
        }
        if !self.includes.is_empty() {
            config.filters.includes = self.includes.clone();
        }
        if !self.excludes.is_empty() {
            config.filters.excludes = self.excludes.clone();
        }
        if self.no_inject {
            config.inject = false;
        }
        if self.no_remove {
            config.remove = false;
        }
        if let Some(threads) = self.threads {
            config.runner.threads = threads;
        }
        if self.keep_going {
            config.runner.keep_going = true;
        }
        if self.dry_run {
            config.runner.dry_run = true;
        }
        config
    }
}

fn load_file(path: &Path) -> anyhow::Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))
}
