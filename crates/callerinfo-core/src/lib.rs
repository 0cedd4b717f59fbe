//! Caller information for SLF4J log statements
//!
//! This crate rewrites compiled JVM classes so that every matched logging call
//! is wrapped in `MDC.put(key, value)` / `MDC.remove(key)`:
//! - Call-site patterns and class filters
//! - Per-method instruction rewriting with a double-injection guard
//! - Whole-class rewriting and re-assembly
//! - Configuration (callerinfo.toml) and a parallel batch runner

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod batch;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod guard;
pub mod injection;
pub mod pattern;
pub mod rewriter;

pub use batch::{BatchError, BatchRunner, BatchSummary, Failure};
pub use config::{Config, ConfigError, FacadeConfig, RunnerConfig, CONFIG_FILE};
pub use driver::{rewrite_artifact, RewrittenArtifact};
pub use error::{ConfigWarning, RewriteError, RewriteResult};
pub use filter::{ClassFilter, ClassFilterSet};
pub use guard::{CallKind, GuardState};
pub use injection::InjectionSpec;
pub use pattern::{compile_injected_method_patterns, CallSitePattern, ContextStore, Level, PatternError};
pub use rewriter::{rewrite_method, MethodRewriteState, RewriteRules, RewrittenMethod};
