//! Configuration file parsing (callerinfo.toml)

use crate::error::ConfigWarning;
use crate::filter::{ClassFilter, ClassFilterSet};
use crate::injection::{InjectionSpec, DEFAULT_KEY, DEFAULT_TEMPLATE};
use crate::pattern::{
    compile_injected_method_patterns, ContextStore, Level, PatternError, SLF4J_LOGGER, SLF4J_MDC,
};
use crate::rewriter::RewriteRules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name
pub const CONFIG_FILE: &str = "callerinfo.toml";

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to render TOML
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid regex or method entry
    #[error("Invalid configuration: {0}")]
    Pattern(#[from] PatternError),
}

/// Logging facade symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FacadeConfig {
    /// Logger type whose level methods are wrapped
    pub logger: String,
    /// Type with static `put(String, String)` and `remove(String)`
    pub context_store: String,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            logger: SLF4J_LOGGER.to_string(),
            context_store: SLF4J_MDC.to_string(),
        }
    }
}

/// Batch runner settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunnerConfig {
    /// Worker threads, 0 for one per CPU
    pub threads: usize,
    /// Skip classes that fail to rewrite instead of aborting
    pub keep_going: bool,
    /// Rewrite in memory without writing anything back
    pub dry_run: bool,
}

impl RunnerConfig {
    /// Effective number of workers
    pub fn worker_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.threads
        }
    }
}

/// Complete tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Injected value template
    pub injection: String,

    /// Context key the value is stored under
    pub injection_key: String,

    /// Keep the package path in `%class`
    pub include_package_name: bool,

    /// Directory with compiled classes
    pub target: PathBuf,

    /// Logger levels to wrap, ignored when `injected-methods` is set
    pub levels: Vec<Level>,

    /// Explicit `owner#methodPattern` entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injected_methods: Option<Vec<String>>,

    /// Emit the `put` before each call
    pub inject: bool,

    /// Emit the `remove` after each call
    pub remove: bool,

    /// Class selection
    pub filters: ClassFilterSet,

    /// Facade symbols
    pub facade: FacadeConfig,

    /// Runner settings
    pub runner: RunnerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            injection: DEFAULT_TEMPLATE.to_string(),
            injection_key: DEFAULT_KEY.to_string(),
            include_package_name: false,
            target: PathBuf::from("target/classes"),
            levels: Level::ALL.to_vec(),
            injected_methods: None,
            inject: true,
            remove: true,
            filters: ClassFilterSet::default(),
            facade: FacadeConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The injection part of the configuration
    pub fn injection_spec(&self) -> InjectionSpec {
        InjectionSpec {
            template: self.injection.clone(),
            key: self.injection_key.clone(),
            include_package_name: self.include_package_name,
            inject: self.inject,
            remove: self.remove,
        }
    }

    /// Non-fatal problems, in reporting order
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = self.injection_spec().warnings();
        if self.filters.includes.is_empty() {
            warnings.push(ConfigWarning::EmptyIncludes);
        }
        let no_targets = match &self.injected_methods {
            Some(methods) => methods.is_empty(),
            None => self.levels.is_empty(),
        };
        if no_targets {
            warnings.push(ConfigWarning::NoTargetPatterns);
        }
        warnings
    }

    /// Compile the rewrite rules and the class filter
    pub fn rules(&self) -> Result<(RewriteRules, ClassFilter), ConfigError> {
        let targets = compile_injected_method_patterns(
            &self.facade.logger,
            &self.levels,
            self.injected_methods.as_deref(),
        )?;
        let rules = RewriteRules {
            targets,
            store: ContextStore::new(&self.facade.context_store),
            injection: self.injection_spec(),
        };
        Ok((rules, self.filters.compile()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callerinfo_classfile::MemberRef;

    #[test]
    fn test_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.injection, "%class:%line");
        assert_eq!(config.injection_key, "callerInformation");
        assert_eq!(config.target, PathBuf::from("target/classes"));
        assert_eq!(config.levels.len(), 5);
        assert_eq!(config.filters.includes, vec![".*".to_string()]);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
injection = "%class.%method:%line"
injection-key = "where"
include-package-name = true
target = "build/classes"
levels = ["info", "ERROR"]
inject = true
remove = false

[filters]
includes = ["service"]
excludes = ["Test"]

[facade]
context-store = "org.slf4j.MDC"

[runner]
threads = 2
keep-going = true
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.levels, vec![Level::Info, Level::Error]);
        assert_eq!(config.runner.worker_count(), 2);
        assert!(config.runner.keep_going);
        assert!(!config.runner.dry_run);
        assert_eq!(config.facade.logger, SLF4J_LOGGER);

        let (rules, filter) = config.rules().unwrap();
        assert!(!rules.injection.remove);
        assert_eq!(rules.store, ContextStore::slf4j());
        assert!(rules.is_target(&MemberRef::method(
            SLF4J_LOGGER,
            "error",
            "(Ljava/lang/String;)V",
            true
        )));
        assert!(filter.select(Path::new("build/classes/a/service.class")));
        assert!(!filter.select(Path::new("build/classes/a/Test.class")));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_str("injection-pattern = \"%line\""),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            Config::from_str("[runner]\nworkers = 3"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(Config::from_str("levels = [\"fatal\"]").is_err());
    }

    #[test]
    fn test_warnings() {
        let config = Config::from_str(
            r#"
injection = ""
levels = []
[filters]
includes = []
"#,
        )
        .unwrap();
        assert_eq!(
            config.validate(),
            vec![
                ConfigWarning::EmptyTemplate,
                ConfigWarning::EmptyIncludes,
                ConfigWarning::NoTargetPatterns
            ]
        );

        let config = Config::from_str("levels = []\ninjected-methods = [\"Wrapper#log\"]").unwrap();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_invalid_patterns_are_errors() {
        let config = Config::from_str("injected-methods = [\"missingHash\"]").unwrap();
        assert!(matches!(
            config.rules(),
            Err(ConfigError::Pattern(PatternError::MalformedMethod(_)))
        ));

        let config = Config::from_str("[filters]\nexcludes = [\"(\"]").unwrap();
        assert!(matches!(
            config.rules(),
            Err(ConfigError::Pattern(PatternError::InvalidRegex { .. }))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.injected_methods = Some(vec!["LoggingWrapper#customLogMethod.*".to_string()]);
        config.runner.dry_run = true;
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("injection-key = \"callerInformation\""));
        assert_eq!(Config::from_str(&rendered).unwrap(), config);
    }
}
