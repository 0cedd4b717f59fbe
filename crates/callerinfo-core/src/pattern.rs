//! Call-site patterns
//!
//! A [`CallSitePattern`] names the calls the rewriter wraps. The context-store
//! symbols that are emitted around them live in [`ContextStore`].

use callerinfo_classfile::MemberRef;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Internal name of the SLF4J logger interface
pub const SLF4J_LOGGER: &str = "org/slf4j/Logger";

/// Internal name of the SLF4J mapped diagnostic context
pub const SLF4J_MDC: &str = "org/slf4j/MDC";

/// Descriptor of `put(String, String)`
pub const PUT_DESCRIPTOR: &str = "(Ljava/lang/String;Ljava/lang/String;)V";

/// Descriptor of `remove(String)`
pub const REMOVE_DESCRIPTOR: &str = "(Ljava/lang/String;)V";

/// Errors building call-site patterns
#[derive(Debug, Error)]
pub enum PatternError {
    /// Method name pattern is not a valid regex
    #[error("Invalid method pattern '{pattern}': {source}")]
    InvalidRegex {
        /// The offending pattern
        pattern: String,
        /// Regex compile error
        #[source]
        source: regex::Error,
    },

    /// Explicit entry without the `owner#method` shape
    #[error("Invalid injected method '{0}', expected 'owner#methodPattern'")]
    MalformedMethod(String),

    /// Unknown severity level name
    #[error("Unknown log level '{0}', expected one of trace, debug, info, warn, error")]
    UnknownLevel(String),
}

/// Logging severity, one logger method per level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Level {
    #[serde(alias = "TRACE")]
    Trace,
    #[serde(alias = "DEBUG")]
    Debug,
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARN")]
    Warn,
    #[serde(alias = "ERROR")]
    Error,
}

impl Level {
    /// Every level, most verbose first
    pub const ALL: [Level; 5] = [Level::Trace, Level::Debug, Level::Info, Level::Warn, Level::Error];

    /// Name of the logger method for this level
    pub fn method_name(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

impl FromStr for Level {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.method_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PatternError::UnknownLevel(s.to_string()))
    }
}

/// How a pattern matches method names
#[derive(Debug, Clone)]
pub enum NameMatcher {
    /// One of a fixed set of names
    Exact(BTreeSet<String>),
    /// Full match of a regular expression
    Regex(Regex),
}

impl NameMatcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Exact(names) => names.contains(name),
            NameMatcher::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Identifies the calls to wrap by owner and method name
#[derive(Debug, Clone)]
pub struct CallSitePattern {
    owner: String,
    names: NameMatcher,
}

impl CallSitePattern {
    /// Match any of `names` on `owner`
    pub fn exact<I, S>(owner: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owner: internal_name(owner),
            names: NameMatcher::Exact(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Match method names on `owner` that fully match `pattern`
    pub fn regex(owner: &str, pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            owner: internal_name(owner),
            names: NameMatcher::Regex(regex),
        })
    }

    /// Parse an `owner#methodPattern` entry.
    ///
    /// The owner may be dotted or internal; an owner without a package matches
    /// that simple class name in any package.
    pub fn parse(entry: &str) -> Result<Self, PatternError> {
        match entry.trim().split_once('#') {
            Some((owner, method)) if !owner.is_empty() && !method.is_empty() => {
                Self::regex(owner, method)
            }
            _ => Err(PatternError::MalformedMethod(entry.to_string())),
        }
    }

    /// Whether a call to `method` matches
    pub fn matches(&self, method: &MemberRef) -> bool {
        self.owner_matches(&method.owner) && self.names.matches(&method.name)
    }

    fn owner_matches(&self, owner: &str) -> bool {
        if self.owner.contains('/') {
            self.owner == owner
        } else {
            simple_name(owner) == self.owner
        }
    }
}

impl fmt::Display for CallSitePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#", self.owner.replace('/', "."))?;
        match &self.names {
            NameMatcher::Exact(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "({})", names.join("|"))
            }
            NameMatcher::Regex(regex) => {
                let source = regex.as_str();
                let inner = source
                    .strip_prefix("^(?:")
                    .and_then(|s| s.strip_suffix(")$"))
                    .unwrap_or(source);
                f.write_str(inner)
            }
        }
    }
}

/// The context-store `put`/`remove` pair emitted around matched calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStore {
    put: MemberRef,
    remove: MemberRef,
}

impl ContextStore {
    /// Static `put(String, String)` and `remove(String)` on `owner`
    pub fn new(owner: &str) -> Self {
        let owner = internal_name(owner);
        Self {
            put: MemberRef::method(&owner, "put", PUT_DESCRIPTOR, false),
            remove: MemberRef::method(&owner, "remove", REMOVE_DESCRIPTOR, false),
        }
    }

    /// SLF4J's `MDC`
    pub fn slf4j() -> Self {
        Self::new(SLF4J_MDC)
    }

    /// The `put` symbol
    pub fn put(&self) -> &MemberRef {
        &self.put
    }

    /// The `remove` symbol
    pub fn remove(&self) -> &MemberRef {
        &self.remove
    }

    /// Whether `method` is this store's `put`
    pub fn is_put(&self, method: &MemberRef) -> bool {
        method.owner == self.put.owner
            && method.name == self.put.name
            && method.descriptor == self.put.descriptor
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::slf4j()
    }
}

/// Build the target patterns.
///
/// Without an explicit list, one pattern on `logger` covers the logger method of
/// every requested level. An explicit list of `owner#methodPattern` entries
/// replaces that default entirely.
pub fn compile_injected_method_patterns(
    logger: &str,
    levels: &[Level],
    explicit: Option<&[String]>,
) -> Result<Vec<CallSitePattern>, PatternError> {
    match explicit {
        Some(entries) => entries.iter().map(|e| CallSitePattern::parse(e)).collect(),
        None if levels.is_empty() => Ok(Vec::new()),
        None => Ok(vec![CallSitePattern::exact(
            logger,
            levels.iter().map(|level| level.method_name()),
        )]),
    }
}

/// `com.example.Foo` -> `com/example/Foo`
pub fn internal_name(name: &str) -> String {
    name.trim().replace('.', "/")
}

/// `com/example/Foo` -> `Foo`
pub fn simple_name(internal: &str) -> &str {
    internal.rsplit('/').next().unwrap_or(internal)
}
