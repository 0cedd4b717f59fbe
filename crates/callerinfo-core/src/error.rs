//! Rewrite errors and configuration warnings

use callerinfo_classfile::{AssembleError, ClassFileError, DecodeError};
use thiserror::Error;

/// Result of rewriting one artifact
pub type RewriteResult<T> = Result<T, RewriteError>;

/// Fatal failure for a single artifact
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The class file itself could not be decoded
    #[error("Invalid class file: {0}")]
    ClassFile(#[from] ClassFileError),

    /// A method body could not be decoded
    #[error("Invalid code in method {method}: {source}")]
    Decode {
        /// `name` + descriptor of the method
        method: String,
        /// Underlying error
        #[source]
        source: DecodeError,
    },

    /// A rewritten method body could not be assembled
    #[error("Failed to assemble method {method}: {source}")]
    Assemble {
        /// `name` + descriptor of the method
        method: String,
        /// Underlying error
        #[source]
        source: AssembleError,
    },

    /// Constant pool overflow or an unreadable pool entry outside any method
    #[error("Invalid constant pool: {0}")]
    Pool(#[from] DecodeError),
}

/// Non-fatal configuration problem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    /// `injection` is empty
    #[error("'injection' is set to empty string, therefore execution is skipped.")]
    EmptyTemplate,

    /// `injection` has a `%` that is not a conversion word
    #[error(
        "There is a `%` character in the 'injection' parameter, without a valid conversion word afterwards, \
         the '%' will be printed in the log statement. Available conversion words: {available}, current 'injection': {template}"
    )]
    StrayPercent {
        /// Comma separated conversion words
        available: String,
        /// The configured template
        template: String,
    },

    /// Neither `inject` nor `remove` is enabled
    #[error("Both 'inject' and 'remove' are disabled, therefore execution is skipped.")]
    NothingToEmit,

    /// `filters.includes` is empty
    #[error("'filters.includes' is empty, no class can be selected, therefore execution is skipped.")]
    EmptyIncludes,

    /// No levels and no injected methods
    #[error("No 'levels' and no 'injected-methods' configured, therefore execution is skipped.")]
    NoTargetPatterns,
}

impl ConfigWarning {
    /// Whether this warning turns the run into a no-op
    pub fn skips_run(&self) -> bool {
        !matches!(self, ConfigWarning::StrayPercent { .. })
    }
}
