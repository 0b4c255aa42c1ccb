/// Crate-level error types for medpatch diagnostics.
use std::path::PathBuf;

/// Every error names the file, pattern, or reason for failure so the operator
/// can act on it without a debugger. None of these are retried: each one means
/// the target files no longer look the way the patch engine expects.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An explicitly requested config file does not exist on disk.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path to the missing config file.
        path: PathBuf,
    },

    /// The script has no declaration for the named function.
    #[error("function not found: `{function}` in {}", file.display())]
    FunctionNotFound {
        /// Script file that was searched.
        file: PathBuf,
        /// Function name that was looked up.
        function: String,
    },

    /// None of the anchor patterns matched the markup document.
    #[error("insertion point not found in {} (tried: {})", file.display(), tried.join(", "))]
    InsertionPointNotFound {
        /// Markup file that was searched.
        file: PathBuf,
        /// Labels of the anchor patterns tried, in priority order.
        tried: Vec<String>,
    },

    /// Config values are individually valid but do not form a usable patch plan.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// What is wrong with the config.
        reason: String,
    },

    /// A configured pattern does not compile as a regular expression.
    #[error("invalid pattern `{label}`: {reason}")]
    InvalidPattern {
        /// Label of the offending pattern.
        label: String,
        /// Compiler message from the regex engine.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// Data file parses, but its shape is not a collection of records.
    #[error("malformed collection in {}: {reason}", file.display())]
    MalformedCollection {
        /// Data file that was inspected.
        file: PathBuf,
        /// Description of the structural mismatch.
        reason: String,
    },

    /// A target file does not exist, so no rollback point can be taken.
    #[error("missing required file: {}", path.display())]
    MissingFile {
        /// Path to the missing target file.
        path: PathBuf,
    },

    /// Data file is not valid JSON.
    #[error("parse error in {}: {reason}", file.display())]
    ParseError {
        /// Data file that failed to parse.
        file: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Merged collection failed to serialize, or did not round-trip identically.
    #[error("serialization error for {}: {reason}", file.display())]
    SerializationError {
        /// Data file whose merged content was being serialized.
        file: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// The function body's braces never balanced before end of file.
    #[error("unbalanced structure: `{function}` opened at byte {opened_at} never closes in {}", file.display())]
    UnbalancedStructure {
        /// Script file being scanned.
        file: PathBuf,
        /// Function whose body was being delimited.
        function: String,
        /// Byte offset of the opening brace.
        opened_at: usize,
    },
}

/// Short kind name used in the one-line summary.
impl Error {
    /// Stable, human-readable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        return match self {
            Self::ConfigNotFound { .. } => "ConfigNotFound",
            Self::FunctionNotFound { .. } => "FunctionNotFound",
            Self::InsertionPointNotFound { .. } => "InsertionPointNotFound",
            Self::InvalidConfig { .. } => "InvalidConfig",
            Self::InvalidPattern { .. } => "InvalidPattern",
            Self::Io(_) => "Io",
            Self::MalformedCollection { .. } => "MalformedCollection",
            Self::MissingFile { .. } => "MissingFile",
            Self::ParseError { .. } => "ParseError",
            Self::SerializationError { .. } => "SerializationError",
            Self::TomlDe(_) => "TomlDe",
            Self::UnbalancedStructure { .. } => "UnbalancedStructure",
        };
    }
}
