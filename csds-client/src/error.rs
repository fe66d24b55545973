//! Error types for the CSDS client.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for the CSDS client.
///
/// Configuration errors are reported before any network activity. Protocol
/// errors come from the gRPC stream and are classified by
/// [`classify`](crate::client::retry::classify). Render errors surface while
/// a report is being printed.
#[derive(Debug, Error)]
pub enum Error {
    /// Neither a request file nor an inline request was provided.
    #[error("missing request yaml: set a request file or an inline request")]
    MissingInput,

    /// An input file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadInput {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A request document did not decode into node matchers.
    #[error("invalid request document: {0}")]
    Document(#[from] serde_yaml::Error),

    /// A required metadata key is absent from the node matchers.
    #[error("missing field {0} in NodeMatcher")]
    MissingRequiredField(&'static str),

    /// Exactly one of two mutually exclusive metadata keys must be set.
    #[error("must set exactly one of {first} or {second}, {conflict}")]
    ConflictingField {
        /// First metadata key.
        first: &'static str,
        /// Second metadata key.
        second: &'static str,
        /// Whether neither or both keys were set.
        conflict: Conflict,
    },

    /// An option carries a value outside its supported set.
    #[error("{value} {option} is not supported, list of supported {option}s: {supported}")]
    UnsupportedOption {
        /// Name of the option.
        option: &'static str,
        /// The rejected value.
        value: String,
        /// Comma separated list of accepted values.
        supported: &'static str,
    },

    /// A setting is malformed or inconsistent with another setting.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// The authentication mode is not available for the platform.
    #[error("{mode} authentication mode is not supported for the {platform} platform")]
    UnsupportedAuth {
        /// Requested authentication mode.
        mode: String,
        /// Selected platform.
        platform: String,
    },

    /// Credentials could not be loaded or refreshed.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// Connecting to the control plane failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The status stream failed.
    #[error("stream error: {0}")]
    Stream(#[from] tonic::Status),

    /// The send side of the stream is already closed.
    #[error("stream closed")]
    StreamClosed,

    /// A config entry carries a type URL outside the known xDS kinds.
    #[error("unsupported xDS config type: {0}")]
    UnsupportedConfigType(String),

    /// The node id filter pattern is not a valid regular expression.
    #[error("invalid filter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Writing the report failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the detailed config dump failed.
    #[error("failed to serialize config dump: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a pair of mutually exclusive fields was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// Neither field was set.
    Neither,
    /// Both fields were set.
    Both,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neither => f.write_str("neither is set"),
            Self::Both => f.write_str("both are set"),
        }
    }
}

/// Result type alias for CSDS client operations.
pub type Result<T> = std::result::Result<T, Error>;
