//! Configuration for the CSDS client.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::client::retry::RetryPolicy;
use crate::error::{Error, Result};

/// Default control plane address.
pub const DEFAULT_SERVICE_URI: &str = "trafficdirector.googleapis.com:443";

/// Platform hosting the control plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Platform {
    /// Google Cloud Traffic Director.
    #[default]
    Gcp,
}

impl Platform {
    /// The name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcp => "gcp",
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gcp" => Ok(Self::Gcp),
            other => Err(Error::UnsupportedOption {
                option: "platform",
                value: other.to_string(),
                supported: "gcp",
            }),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client authenticates to the control plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthnMode {
    /// Self-signed JWT credentials from a service account key file.
    Jwt,
    /// Application default credentials.
    #[default]
    Auto,
}

impl AuthnMode {
    /// The name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::Auto => "auto",
        }
    }

    /// Parse an authentication mode for `platform`.
    pub fn parse(mode: &str, platform: Platform) -> Result<Self> {
        match (platform, mode) {
            (Platform::Gcp, "jwt") => Ok(Self::Jwt),
            (Platform::Gcp, "auto") => Ok(Self::Auto),
            (platform, mode) => Err(Error::UnsupportedAuth {
                mode: mode.to_string(),
                platform: platform.to_string(),
            }),
        }
    }
}

impl fmt::Display for AuthnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the node id filter pattern is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// The node id starts with the pattern.
    #[default]
    Prefix,
    /// The node id ends with the pattern.
    Suffix,
    /// The node id matches the pattern as a regular expression.
    Regex,
}

/// An empty mode selects the default, [`FilterMode::Prefix`].
impl FromStr for FilterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "prefix" => Ok(Self::Prefix),
            "suffix" => Ok(Self::Suffix),
            "regex" => Ok(Self::Regex),
            other => Err(Error::UnsupportedOption {
                option: "filter mode",
                value: other.to_string(),
                supported: "prefix, suffix, regex",
            }),
        }
    }
}

/// Immutable configuration of a CSDS session.
///
/// # Example
///
/// ```
/// use csds_client::{FilterMode, SessionOptions};
/// use std::time::Duration;
///
/// let options = SessionOptions::new("trafficdirector.googleapis.com:443")
///     .with_request_file("request.yaml")
///     .with_monitor_interval(Duration::from_secs(5))
///     .with_filter(FilterMode::Suffix, "-prod");
///
/// assert!(options.is_monitor_mode());
/// ```
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Control plane address.
    pub uri: String,
    /// Platform hosting the control plane.
    pub platform: Platform,
    /// Authentication mode.
    pub authn_mode: AuthnMode,
    /// Service account key file used in [`AuthnMode::Jwt`].
    pub jwt_file: Option<PathBuf>,
    /// Primary request document source.
    pub request_file: Option<PathBuf>,
    /// Inline request document merged over `request_file`.
    pub request_yaml: Option<String>,
    /// Delay between exchanges. Zero runs a single exchange.
    pub monitor_interval: Duration,
    /// How `filter_pattern` is applied to node ids.
    pub filter_mode: FilterMode,
    /// Node id filter. Empty disables filtering.
    pub filter_pattern: String,
    /// Where the detailed config dump is written, if anywhere.
    pub output_file: Option<PathBuf>,
    /// Pacing of stream re-establishment after a transient rejection.
    pub retry_policy: RetryPolicy,
}

impl SessionOptions {
    /// Create options for `uri` with defaults for everything else.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            platform: Platform::default(),
            authn_mode: AuthnMode::default(),
            jwt_file: None,
            request_file: None,
            request_yaml: None,
            monitor_interval: Duration::ZERO,
            filter_mode: FilterMode::default(),
            filter_pattern: String::new(),
            output_file: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Set the platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Set the authentication mode.
    pub fn with_authn_mode(mut self, authn_mode: AuthnMode) -> Self {
        self.authn_mode = authn_mode;
        self
    }

    /// Set the service account key file for JWT authentication.
    pub fn with_jwt_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.jwt_file = Some(path.into());
        self
    }

    /// Set the request file.
    pub fn with_request_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.request_file = Some(path.into());
        self
    }

    /// Set the inline request document.
    pub fn with_request_yaml(mut self, yaml: impl Into<String>) -> Self {
        self.request_yaml = Some(yaml.into());
        self
    }

    /// Set the monitor interval. Zero runs once.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Set the node id filter.
    pub fn with_filter(mut self, mode: FilterMode, pattern: impl Into<String>) -> Self {
        self.filter_mode = mode;
        self.filter_pattern = pattern.into();
        self
    }

    /// Set the detailed config dump path.
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Whether the session polls until cancelled.
    pub fn is_monitor_mode(&self) -> bool {
        !self.monitor_interval.is_zero()
    }
}
