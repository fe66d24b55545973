//! Deciding and pacing stream re-establishment.
//!
//! Only one failure is recoverable: the control plane's security policy
//! rejecting an exchange on a stream, which is resolved by opening a fresh
//! stream on the same channel. Everything else ends the session.

use std::time::Duration;

use crate::error::{Error, Result};

/// Marker the control plane puts in the status message when its RPC security
/// policy rejects a stream.
pub const SECURITY_POLICY_MARKER: &str = "RpcSecurityPolicy";

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recover by re-opening the stream.
    Transient,
    /// End the session.
    Fatal,
}

/// Classify an exchange error.
///
/// gRPC does not give the security-policy rejection a status code of its
/// own, so a stream error is transient iff its status message carries
/// [`SECURITY_POLICY_MARKER`]. This couples the client to the control
/// plane's message text.
pub fn classify(error: &Error) -> ErrorClass {
    match error {
        Error::Stream(status) if status.message().contains(SECURITY_POLICY_MARKER) => {
            ErrorClass::Transient
        }
        _ => ErrorClass::Fatal,
    }
}

/// Retry policy for re-opening a rejected stream.
///
/// # Example
///
/// ```
/// use csds_client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_initial_backoff(Duration::from_millis(50)).unwrap()
///     .with_max_backoff(Duration::from_secs(1)).unwrap()
///     .with_max_attempts(Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first re-open.
    ///
    /// Default: 100 milliseconds.
    pub initial_backoff: Duration,

    /// Upper bound of the delay.
    ///
    /// Default: 5 seconds.
    pub max_backoff: Duration,

    /// Multiplier applied to the delay after each consecutive rejection.
    ///
    /// Default: 2.0.
    pub backoff_multiplier: f64,

    /// Maximum number of consecutive re-opens.
    ///
    /// If `None`, rejections are retried indefinitely.
    ///
    /// Default: None.
    pub max_attempts: Option<usize>,
}

impl RetryPolicy {
    /// Create a new retry policy with custom parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `backoff_multiplier` is less than 1.0
    /// - `max_backoff` is less than `initial_backoff`
    pub fn new(
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self> {
        Self::default()
            .with_backoff_multiplier(backoff_multiplier)?
            .with_bounds(initial_backoff, max_backoff)
    }

    fn with_bounds(mut self, initial_backoff: Duration, max_backoff: Duration) -> Result<Self> {
        if max_backoff < initial_backoff {
            return Err(invalid(format!(
                "max_backoff ({max_backoff:?}) must be >= initial_backoff ({initial_backoff:?})"
            )));
        }
        self.initial_backoff = initial_backoff;
        self.max_backoff = max_backoff;
        Ok(self)
    }

    /// Set the initial backoff duration.
    ///
    /// # Errors
    ///
    /// Returns an error if `duration` is greater than `max_backoff`.
    pub fn with_initial_backoff(self, duration: Duration) -> Result<Self> {
        let max_backoff = self.max_backoff;
        self.with_bounds(duration, max_backoff)
    }

    /// Set the maximum backoff duration.
    ///
    /// # Errors
    ///
    /// Returns an error if `duration` is less than `initial_backoff`.
    pub fn with_max_backoff(self, duration: Duration) -> Result<Self> {
        let initial_backoff = self.initial_backoff;
        self.with_bounds(initial_backoff, duration)
    }

    /// Set the backoff multiplier.
    ///
    /// # Errors
    ///
    /// Returns an error if `multiplier` is less than 1.0.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Result<Self> {
        if multiplier < 1.0 {
            return Err(invalid(format!(
                "backoff_multiplier must be >= 1.0, got {multiplier}"
            )));
        }
        self.backoff_multiplier = multiplier;
        Ok(self)
    }

    /// Set the maximum number of consecutive re-opens.
    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Calculate the backoff duration for a given attempt number (0-indexed).
    ///
    /// Returns `None` if `max_attempts` is set and the attempt exceeds it.
    ///
    /// ```
    /// use csds_client::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff_duration(0), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.backoff_duration(1), Some(Duration::from_millis(200)));
    /// assert_eq!(policy.backoff_duration(10), Some(Duration::from_secs(5)));
    /// ```
    pub fn backoff_duration(&self, attempt: usize) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let backoff = self
            .initial_backoff
            .mul_f64(self.backoff_multiplier.powi(exponent).min(u32::MAX.into()));

        Some(backoff.min(self.max_backoff))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

fn invalid(message: String) -> Error {
    Error::Validation(format!("retry policy: {message}"))
}

/// Stateful backoff calculator based on a [`RetryPolicy`].
///
/// ```
/// use csds_client::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// let mut backoff = Backoff::new(RetryPolicy::default());
/// assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
/// assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
///
/// backoff.reset();
/// assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: usize,
}

impl Backoff {
    /// Create a new backoff calculator from a retry policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Get the next backoff duration and advance the attempt counter.
    ///
    /// Returns `None` once `max_attempts` is exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let duration = self.policy.backoff_duration(self.attempt)?;
        self.attempt += 1;
        Some(duration)
    }

    /// Reset after a successful exchange.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
