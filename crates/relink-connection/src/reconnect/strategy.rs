//! Reconnect decision and backoff schedule
//!
//! A strategy answers two questions: is this error worth a reconnect, and how
//! long should the next attempt wait.

use std::time::Duration;

use parking_lot::RwLock;
use relink_core::RelinkError;

use crate::ReconnectSettings;

/// Error message fragments that indicate the connection itself is gone.
pub const DEFAULT_PATTERNS: &[&str] = &[
    "server has gone away",
    "lost connection",
    "ssl connection has been closed unexpectedly",
    "error writing data to the connection",
    "is dead or not enabled",
    "no connection to the server",
];

/// Reconnect policy shared by any number of connections.
///
/// Patterns are matched case-insensitively as plain substrings against the
/// raw driver message. The delay schedule is
/// `0, base, base * mult, base * mult^2, ...` for attempts `1, 2, 3, 4, ...`,
/// optionally capped.
///
/// # Example
///
/// ```
/// use relink_connection::ReconnectStrategy;
/// use std::time::Duration;
///
/// let strategy = ReconnectStrategy::new().with_max_attempts(3);
///
/// assert_eq!(strategy.delay(1), Duration::ZERO);
/// assert_eq!(strategy.delay(2), Duration::from_millis(100));
/// assert_eq!(strategy.delay(3), Duration::from_millis(200));
/// ```
#[derive(Debug)]
pub struct ReconnectStrategy {
    /// Lowercased patterns, in insertion order
    patterns: RwLock<Vec<String>>,
    /// Number of retries after the initial failed attempt
    max_attempts: u32,
    /// Delay before the second retry
    base_delay_ms: u64,
    /// Growth factor between consecutive delays
    backoff_multiplier: f64,
    /// Optional upper bound for any single delay
    max_delay_ms: Option<u64>,
}

impl ReconnectStrategy {
    /// Strategy with the default patterns, one retry and a 100ms/2x schedule
    pub fn new() -> Self {
        Self {
            patterns: RwLock::new(DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect()),
            max_attempts: 1,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: None,
        }
    }

    /// Build a strategy from file settings, starting from the defaults.
    ///
    /// Patterns in the settings are appended to the default list.
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        let mut strategy = Self::new();
        if let Some(max_attempts) = settings.max_attempts {
            strategy = strategy.with_max_attempts(max_attempts);
        }
        if let Some(base_delay_ms) = settings.base_delay_ms {
            strategy = strategy.with_base_delay_ms(base_delay_ms);
        }
        if let Some(multiplier) = settings.backoff_multiplier {
            strategy = strategy.with_backoff_multiplier(multiplier);
        }
        if let Some(max_delay_ms) = settings.max_delay_ms {
            strategy = strategy.with_max_delay_ms(max_delay_ms);
        }
        for pattern in &settings.patterns {
            strategy.add_pattern(pattern);
        }
        strategy
    }

    /// Replace the pattern list
    pub fn with_patterns<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.patterns.write() = patterns
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .collect();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the growth factor. Negative or non-finite values fall back to 1.0.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() && multiplier >= 0.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = Some(max_delay_ms);
        self
    }

    /// Whether `error` indicates a lost connection.
    ///
    /// Only driver-level errors are considered. Configuration problems,
    /// cache conflicts and `TransactionLost` never trigger a reconnect.
    pub fn should_reconnect(&self, error: &RelinkError) -> bool {
        let Some(message) = error.driver_message() else {
            return false;
        };
        let message = message.to_lowercase();
        self.patterns
            .read()
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }

    /// Append a pattern. Duplicates are kept.
    pub fn add_pattern(&self, pattern: impl AsRef<str>) {
        let pattern = pattern.as_ref().to_lowercase();
        tracing::debug!(pattern = %pattern, "adding reconnect pattern");
        self.patterns.write().push(pattern);
    }

    /// Snapshot of the current (lowercased) patterns
    pub fn patterns(&self) -> Vec<String> {
        self.patterns.read().clone()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn max_delay_ms(&self) -> Option<u64> {
        self.max_delay_ms
    }

    /// Milliseconds to wait before retry number `attempt` (1-based).
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        if attempt <= 1 {
            return 0;
        }
        let exponent = (attempt - 2).min(i32::MAX as u32) as i32;
        // `as` saturates on overflow and truncates the fraction
        let delay = (self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent)) as u64;
        match self.max_delay_ms {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Same as [`delay_ms`](Self::delay_ms), as a `Duration`
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        Self::new()
    }
}
