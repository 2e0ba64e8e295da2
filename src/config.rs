//! Daemon configuration.
//!
//! Configuration is read once at startup from `SQSD_*` environment variables,
//! validated, and passed explicitly into each component's constructor. No
//! component reads ambient global state after construction.

use std::time::Duration;

use thiserror::Error;

/// Inactivity timeout applied in debug mode, long enough to step through a
/// message in a debugger before the queue takes it back.
pub const DEBUG_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// SQS caps a single receive call at this many messages.
const MAX_RECEIVE_BATCH: i32 = 10;

/// SQS caps long-poll waits at 20 seconds.
const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

/// SQS caps visibility timeouts at 12 hours.
const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// How the scheduler decides when to start the next fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Start a cycle on every tick of the poll interval, even while earlier
    /// cycles are still in flight.
    Interval,
    /// Start the next cycle as soon as every message in the previous batch
    /// has settled.
    Continuous,
    /// Wait for an external trigger (stdin by default) before each cycle.
    Manual,
}

impl PollMode {
    /// Parses a mode name as it appears in `SQSD_MODE` or on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "interval" | "cadence" => Some(Self::Interval),
            "continuous" | "drain" => Some(Self::Continuous),
            "manual" | "interactive" => Some(Self::Manual),
            _ => None,
        }
    }

    /// The canonical name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Continuous => "continuous",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for PollMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Static AWS access key id. When unset, the SDK's default credential
    /// chain applies.
    pub access_key: Option<String>,
    /// Static AWS secret access key. Must be set together with `access_key`.
    pub secret_access_key: Option<String>,
    /// AWS region hosting the queue.
    pub region: String,
    /// URL of the queue to poll.
    pub queue_url: String,
    /// Worker endpoint that receives each message as an HTTP POST.
    pub worker_url: String,
    /// Maximum number of messages requested per receive call.
    pub max_messages: i32,
    /// How long a received message stays invisible to other consumers.
    pub visibility_timeout: Duration,
    /// Hard bound on a single worker request.
    pub inactivity_timeout: Duration,
    /// Tick period for interval mode.
    pub poll_interval: Duration,
    /// Long-poll wait passed to each receive call.
    pub wait_time: Duration,
    /// Trigger mode for the scheduler.
    pub mode: PollMode,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_access_key: None,
            region: "us-west-1".to_string(),
            queue_url: String::new(),
            worker_url: String::new(),
            max_messages: 10,
            visibility_timeout: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(1000),
            wait_time: Duration::from_secs(1),
            mode: PollMode::Interval,
        }
    }
}

impl DaemonConfig {
    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SQSD_QUEUE_URL`: URL of the queue to poll (required)
    /// - `SQSD_WORKER_URL`: worker endpoint URL (required)
    /// - `SQSD_ACCESS_KEY`: static AWS access key id (optional)
    /// - `SQSD_SECRET_ACCESS_KEY`: static AWS secret access key (optional)
    /// - `SQSD_REGION`: AWS region (default: us-west-1)
    /// - `SQSD_MAX_MESSAGES`: messages per receive call (default: 10)
    /// - `SQSD_VISIBILITY_TIMEOUT_SECS`: visibility timeout (default: 30)
    /// - `SQSD_INACTIVITY_TIMEOUT_SECS`: worker request timeout (default: 30)
    /// - `SQSD_POLL_INTERVAL_MS`: interval-mode tick period (default: 1000)
    /// - `SQSD_WAIT_TIME_SECS`: receive long-poll wait (default: 1)
    /// - `SQSD_MODE`: interval, continuous, or manual (default: interval)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or any value
    /// fails to parse or validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.access_key = std::env::var("SQSD_ACCESS_KEY").ok();
        config.secret_access_key = std::env::var("SQSD_SECRET_ACCESS_KEY").ok();

        if let Ok(val) = std::env::var("SQSD_REGION") {
            config.region = val;
        }

        config.queue_url = std::env::var("SQSD_QUEUE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("SQSD_QUEUE_URL".to_string()))?;
        config.worker_url = std::env::var("SQSD_WORKER_URL")
            .map_err(|_| ConfigError::MissingEnvVar("SQSD_WORKER_URL".to_string()))?;

        if let Ok(val) = std::env::var("SQSD_MAX_MESSAGES") {
            config.max_messages = parse_env_value(&val, "SQSD_MAX_MESSAGES")?;
        }

        if let Ok(val) = std::env::var("SQSD_VISIBILITY_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "SQSD_VISIBILITY_TIMEOUT_SECS")?;
            config.visibility_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("SQSD_INACTIVITY_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "SQSD_INACTIVITY_TIMEOUT_SECS")?;
            config.inactivity_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("SQSD_POLL_INTERVAL_MS") {
            let millis: u64 = parse_env_value(&val, "SQSD_POLL_INTERVAL_MS")?;
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Ok(val) = std::env::var("SQSD_WAIT_TIME_SECS") {
            let secs: u64 = parse_env_value(&val, "SQSD_WAIT_TIME_SECS")?;
            config.wait_time = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("SQSD_MODE") {
            config.mode = PollMode::parse(&val).ok_or_else(|| ConfigError::InvalidValue {
                key: "SQSD_MODE".to_string(),
                message: format!("unknown mode '{val}', expected interval, continuous, or manual"),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_url cannot be empty".to_string(),
            ));
        }

        if self.worker_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "worker_url cannot be empty".to_string(),
            ));
        }

        if self.access_key.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigError::ValidationFailed(
                "access_key and secret_access_key must be set together".to_string(),
            ));
        }

        if !(1..=MAX_RECEIVE_BATCH).contains(&self.max_messages) {
            return Err(ConfigError::ValidationFailed(format!(
                "max_messages must be between 1 and {MAX_RECEIVE_BATCH}"
            )));
        }

        if self.visibility_timeout > MAX_VISIBILITY_TIMEOUT {
            return Err(ConfigError::ValidationFailed(format!(
                "visibility_timeout cannot exceed {} seconds",
                MAX_VISIBILITY_TIMEOUT.as_secs()
            )));
        }

        if self.wait_time > MAX_WAIT_TIME {
            return Err(ConfigError::ValidationFailed(format!(
                "wait_time cannot exceed {} seconds",
                MAX_WAIT_TIME.as_secs()
            )));
        }

        if self.inactivity_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "inactivity_timeout must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses an environment variable value, attributing failures to its key.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{e}"),
    })
}
