use std::str::FromStr;
use serde::Deserialize;

/// Whether failed steps may be re-released, as written in the plan file.
///
/// - `Disabled`: a failure always cascades to skip downstream steps (default).
/// - `Enabled`: a step that reports it is up for retry is made ready again,
///   up to `max_retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    #[default]
    Disabled,
    Enabled,
}

impl FromStr for RetryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" => Ok(RetryPolicy::Disabled),
            "enabled" => Ok(RetryPolicy::Enabled),
            other => Err(format!(
                "invalid retries: {other} (expected \"disabled\" or \"enabled\")"
            )),
        }
    }
}

/// Retry configuration handed to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    #[default]
    Disabled,
    Enabled {
        max_retries: u32,
    },
}

impl RetryMode {
    pub fn new(policy: RetryPolicy, max_retries: u32) -> Self {
        match policy {
            RetryPolicy::Disabled => RetryMode::Disabled,
            RetryPolicy::Enabled => RetryMode::Enabled { max_retries },
        }
    }

    /// Whether a step that has already been retried `attempts` times may be
    /// released again.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        match self {
            RetryMode::Disabled => false,
            RetryMode::Enabled { max_retries } => attempts < *max_retries,
        }
    }
}
