//! Run status and launch phase models

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Status of a single pipeline run
///
/// The first group mirrors what the remote console reports while a run is in
/// flight; the second group are outcomes decided by the launcher itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// Nothing has been observed yet
    Unknown,
    /// Remote run is initializing
    Init,
    /// Remote run is queued
    Pending,
    /// Remote run is executing
    Running,
    /// Any other non-terminal status string the console reports
    Other(String),
    /// Remote run finished successfully
    Completed,
    /// Remote run finished with a failure
    Failed,
    /// Remote run was aborted
    Aborted,
    /// Authentication was demanded but no credentials were configured
    LoginError,
    /// The console rejected the launch with a non-recoverable error code
    StartupError(String),
    /// The confirmation loop ran past its wall-clock budget
    StartupTimeout,
    /// The confirmation loop ran out of attempts
    RetryLimitExceeded,
    /// Launched, but no terminal status arrived in time
    MonitorTimeout,
    /// Unexpected failure while driving the console
    Error,
}

impl RunStatus {
    /// Map a status string from the console's run-detail payload
    pub fn from_remote(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INIT" => RunStatus::Init,
            "PENDING" => RunStatus::Pending,
            "RUNNING" => RunStatus::Running,
            "COMPLETED" => RunStatus::Completed,
            "FAILED" => RunStatus::Failed,
            "ABORTED" => RunStatus::Aborted,
            other => RunStatus::Other(other.to_string()),
        }
    }

    /// Terminal statuses reported by the console itself
    pub fn is_remote_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Aborted
        )
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        self.is_remote_terminal()
            || matches!(
                self,
                RunStatus::LoginError
                    | RunStatus::StartupError(_)
                    | RunStatus::StartupTimeout
                    | RunStatus::RetryLimitExceeded
                    | RunStatus::MonitorTimeout
                    | RunStatus::Error
            )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    fn rank(&self) -> u8 {
        match self {
            RunStatus::Unknown => 0,
            RunStatus::Init | RunStatus::Pending | RunStatus::Other(_) => 1,
            RunStatus::Running => 2,
            _ => 3,
        }
    }

    /// Whether moving from `self` to `next` keeps the status moving forward
    pub fn can_advance_to(&self, next: &RunStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::Unknown
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Unknown => f.write_str("UNKNOWN"),
            RunStatus::Init => f.write_str("INIT"),
            RunStatus::Pending => f.write_str("PENDING"),
            RunStatus::Running => f.write_str("RUNNING"),
            RunStatus::Other(raw) => f.write_str(raw),
            RunStatus::Completed => f.write_str("COMPLETED"),
            RunStatus::Failed => f.write_str("FAILED"),
            RunStatus::Aborted => f.write_str("ABORTED"),
            RunStatus::LoginError => f.write_str("LOGIN_ERROR"),
            RunStatus::StartupError(code) => write!(f, "STARTUP_ERROR ({})", code),
            RunStatus::StartupTimeout => f.write_str("STARTUP_TIMEOUT"),
            RunStatus::RetryLimitExceeded => f.write_str("RETRY_LIMIT_EXCEEDED"),
            RunStatus::MonitorTimeout => f.write_str("MONITOR_TIMEOUT"),
            RunStatus::Error => f.write_str("ERROR"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(code) = s
            .strip_prefix("STARTUP_ERROR (")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Ok(RunStatus::StartupError(code.to_string()));
        }

        Ok(match s {
            "UNKNOWN" => RunStatus::Unknown,
            "LOGIN_ERROR" => RunStatus::LoginError,
            "STARTUP_TIMEOUT" => RunStatus::StartupTimeout,
            "RETRY_LIMIT_EXCEEDED" => RunStatus::RetryLimitExceeded,
            "MONITOR_TIMEOUT" => RunStatus::MonitorTimeout,
            "ERROR" => RunStatus::Error,
            remote => RunStatus::from_remote(remote),
        })
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Phases of the launch state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPhase {
    Authenticating,
    Ready,
    LaunchRequested,
    Confirming,
    ConcurrencyRetry,
    Launched,
}

impl fmt::Display for LaunchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchPhase::Authenticating => "AUTHENTICATING",
            LaunchPhase::Ready => "READY",
            LaunchPhase::LaunchRequested => "LAUNCH_REQUESTED",
            LaunchPhase::Confirming => "CONFIRMING",
            LaunchPhase::ConcurrencyRetry => "CONCURRENCY_RETRY",
            LaunchPhase::Launched => "LAUNCHED",
        };
        f.write_str(name)
    }
}
