//! Core domain models for the launcher
//!
//! Targets, settings, run results and the console knowledge the state machine
//! relies on.

pub mod config;
pub mod console;
pub mod report;
pub mod result;
pub mod state;
pub mod target;

pub use config::{Credentials, Environment, LauncherConfig, Settings};
pub use console::{ConsoleProfile, LaunchReply, RunDetail};
pub use report::BatchReport;
pub use result::{BatchResult, RunResult};
pub use state::{LaunchPhase, RunStatus};
pub use target::{PipelineTarget, TargetSelection};
