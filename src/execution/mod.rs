//! Launching and monitoring runs

pub mod batch;
pub mod confirm;
pub mod events;
pub mod launch;
pub mod monitor;
pub mod registry;
pub mod runner;

pub use batch::BatchCoordinator;
pub use confirm::{default_strategies, ConfirmStrategy};
pub use events::{EventBus, LaunchEvent, LogLevel, RunLogger};
pub use launch::{LaunchOutcome, LaunchStateMachine};
pub use monitor::StatusMonitor;
pub use registry::{BatchEntry, BatchRegistry};
pub use runner::RunCoordinator;
