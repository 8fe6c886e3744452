//! pipeline-launcher - launches CI/CD pipeline runs through a web console
//! and monitors them to completion

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod session;
pub mod surface;

// Re-export commonly used types
pub use core::{
    BatchReport, BatchResult, ConsoleProfile, LauncherConfig, PipelineTarget, RunResult,
    RunStatus, Settings, TargetSelection,
};
pub use execution::{
    BatchCoordinator, BatchRegistry, EventBus, LaunchEvent, LaunchStateMachine, RunCoordinator,
    StatusMonitor,
};
pub use session::{FileSessionStore, InMemorySessionStore, SessionStore};
pub use surface::{Browser, BrowserContext, DriverBrowser, Page, SurfaceError};
