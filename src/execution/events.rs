//! Launcher events and the bus that carries them
//!
//! Consumers (terminal output, a live dashboard) subscribe to an [`EventBus`];
//! the coordinators publish without knowing who listens. Events of one run are
//! published in the order they were observed.

use crate::core::{result::RunResult, state::RunStatus};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Severity of a [`LaunchEvent::Log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Events that occur while a batch runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LaunchEvent {
    BatchStarted {
        batch_id: Uuid,
        env: String,
        total: usize,
    },
    Log {
        run: String,
        level: LogLevel,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        extra: Option<Value>,
    },
    /// Emitted once per distinct status a run reaches
    Progress {
        run: String,
        status: RunStatus,
        result: RunResult,
    },
    RunFinished {
        batch_id: Uuid,
        result: RunResult,
    },
    BatchDone {
        batch_id: Uuid,
        results: Vec<RunResult>,
    },
}

/// Broadcast bus for [`LaunchEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LaunchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LaunchEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn emit(&self, event: LaunchEvent) {
        let _ = self.tx.send(event);
    }

    /// Logger that tags messages with a run name
    pub fn run_logger(&self, run: impl Into<String>) -> RunLogger {
        RunLogger {
            bus: self.clone(),
            run: run.into(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Writes a run's log lines to tracing and mirrors them onto the bus
#[derive(Debug, Clone)]
pub struct RunLogger {
    bus: EventBus,
    run: String,
}

impl RunLogger {
    pub fn run(&self) -> &str {
        &self.run
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into(), None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into(), None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into(), None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into(), None);
    }

    /// Log with a structured payload attached to the bus event
    pub fn info_with(&self, message: impl Into<String>, extra: Value) {
        self.log(LogLevel::Info, message.into(), Some(extra));
    }

    /// Publish a progress notification for `result`
    pub fn progress(&self, result: &RunResult) {
        self.bus.emit(LaunchEvent::Progress {
            run: self.run.clone(),
            status: result.status.clone(),
            result: result.clone(),
        });
    }

    fn log(&self, level: LogLevel, message: String, extra: Option<Value>) {
        match level {
            LogLevel::Debug => debug!(run = %self.run, "{}", message),
            LogLevel::Info => info!(run = %self.run, "{}", message),
            LogLevel::Warn => warn!(run = %self.run, "{}", message),
            LogLevel::Error => error!(run = %self.run, "{}", message),
        }

        self.bus.emit(LaunchEvent::Log {
            run: self.run.clone(),
            level,
            message,
            extra,
        });
    }
}
