//! Wire format spoken with the automation driver process
//!
//! One JSON object per line in each direction. Requests carry an `id` that
//! the matching reply echoes; `response` events arrive unsolicited whenever a
//! page observes network traffic.

use crate::surface::{DomScan, InterceptedResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request line sent to the driver
#[derive(Debug, Clone, Serialize)]
pub struct DriverRequest {
    pub id: u64,
    #[serde(flatten)]
    pub op: DriverOp,
}

/// Operations understood by the driver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DriverOp {
    Launch {
        headless: bool,
    },
    NewContext {
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<Value>,
    },
    NewPage {
        context: String,
    },
    StorageState {
        context: String,
    },
    CloseContext {
        context: String,
    },
    Navigate {
        page: String,
        url: String,
    },
    CurrentUrl {
        page: String,
    },
    IsVisible {
        page: String,
        selector: String,
    },
    WaitForVisible {
        page: String,
        selector: String,
        timeout_ms: u64,
    },
    Click {
        page: String,
        selector: String,
        force: bool,
    },
    Fill {
        page: String,
        selector: String,
        value: String,
        force: bool,
    },
    WaitForUrl {
        page: String,
        fragment: String,
        timeout_ms: u64,
    },
    Evaluate {
        page: String,
        scan: DomScan,
    },
    Close,
}

impl DriverOp {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            DriverOp::Launch { .. } => "launch",
            DriverOp::NewContext { .. } => "new_context",
            DriverOp::NewPage { .. } => "new_page",
            DriverOp::StorageState { .. } => "storage_state",
            DriverOp::CloseContext { .. } => "close_context",
            DriverOp::Navigate { .. } => "navigate",
            DriverOp::CurrentUrl { .. } => "current_url",
            DriverOp::IsVisible { .. } => "is_visible",
            DriverOp::WaitForVisible { .. } => "wait_for_visible",
            DriverOp::Click { .. } => "click",
            DriverOp::Fill { .. } => "fill",
            DriverOp::WaitForUrl { .. } => "wait_for_url",
            DriverOp::Evaluate { .. } => "evaluate",
            DriverOp::Close => "close",
        }
    }

    /// Time the driver itself may spend on this operation, if bounded
    pub fn own_timeout_ms(&self) -> Option<u64> {
        match self {
            DriverOp::WaitForVisible { timeout_ms, .. } | DriverOp::WaitForUrl { timeout_ms, .. } => {
                Some(*timeout_ms)
            }
            _ => None,
        }
    }
}

/// A line received from the driver
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverMessage {
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Response {
        page: String,
        #[serde(flatten)]
        response: InterceptedResponse,
    },
}

/// Errors reported by the driver in a failed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    Timeout(String),
    NotFound(String),
    Other(String),
}

impl ReplyError {
    /// Driver errors are free text; timeouts and missing elements are
    /// recognized by their conventional prefixes
    pub fn classify(message: String) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.starts_with("timeout") {
            ReplyError::Timeout(message)
        } else if lower.starts_with("not found") {
            ReplyError::NotFound(message)
        } else {
            ReplyError::Other(message)
        }
    }
}
