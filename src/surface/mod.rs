//! Automation surface: the capability used to drive the console's web UI
//!
//! A [`Browser`] is the expensive shared resource; each run opens its own
//! isolated [`BrowserContext`] and works on a [`Page`] inside it. Pages
//! publish every network response they observe through [`Page::responses`],
//! and [`wait_for_response`] builds targeted waits on top of that stream.

pub mod driver;
pub mod protocol;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

pub use driver::{DriverBrowser, DriverClient};

/// Error types for automation surface operations
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("Automation driver error: {0}")]
    Driver(String),

    #[error("Automation driver is gone: {0}")]
    Disconnected(String),
}

/// Opaque session state (cookies, storage) captured from a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedState(pub Value);

/// A network response observed by a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedResponse {
    pub url: String,
    /// Method of the request that produced this response
    pub method: String,
    pub status: u16,
    /// Parsed JSON body, when the body was JSON
    #[serde(default)]
    pub body: Option<Value>,
}

/// Selects responses by URL substring and, optionally, request method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    pub url_contains: String,
    pub method: Option<String>,
}

impl ResponseMatcher {
    pub fn new(url_contains: impl Into<String>) -> Self {
        Self {
            url_contains: url_contains.into(),
            method: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn matches(&self, response: &InterceptedResponse) -> bool {
        response.url.contains(&self.url_contains)
            && self
                .method
                .as_ref()
                .map_or(true, |m| m.eq_ignore_ascii_case(&response.method))
    }
}

/// Heuristic in-page scans run through [`Page::evaluate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomScan {
    /// Click the first visible element matching any selector whose trimmed
    /// text equals one of the labels. Evaluates to `true` if one was clicked.
    ClickByExactText {
        selectors: Vec<String>,
        labels: Vec<String>,
    },
}

/// The shared automation resource
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open an isolated context, optionally seeded with a saved session
    async fn new_context(
        &self,
        state: Option<PersistedState>,
    ) -> Result<Arc<dyn BrowserContext>, SurfaceError>;

    /// Release the resource
    async fn close(&self) -> Result<(), SurfaceError>;
}

/// An isolated browsing context (own cookies and storage)
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn Page>, SurfaceError>;

    /// Capture the context's session state for later reuse
    async fn storage_state(&self) -> Result<PersistedState, SurfaceError>;

    async fn close(&self) -> Result<(), SurfaceError>;
}

/// One page of the console
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the network to go idle
    async fn navigate(&self, url: &str) -> Result<(), SurfaceError>;

    async fn current_url(&self) -> Result<String, SurfaceError>;

    /// Whether the first element matching `selector` is visible right now
    async fn is_visible(&self, selector: &str) -> Result<bool, SurfaceError>;

    /// Wait until the first element matching `selector` is visible
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), SurfaceError>;

    /// Click the first element matching `selector`
    async fn click(&self, selector: &str, force: bool) -> Result<(), SurfaceError>;

    /// Fill the first input matching `selector`
    async fn fill(&self, selector: &str, value: &str, force: bool) -> Result<(), SurfaceError>;

    /// Wait until the page URL contains `fragment`
    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<(), SurfaceError>;

    /// Run a heuristic scan inside the page
    async fn evaluate(&self, scan: &DomScan) -> Result<Value, SurfaceError>;

    /// Subscribe to every response the page observes from now on
    fn responses(&self) -> broadcast::Receiver<InterceptedResponse>;
}

/// Wait for the next response on `rx` accepted by `matcher`
///
/// Returns `None` when the window closes or the page stops publishing.
/// Subscribe before triggering the request so its response cannot be missed.
pub async fn wait_for_response(
    rx: &mut broadcast::Receiver<InterceptedResponse>,
    matcher: &ResponseMatcher,
    window: Duration,
) -> Option<InterceptedResponse> {
    tokio::time::timeout(window, next_response(rx, matcher))
        .await
        .ok()
        .flatten()
}

/// Next response on `rx` accepted by `matcher`, without a time bound
///
/// Returns `None` once the page stops publishing.
pub async fn next_response(
    rx: &mut broadcast::Receiver<InterceptedResponse>,
    matcher: &ResponseMatcher,
) -> Option<InterceptedResponse> {
    loop {
        match rx.recv().await {
            Ok(response) if matcher.matches(&response) => return Some(response),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Response subscriber lagged, skipped {} responses", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
