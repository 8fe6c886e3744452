//! Automation surface backed by a driver subprocess
//!
//! The driver (for example a small Playwright bridge script) is spawned once
//! per batch and spoken to over stdin/stdout using the line protocol in
//! [`protocol`](super::protocol). A reader task routes replies to their
//! waiting requests and fans response events out to the page they belong to.

use crate::core::config::DriverConfig;
use crate::surface::protocol::{DriverMessage, DriverOp, DriverRequest, ReplyError};
use crate::surface::{
    Browser, BrowserContext, DomScan, InterceptedResponse, Page, PersistedState, SurfaceError,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Buffered responses per page subscriber
const PAGE_EVENT_CAPACITY: usize = 256;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;
type PageChannels = Arc<Mutex<HashMap<String, broadcast::Sender<InterceptedResponse>>>>;

/// Connection to one driver process
pub struct DriverClient {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    pending: Pending,
    pages: PageChannels,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl DriverClient {
    /// Spawn the driver process described by `config`
    ///
    /// # Errors
    /// Returns `SurfaceError::Driver` if the program cannot be spawned or its
    /// pipes are unavailable.
    pub fn spawn(config: &DriverConfig) -> Result<Arc<Self>, SurfaceError> {
        debug!("Spawning automation driver: {} {:?}", config.program, config.args);

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SurfaceError::Driver(format!("Failed to spawn {}: {}", config.program, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SurfaceError::Driver("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SurfaceError::Driver("driver stdout unavailable".to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let pages: PageChannels = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(read_loop(stdout, pending.clone(), pages.clone()));

        Ok(Arc::new(Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            pending,
            pages,
            next_id: AtomicU64::new(1),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }))
    }

    /// Send one operation and wait for its reply
    pub async fn request(&self, op: DriverOp) -> Result<Value, SurfaceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = op.name();
        // Waits the driver bounds itself get their own budget on top of ours
        let budget = self.request_timeout
            + op.own_timeout_ms().map(Duration::from_millis).unwrap_or_default();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut line = serde_json::to_string(&DriverRequest { id, op })
            .map_err(|e| SurfaceError::Driver(format!("Failed to encode {}: {}", name, e)))?;
        line.push('\n');

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match timeout(budget, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(match ReplyError::classify(message) {
                ReplyError::Timeout(m) => SurfaceError::Timeout(budget, format!("{}: {}", name, m)),
                ReplyError::NotFound(m) => SurfaceError::ElementNotFound(m),
                ReplyError::Other(m) => SurfaceError::Driver(format!("{} failed: {}", name, m)),
            }),
            Ok(Err(_)) => Err(SurfaceError::Disconnected(format!(
                "driver exited while waiting for {}",
                name
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SurfaceError::Timeout(budget, name.to_string()))
            }
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), SurfaceError> {
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SurfaceError::Disconnected(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SurfaceError::Disconnected(e.to_string()))
    }

    /// Route the page's response events; the stream closes when the driver
    /// exits or the page's context is closed
    async fn register_page(&self, page: &str) -> broadcast::Receiver<InterceptedResponse> {
        let (tx, rx) = broadcast::channel(PAGE_EVENT_CAPACITY);
        self.pages.lock().await.insert(page.to_string(), tx);
        rx
    }

    async fn forget_pages(&self, pages: &[String]) {
        let mut channels = self.pages.lock().await;
        for page in pages {
            channels.remove(page);
        }
    }

    async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        match timeout(self.request_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("Automation driver exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for automation driver: {}", e),
            Err(_) => {
                warn!("Automation driver did not exit, killing it");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill automation driver: {}", e);
                }
            }
        }
    }
}

async fn read_loop(stdout: ChildStdout, pending: Pending, pages: PageChannels) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read from automation driver: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<DriverMessage>(&line) {
            Ok(DriverMessage::Reply { id, ok, result, error }) => {
                let Some(tx) = pending.lock().await.remove(&id) else {
                    debug!("Dropping reply for unknown request {}", id);
                    continue;
                };
                let outcome = if ok {
                    Ok(result.unwrap_or(Value::Null))
                } else {
                    Err(error.unwrap_or_else(|| "unknown driver error".to_string()))
                };
                let _ = tx.send(outcome);
            }
            Ok(DriverMessage::Response { page, response }) => {
                if let Some(tx) = pages.lock().await.get(&page) {
                    // No subscribers is fine: nobody is waiting on this page
                    let _ = tx.send(response);
                }
            }
            Err(e) => debug!("Ignoring unparseable driver line ({}): {}", e, line),
        }
    }

    debug!("Automation driver output closed");
    // Dropping the senders wakes every waiter with a disconnect
    pending.lock().await.clear();
    pages.lock().await.clear();
}

/// Shared browser driven through a [`DriverClient`]
pub struct DriverBrowser {
    client: Arc<DriverClient>,
}

impl DriverBrowser {
    /// Spawn the driver and launch its browser
    pub async fn launch(config: &DriverConfig, headless: bool) -> Result<Self, SurfaceError> {
        let client = DriverClient::spawn(config)?;
        client.request(DriverOp::Launch { headless }).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Browser for DriverBrowser {
    async fn new_context(
        &self,
        state: Option<PersistedState>,
    ) -> Result<Arc<dyn BrowserContext>, SurfaceError> {
        let id = self
            .client
            .request(DriverOp::NewContext {
                state: state.map(|s| s.0),
            })
            .await?;
        Ok(Arc::new(DriverContext {
            client: self.client.clone(),
            id: handle(id, "new_context")?,
            pages: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        let result = self.client.request(DriverOp::Close).await.map(|_| ());
        self.client.shutdown().await;
        result
    }
}

struct DriverContext {
    client: Arc<DriverClient>,
    id: String,
    pages: Mutex<Vec<String>>,
}

#[async_trait]
impl BrowserContext for DriverContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>, SurfaceError> {
        let id = self
            .client
            .request(DriverOp::NewPage {
                context: self.id.clone(),
            })
            .await?;
        let id = handle(id, "new_page")?;
        let events = self.client.register_page(&id).await;
        self.pages.lock().await.push(id.clone());

        Ok(Arc::new(DriverPage {
            client: self.client.clone(),
            id,
            events,
        }))
    }

    async fn storage_state(&self) -> Result<PersistedState, SurfaceError> {
        let state = self
            .client
            .request(DriverOp::StorageState {
                context: self.id.clone(),
            })
            .await?;
        Ok(PersistedState(state))
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        let pages = std::mem::take(&mut *self.pages.lock().await);
        self.client.forget_pages(&pages).await;
        self.client
            .request(DriverOp::CloseContext {
                context: self.id.clone(),
            })
            .await
            .map(|_| ())
    }
}

struct DriverPage {
    client: Arc<DriverClient>,
    id: String,
    /// Only used to hand out fresh subscriptions
    events: broadcast::Receiver<InterceptedResponse>,
}

impl DriverPage {
    fn page(&self) -> String {
        self.id.clone()
    }
}

#[async_trait]
impl Page for DriverPage {
    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        self.client
            .request(DriverOp::Navigate {
                page: self.page(),
                url: url.to_string(),
            })
            .await
            .map(|_| ())
            .map_err(|e| match e {
                SurfaceError::Driver(message) => SurfaceError::Navigation {
                    url: url.to_string(),
                    message,
                },
                other => other,
            })
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        let url = self
            .client
            .request(DriverOp::CurrentUrl { page: self.page() })
            .await?;
        Ok(url.as_str().unwrap_or_default().to_string())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, SurfaceError> {
        let visible = self
            .client
            .request(DriverOp::IsVisible {
                page: self.page(),
                selector: selector.to_string(),
            })
            .await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), SurfaceError> {
        self.client
            .request(DriverOp::WaitForVisible {
                page: self.page(),
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
            .await
            .map(|_| ())
    }

    async fn click(&self, selector: &str, force: bool) -> Result<(), SurfaceError> {
        self.client
            .request(DriverOp::Click {
                page: self.page(),
                selector: selector.to_string(),
                force,
            })
            .await
            .map(|_| ())
    }

    async fn fill(&self, selector: &str, value: &str, force: bool) -> Result<(), SurfaceError> {
        self.client
            .request(DriverOp::Fill {
                page: self.page(),
                selector: selector.to_string(),
                value: value.to_string(),
                force,
            })
            .await
            .map(|_| ())
    }

    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<(), SurfaceError> {
        self.client
            .request(DriverOp::WaitForUrl {
                page: self.page(),
                fragment: fragment.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
            .await
            .map(|_| ())
    }

    async fn evaluate(&self, scan: &DomScan) -> Result<Value, SurfaceError> {
        self.client
            .request(DriverOp::Evaluate {
                page: self.page(),
                scan: scan.clone(),
            })
            .await
    }

    fn responses(&self) -> broadcast::Receiver<InterceptedResponse> {
        self.events.resubscribe()
    }
}

fn handle(value: Value, op: &str) -> Result<String, SurfaceError> {
    match value {
        Value::String(id) if !id.is_empty() => Ok(id),
        other => Err(SurfaceError::Driver(format!(
            "{} returned no handle: {}",
            op, other
        ))),
    }
}
