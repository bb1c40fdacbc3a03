//! Playwright browser automation
//!
//! A [`PlaywrightTarget`] owns a long-lived `node` process running the
//! bridge script in `assets/bridge.js`. The bridge holds one browser
//! context and one page; requests and replies travel as newline-delimited
//! JSON over stdin/stdout, interleaved with page events:
//!
//! ```text
//! → {"id":1,"op":"goto","url":"http://127.0.0.1:4173/stack.html"}
//! ← {"event":{"kind":"console","level":"error","text":"..."}}
//! ← {"id":1,"ok":true,"value":null}
//! ```
//!
//! A single reader task consumes stdout, so events reach listeners in the
//! order the page emitted them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{E2eError, E2eResult};
use crate::events::{DialogPolicy, ObservedEvent};
use crate::session::Launcher;
use crate::target::{Action, EventListener, Probe, Target};

const BRIDGE_JS: &str = include_str!("../assets/bridge.js");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser '{}'", other))),
        }
    }
}

/// Configuration for the Playwright bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Node.js executable
    pub node_binary: PathBuf,
    /// `node_modules` directory containing `playwright`
    pub node_modules: PathBuf,
    /// Time allowed for the browser to start and the page to exist
    pub launch_timeout_ms: u64,
    /// Upper bound on any single bridge request
    pub request_timeout_ms: u64,
    /// Playwright's per-action timeout (click, fill, ...)
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            node_modules: PathBuf::from("node_modules"),
            launch_timeout_ms: 30_000,
            request_timeout_ms: 60_000,
            action_timeout_ms: 5_000,
            navigation_timeout_ms: 30_000,
        }
    }
}

/// Arguments handed to the bridge on its command line
#[derive(Debug, Serialize)]
struct BridgeConfig<'a> {
    browser: &'static str,
    headless: bool,
    viewport_width: u32,
    viewport_height: u32,
    action_timeout_ms: u64,
    navigation_timeout_ms: u64,
    dialog_policy: &'a DialogPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeRequest {
    Goto { url: String },
    Read { selector: String, probe: Probe },
    Count { selector: String },
    Act { selector: String, action: Action },
    Evaluate { expression: String },
    DialogPolicy { policy: DialogPolicy },
    Close,
}

impl BridgeRequest {
    fn op(&self) -> &'static str {
        match self {
            BridgeRequest::Goto { .. } => "goto",
            BridgeRequest::Read { .. } => "read",
            BridgeRequest::Count { .. } => "count",
            BridgeRequest::Act { .. } => "act",
            BridgeRequest::Evaluate { .. } => "evaluate",
            BridgeRequest::DialogPolicy { .. } => "dialog_policy",
            BridgeRequest::Close => "close",
        }
    }

    /// One request line, with the correlation id merged into the object
    fn encode(&self, id: u64) -> E2eResult<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("id".to_string(), Value::from(id));
        }
        Ok(serde_json::to_string(&value)?)
    }
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl BridgeReply {
    fn into_result(self) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.value);
        }
        let message = self.error.unwrap_or_else(|| "unknown bridge error".to_string());
        match self.code.as_deref() {
            Some("not_found") => Err(E2eError::ElementNotFound(message)),
            Some("navigation") => Err(E2eError::Navigation {
                url: String::new(),
                reason: message,
            }),
            _ => Err(E2eError::Bridge(message)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeMessage {
    Event { event: ObservedEvent },
    Reply(BridgeReply),
    Ready { ready: bool },
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeReply>>>>;

/// A page in a Playwright-driven browser
pub struct PlaywrightTarget {
    stdin: AsyncMutex<Option<ChildStdin>>,
    child: AsyncMutex<Option<Child>>,
    pending: Pending,
    listeners: Arc<Mutex<Vec<EventListener>>>,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightTarget {
    /// Start the bridge and wait until its page exists
    pub async fn launch(config: &BrowserConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_JS)?;

        let bridge_config = serde_json::to_string(&BridgeConfig {
            browser: config.browser.as_str(),
            headless: config.headless,
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            action_timeout_ms: config.action_timeout_ms,
            navigation_timeout_ms: config.navigation_timeout_ms,
            dialog_policy: &DialogPolicy::default(),
        })?;

        let node_modules = std::fs::canonicalize(&config.node_modules)
            .unwrap_or_else(|_| config.node_modules.clone());

        debug!("Launching Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .arg(bridge_config)
            .env("NODE_PATH", node_modules)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Bridge(format!(
                    "Failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdout unavailable".to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let listeners: Arc<Mutex<Vec<EventListener>>> = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = oneshot::channel();

        let reader = tokio::spawn(read_bridge_output(
            stdout,
            Arc::clone(&pending),
            Arc::clone(&listeners),
            ready_tx,
        ));

        match timeout(Duration::from_millis(config.launch_timeout_ms), ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(E2eError::Bridge(
                    "bridge exited before the page was ready".to_string(),
                ))
            }
            Err(_) => {
                return Err(E2eError::Bridge(format!(
                    "bridge not ready after {}ms",
                    config.launch_timeout_ms
                )))
            }
        }

        info!("Playwright {} page ready", config.browser.as_str());

        Ok(Self {
            stdin: AsyncMutex::new(Some(stdin)),
            child: AsyncMutex::new(Some(child)),
            pending,
            listeners,
            next_id: AtomicU64::new(1),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            reader,
            _script_dir: script_dir,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn request(&self, request: BridgeRequest) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = request.encode(id)?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        {
            let mut stdin = self.stdin.lock().await;
            let Some(stdin) = stdin.as_mut() else {
                self.pending.lock().remove(&id);
                return Err(E2eError::TargetClosed);
            };
            trace!("bridge <- {}", line);
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => reply.into_result(),
            Ok(Err(_)) => Err(E2eError::Bridge(format!(
                "bridge exited during {}",
                request.op()
            ))),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(E2eError::Bridge(format!(
                    "{} got no reply within {:?}",
                    request.op(),
                    self.request_timeout
                )))
            }
        }
    }
}

async fn read_bridge_output(
    stdout: ChildStdout,
    pending: Pending,
    listeners: Arc<Mutex<Vec<EventListener>>>,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Bridge stdout error: {}", e);
                break;
            }
        };
        trace!("bridge -> {}", line);

        match serde_json::from_str::<BridgeMessage>(&line) {
            Ok(BridgeMessage::Event { event }) => {
                let listeners = listeners.lock();
                for listener in listeners.iter() {
                    listener(event.clone());
                }
            }
            Ok(BridgeMessage::Reply(reply)) => {
                match pending.lock().remove(&reply.id) {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!("Dropping late reply {}", reply.id),
                }
            }
            Ok(BridgeMessage::Ready { .. }) => {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
            }
            Err(_) => debug!("Bridge output: {}", line),
        }
    }

    // Fail every outstanding request
    pending.lock().clear();
    debug!("Bridge output closed");
}

#[async_trait]
impl Target for PlaywrightTarget {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.request(BridgeRequest::Goto {
            url: url.to_string(),
        })
        .await
        .map_err(|e| match e {
            E2eError::Navigation { reason, .. } => E2eError::Navigation {
                url: url.to_string(),
                reason,
            },
            other => other,
        })?;
        Ok(())
    }

    async fn read(&self, selector: &str, probe: &Probe) -> E2eResult<Option<String>> {
        let value = self
            .request(BridgeRequest::Read {
                selector: selector.to_string(),
                probe: probe.clone(),
            })
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn count(&self, selector: &str) -> E2eResult<usize> {
        let value = self
            .request(BridgeRequest::Count {
                selector: selector.to_string(),
            })
            .await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| E2eError::Bridge(format!("count returned {}", value)))
    }

    async fn act(&self, selector: &str, action: &Action) -> E2eResult<()> {
        self.request(BridgeRequest::Act {
            selector: selector.to_string(),
            action: action.clone(),
        })
        .await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> E2eResult<Value> {
        self.request(BridgeRequest::Evaluate {
            expression: expression.to_string(),
        })
        .await
        .map_err(|e| match e {
            E2eError::Bridge(message) => E2eError::Evaluation(message),
            other => other,
        })
    }

    async fn set_dialog_policy(&self, policy: DialogPolicy) -> E2eResult<()> {
        self.request(BridgeRequest::DialogPolicy { policy }).await?;
        Ok(())
    }

    fn add_listener(&self, listener: EventListener) {
        self.listeners.lock().push(listener);
    }

    async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.request(BridgeRequest::Close).await {
            debug!("Bridge close request failed: {}", e);
        }

        // Dropping stdin lets the bridge exit even if close failed
        self.stdin.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => debug!("Bridge exited: {}", status),
                _ => {
                    warn!("Bridge did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
        self.reader.abort();
        Ok(())
    }
}

impl Drop for PlaywrightTarget {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// [`Launcher`] backed by the Playwright bridge
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    config: BrowserConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Launcher for PlaywrightLauncher {
    async fn launch(&self) -> E2eResult<Arc<dyn Target>> {
        let target = PlaywrightTarget::launch(&self.config).await?;
        Ok(Arc::new(target))
    }
}
