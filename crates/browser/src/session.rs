//! Session lifecycle and buffer queries.
//!
//! One session per process, one page per session. The state tag makes the
//! "exactly one active session" rule explicit: `start` is the only
//! transition to `Running`, `stop` the only one back, and `stop` is the
//! only operation that resets the telemetry store.
//!
//! Telemetry flows as messages: CDP subscriptions decode events and send
//! them into an unbounded queue; a single pump task applies them to the
//! store in arrival order. `stop` awaits the pump before clearing, so a
//! late event can never repopulate a cleared buffer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cdp::{CdpClient, CdpEvent, Page, SessionId};
use crate::error::BrowserError;
use crate::launcher::{self, ChromeHandle};
use crate::telemetry::{ConsoleEntry, NetworkEntry, PageError, PageEvent, TelemetryStore};

/// How long the network must stay quiet to count as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The CDP events one session subscribes to.
const SUBSCRIBED_METHODS: [&str; 6] = [
    "Runtime.consoleAPICalled",
    "Runtime.exceptionThrown",
    "Network.requestWillBeSent",
    "Network.responseReceived",
    "Network.loadingFailed",
    "Page.frameNavigated",
];

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chrome executable override; platform discovery otherwise.
    pub chrome_path: Option<PathBuf>,
    /// DevTools debugging port.
    pub debug_port: u16,
    /// Profile directory override.
    pub profile_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            debug_port: 9222,
            profile_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.debug_port)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("agent-browse")
                .join("profile")
        })
    }
}

/// Synchronous status view. The title is deliberately absent: reading it
/// needs a page round trip, and this call must never wait on the page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub title_unavailable: bool,
    pub console_count: usize,
    pub network_count: usize,
    pub error_count: usize,
}

enum SessionState {
    Idle,
    Running(RunningState),
}

struct RunningState {
    chrome: ChromeHandle,
    client: Arc<CdpClient>,
    page: Arc<Page>,
    pump: tokio::task::JoinHandle<()>,
}

/// The single browser session.
pub struct Session {
    config: SessionConfig,
    store: Arc<Mutex<TelemetryStore>>,
    state: RwLock<SessionState>,
    /// Serializes start/stop; queries read `state` without ever waiting on
    /// an in-progress transition.
    lifecycle: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            store: Arc::new(Mutex::new(TelemetryStore::new())),
            state: RwLock::new(SessionState::Idle),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Launch the browser, open one page, and wire up telemetry capture.
    /// Buffers are NOT cleared here; only `stop` resets them.
    pub async fn start(&self, headless: bool) -> Result<(), BrowserError> {
        let _transition = self.lifecycle.lock().await;
        if matches!(*self.state.read(), SessionState::Running(_)) {
            return Err(BrowserError::AlreadyRunning);
        }

        let mut chrome = launcher::launch(&self.config, headless).await?;

        let client = match CdpClient::connect(&self.config.endpoint()).await {
            Ok(client) => client,
            Err(e) => {
                chrome.kill().await;
                return Err(e.into());
            }
        };

        let page = match Page::create(client.clone()).await {
            Ok(page) => Arc::new(page),
            Err(e) => {
                let _ = client.close().await;
                chrome.kill().await;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        install_subscriptions(&client, page.session_id.clone(), tx);
        let pump = spawn_pump(self.store.clone(), rx);

        *self.state.write() = SessionState::Running(RunningState {
            chrome,
            client,
            page,
            pump,
        });

        tracing::info!("session started");
        Ok(())
    }

    /// Tear the session down and reset all telemetry. No-op when idle, so
    /// it is safe as the final cleanup step of an interrupt handler.
    pub async fn stop(&self) -> Result<(), BrowserError> {
        let _transition = self.lifecycle.lock().await;
        let state = std::mem::replace(&mut *self.state.write(), SessionState::Idle);
        let SessionState::Running(mut running) = state else {
            return Ok(());
        };

        // Barrier: the pump is the only writer to the store. Await its
        // termination so nothing can land after the clear below.
        running.pump.abort();
        let _ = (&mut running.pump).await;

        if let Err(e) = running.client.close().await {
            tracing::debug!("cdp close during stop: {}", e);
        }
        running.chrome.kill().await;

        self.store.lock().clear();
        tracing::info!("session stopped");
        Ok(())
    }

    /// The page handle, for the action layer. Borrowed per call; `stop`
    /// invalidates it.
    pub fn page(&self) -> Result<Arc<Page>, BrowserError> {
        match &*self.state.read() {
            SessionState::Running(running) => Ok(running.page.clone()),
            SessionState::Idle => Err(BrowserError::NotRunning),
        }
    }

    /// Status summary. Never blocks on the page.
    pub fn status(&self) -> SessionStatus {
        let running = matches!(*self.state.read(), SessionState::Running(_));
        let store = self.store.lock();
        let (console_count, network_count, error_count) = store.counts();
        SessionStatus {
            running,
            url: if running { store.current_url() } else { None },
            title_unavailable: true,
            console_count,
            network_count,
            error_count,
        }
    }

    pub fn read_console(&self, level: Option<&str>, drain: bool) -> Vec<ConsoleEntry> {
        self.store.lock().read_console(level, drain)
    }

    pub fn read_network(&self, filter: Option<&str>, drain: bool) -> Vec<NetworkEntry> {
        self.store.lock().read_network(filter, drain)
    }

    pub fn read_errors(&self, drain: bool) -> Vec<PageError> {
        self.store.lock().read_errors(drain)
    }

    /// Wait until no request has been in flight for half a second.
    pub async fn wait_for_network_idle(&self, timeout_ms: u64) -> Result<(), BrowserError> {
        // Fails up front when idle, like every other page operation.
        let _ = self.page()?;

        let start = Instant::now();
        let mut quiet_since: Option<Instant> = None;
        loop {
            if self.store.lock().inflight_count() == 0 {
                let since = *quiet_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= NETWORK_QUIET {
                    return Ok(());
                }
            } else {
                quiet_since = None;
            }

            if start.elapsed() >= Duration::from_millis(timeout_ms) {
                return Err(BrowserError::Timeout {
                    what: "network idle".to_string(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Decode-and-forward subscriptions for every method we record. Events for
/// other targets (the browser target, other sessions) are ignored.
fn install_subscriptions(
    client: &CdpClient,
    session_id: SessionId,
    tx: mpsc::UnboundedSender<PageEvent>,
) {
    for method in SUBSCRIBED_METHODS {
        let tx = tx.clone();
        let session_id = session_id.clone();
        client.subscribe(
            method,
            Arc::new(move |event: &CdpEvent| {
                if event.session_id.as_deref() != Some(session_id.as_str()) {
                    return;
                }
                if let Some(page_event) = PageEvent::from_cdp(&event.method, &event.params) {
                    let _ = tx.send(page_event);
                }
            }),
        );
    }
}

/// The single consumer of the event queue. All store mutation happens here,
/// in arrival order.
fn spawn_pump(
    store: Arc<Mutex<TelemetryStore>>,
    mut rx: mpsc::UnboundedReceiver<PageEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            store.lock().record(event);
        }
    })
}
