//! CDP client: one WebSocket per browser.
//!
//! Commands are matched to replies by id; events fan out to subscribers
//! registered per method name. The receive loop runs on its own task so
//! sending never waits on parsing.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Hard ceiling on a single command round trip. Anything slower than this
/// means the browser is gone, not busy.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("devtools endpoint unreachable: {0}")]
    Endpoint(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("command {0} timed out")]
    CommandTimeout(String),

    #[error("unexpected reply shape: missing {0}")]
    UnexpectedReply(&'static str),

    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, CdpError>;

/// Event subscriber callback. Runs on the receive task; must not block.
pub type EventCallback = Arc<dyn Fn(&CdpEvent) + Send + Sync>;

/// Client for a single browser connection.
pub struct CdpClient {
    next_id: AtomicU64,

    /// Commands awaiting replies, keyed by command id.
    pending: Arc<DashMap<CommandId, oneshot::Sender<CdpReply>>>,

    /// Event subscribers keyed by method name (e.g. "Network.loadingFailed").
    subscribers: Arc<DashMap<String, Vec<EventCallback>>>,

    ws_sink: Mutex<WsSink>,

    recv_task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl CdpClient {
    /// Connect to the browser behind a DevTools HTTP endpoint
    /// (e.g. "http://127.0.0.1:9222").
    pub async fn connect(endpoint: &str) -> Result<Arc<Self>> {
        let version_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
        let version: VersionInfo = reqwest::get(&version_url)
            .await
            .map_err(|e| CdpError::Endpoint(format!("{}: {}", version_url, e)))?
            .json()
            .await
            .map_err(|e| CdpError::Endpoint(format!("{}: {}", version_url, e)))?;

        tracing::debug!(browser = %version.browser, "connecting over websocket");

        let (ws_stream, _) = connect_async(&version.web_socket_debugger_url).await?;
        let (sink, mut stream) = ws_stream.split();

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            ws_sink: Mutex::new(sink),
            recv_task: parking_lot::Mutex::new(None),
        });

        let pending = client.pending.clone();
        let subscribers = client.subscribers.clone();
        let task = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        Self::handle_frame(&pending, &subscribers, &text);
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!("websocket closed by browser");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("websocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            // Wake every caller still waiting on a reply.
            pending.clear();
        });
        *client.recv_task.lock() = Some(task);

        Ok(client)
    }

    fn handle_frame(
        pending: &DashMap<CommandId, oneshot::Sender<CdpReply>>,
        subscribers: &DashMap<String, Vec<EventCallback>>,
        text: &str,
    ) {
        let frame: CdpFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("unparseable cdp frame: {}", e);
                return;
            }
        };

        match frame {
            CdpFrame::Reply(reply) => {
                if let Some((_, tx)) = pending.remove(&reply.id) {
                    let _ = tx.send(reply);
                } else {
                    tracing::warn!(id = reply.id, "reply for unknown command");
                }
            }
            CdpFrame::Event(event) => {
                if let Some(callbacks) = subscribers.get(&event.method) {
                    for callback in callbacks.value() {
                        callback(&event);
                    }
                }
            }
        }
    }

    /// Send a command and wait for its reply.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        let method = method.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let command = CdpCommand {
            id,
            method: method.clone(),
            params,
            session_id,
        };

        let json = serde_json::to_string(&command)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut sink = self.ws_sink.lock().await;
            sink.send(Message::Text(json)).await?;
        }

        let reply = match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(CdpError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                return Err(CdpError::CommandTimeout(method));
            }
        };

        if let Some(error) = reply.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Register a callback for an event method. There is no unsubscribe;
    /// subscriptions die with the connection.
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) {
        self.subscribers
            .entry(method.into())
            .or_default()
            .push(callback);
    }

    /// Close the connection and stop the receive task.
    pub async fn close(&self) -> Result<()> {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        let mut sink = self.ws_sink.lock().await;
        sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_resolves_matching_pending_command() {
        let pending: DashMap<CommandId, oneshot::Sender<CdpReply>> = DashMap::new();
        let subscribers: DashMap<String, Vec<EventCallback>> = DashMap::new();

        let (tx, mut rx) = oneshot::channel();
        pending.insert(42, tx);

        CdpClient::handle_frame(&pending, &subscribers, r#"{"id":42,"result":{"ok":true}}"#);

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.id, 42);
        assert!(pending.is_empty());
    }

    #[test]
    fn event_reaches_every_subscriber_for_its_method() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pending: DashMap<CommandId, oneshot::Sender<CdpReply>> = DashMap::new();
        let subscribers: DashMap<String, Vec<EventCallback>> = DashMap::new();

        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = hits.clone();
            subscribers
                .entry("Page.frameNavigated".to_string())
                .or_default()
                .push(Arc::new(move |_event| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }));
        }

        CdpClient::handle_frame(
            &pending,
            &subscribers,
            r#"{"method":"Page.frameNavigated","params":{"frame":{"url":"https://x.test"}}}"#,
        );
        CdpClient::handle_frame(
            &pending,
            &subscribers,
            r#"{"method":"Network.requestWillBeSent","params":{}}"#,
        );

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
