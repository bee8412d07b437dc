//! HTTP surface of the server: a long-lived SSE stream per listener, a POST endpoint
//! whose reply is also fanned out to every listener, and a health check.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use chrono::SecondsFormat;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::protocol::ErrorCode;
use crate::router::ProtocolRouter;

pub const SSE_PATH: &str = "/sse";
pub const HEALTH_PATH: &str = "/health";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

type Payload = Arc<str>;

/// Payloads buffered per listener before it is considered stalled and evicted.
pub const LISTENER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct ListenerSet {
    next_id: AtomicU64,
    senders: Mutex<HashMap<u64, mpsc::Sender<Payload>>>,
}

/// The set of open SSE channels. Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct Listeners {
    inner: Arc<ListenerSet>,
}

/// Keeps a listener registered; dropping it removes the listener.
#[derive(Debug)]
pub struct ListenerGuard {
    id: u64,
    set: Arc<ListenerSet>,
}

impl ListenerGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if self.set.senders.lock().remove(&self.id).is_some() {
            debug!("Listener {} disconnected", self.id);
        }
    }
}

impl Listeners {
    pub fn register(&self) -> (ListenerGuard, mpsc::Receiver<Payload>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(LISTENER_QUEUE_CAPACITY);
        self.inner.senders.lock().insert(id, tx);
        debug!("Listener {} connected", id);
        let guard = ListenerGuard {
            id,
            set: Arc::clone(&self.inner),
        };
        (guard, rx)
    }

    pub fn len(&self) -> usize {
        self.inner.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `payload` to every listener registered when the call began. Listeners whose
    /// channel is closed or whose queue is full are evicted. Returns the number of
    /// successful deliveries.
    pub fn broadcast(&self, payload: &Payload) -> usize {
        let snapshot: Vec<(u64, mpsc::Sender<Payload>)> = self
            .inner
            .senders
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in snapshot {
            match tx.try_send(Arc::clone(payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Evicting listener {}: not reading, queue full", id);
                    self.inner.senders.lock().remove(&id);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Evicting listener {} after failed send", id);
                    self.inner.senders.lock().remove(&id);
                }
            }
        }
        delivered
    }

    /// Drops every sender, which ends all open SSE streams.
    pub fn clear(&self) {
        let mut senders = self.inner.senders.lock();
        if !senders.is_empty() {
            info!("Closing {} SSE listener(s)", senders.len());
        }
        senders.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,
    pub listener_count: usize,
    pub already_running: bool,
}

struct RunningServer {
    address: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
struct AppState {
    router: Arc<ProtocolRouter>,
    listeners: Listeners,
}

/// An explicitly owned SSE server. Nothing here is global: whoever owns the process
/// lifecycle constructs it, starts it and stops it.
pub struct SseServer {
    router: Arc<ProtocolRouter>,
    config: ServerConfig,
    listeners: Listeners,
    running: tokio::sync::Mutex<Option<RunningServer>>,
}

impl SseServer {
    pub fn new(router: Arc<ProtocolRouter>, config: ServerConfig) -> Self {
        Self {
            router,
            config,
            listeners: Listeners::default(),
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Binds `host:port` and starts serving. Calling it again while running returns the
    /// current status with `already_running` set and leaves listeners untouched.
    pub async fn start(&self, port: u16) -> Result<ServerStatus, TransportError> {
        let mut running = self.running.lock().await;
        if let Some(server) = running.as_ref() {
            debug!("SSE server already running on {}", server.address);
            return Ok(ServerStatus {
                running: true,
                address: Some(server.address),
                listener_count: self.listeners.len(),
                already_running: true,
            });
        }

        let address = format!("{}:{}", self.config.host, port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| TransportError::Bind {
                address: address.clone(),
                source,
            })?;
        let local = listener.local_addr().map_err(TransportError::Serve)?;

        let app = self.app();
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = signal.await;
            });
            if let Err(e) = server.await {
                error!("SSE server error: {}", e);
            }
        });

        info!("SSE server listening on http://{}{}", local, SSE_PATH);
        *running = Some(RunningServer {
            address: local,
            shutdown,
            task,
        });

        Ok(ServerStatus {
            running: true,
            address: Some(local),
            listener_count: self.listeners.len(),
            already_running: false,
        })
    }

    /// Closes every listener, signals shutdown and waits up to the configured grace
    /// period before aborting the accept loop. Does nothing when not running.
    pub async fn stop(&self) {
        let Some(mut server) = self.running.lock().await.take() else {
            return;
        };

        self.listeners.clear();
        let _ = server.shutdown.send(());
        match tokio::time::timeout(self.config.shutdown_grace, &mut server.task).await {
            Ok(_) => info!("SSE server on {} stopped", server.address),
            Err(_) => {
                warn!(
                    "SSE server on {} did not stop within {:?}, aborting",
                    server.address, self.config.shutdown_grace
                );
                server.task.abort();
            }
        }
    }

    pub async fn status(&self) -> ServerStatus {
        let running = self.running.lock().await;
        ServerStatus {
            running: running.is_some(),
            address: running.as_ref().map(|server| server.address),
            listener_count: self.listeners.len(),
            already_running: false,
        }
    }

    fn app(&self) -> axum::Router {
        let state = AppState {
            router: Arc::clone(&self.router),
            listeners: self.listeners.clone(),
        };
        axum::Router::new()
            .route(SSE_PATH, get(open_stream).post(submit))
            .route(HEALTH_PATH, get(health))
            .with_state(state)
    }
}

async fn open_stream(State(state): State<AppState>) -> impl IntoResponse {
    let (guard, rx) = state.listeners.register();
    let connected = Event::default()
        .event("connected")
        .data(json!({ "listenerId": guard.id() }).to_string());

    // The guard travels with the stream so the listener is removed when axum drops it.
    let updates = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let payload = rx.recv().await?;
        let event = Event::default().data(&*payload);
        Some((Ok::<_, Infallible>(event), (rx, guard)))
    });

    Sse::new(stream::once(async move { Ok::<_, Infallible>(connected) }).chain(updates))
        .keep_alive(KeepAlive::default())
}

async fn submit(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let response = state.router.handle_body(&body).await;
    let payload: Payload = Arc::from(response.to_json());

    let unparseable = response
        .error()
        .is_some_and(|e| e.code == ErrorCode::ParseError);
    if !unparseable {
        let delivered = state.listeners.broadcast(&payload);
        debug!("Broadcast response to {} listener(s)", delivered);
    }

    ([(header::CONTENT_TYPE, "application/json")], payload.to_string())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let clients = state.listeners.len();
    Json(json!({
        "status": "ok",
        "clients": clients,
        "listenerCount": clients,
        "timestamp": health_timestamp(chrono::Utc::now()),
    }))
}

/// ISO-8601 UTC with millisecond precision, e.g. `2026-10-19T16:37:38.528Z`.
fn health_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
