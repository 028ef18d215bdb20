//! Session management: WebSocket connect, request/response correlation, and
//! subscription routing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite;

use crate::protocol;
use crate::types::{Error, SandboxInfo, TimingConfig};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Port the in-sandbox daemon listens on; part of every per-sandbox host name.
pub(crate) const ENVD_PORT: u16 = 49982;
const WS_ROUTE: &str = "/ws";
const COMMAND_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Type aliases for WebSocket split halves
// ---------------------------------------------------------------------------

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub(crate) type WsRead = futures_util::stream::SplitStream<WsStream>;
pub(crate) type WsWrite = futures_util::stream::SplitSink<WsStream, tungstenite::Message>;

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

fn envd_host(info: &SandboxInfo, domain: &str) -> String {
    format!(
        "{ENVD_PORT}-{}-{}.{domain}",
        info.sandbox_id, info.client_id
    )
}

pub(crate) fn build_ws_url(info: &SandboxInfo, domain: &str) -> Result<String, Error> {
    let u = url::Url::parse(&format!("wss://{}{WS_ROUTE}", envd_host(info, domain)))?;
    Ok(u.to_string())
}

pub(crate) fn build_envd_url(info: &SandboxInfo, domain: &str) -> Result<String, Error> {
    let u = url::Url::parse(&format!("https://{}", envd_host(info, domain)))?;
    Ok(u.as_str().trim_end_matches('/').to_string())
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// A notification routed to the watcher or process that subscribed to it.
#[derive(Debug)]
pub(crate) struct Notification {
    pub subscription: String,
    pub result: Value,
}

/// Where notifications for one subscription go.
#[derive(Clone)]
pub(crate) enum Route {
    /// Bounded; notifications are dropped while the consumer is behind.
    Lossy(mpsc::Sender<Notification>),
    /// Unbounded; every notification is kept.
    Reliable(mpsc::UnboundedSender<Notification>),
}

impl Route {
    fn send(&self, n: Notification) -> Result<(), mpsc::error::TrySendError<Notification>> {
        match self {
            Route::Lossy(tx) => tx.try_send(n),
            Route::Reliable(tx) => tx
                .send(n)
                .map_err(|e| mpsc::error::TrySendError::Closed(e.0)),
        }
    }
}

enum Command {
    Call {
        method: &'static str,
        params: Vec<Value>,
        /// Set for subscribe calls: where notifications for the returned
        /// subscription id go.
        route: Option<Route>,
        reply: oneshot::Sender<Result<Value, Error>>,
    },
    Unroute {
        subscription: String,
    },
    /// A caller stopped waiting; forget requests nobody waits for.
    Expire,
}

/// Cloneable handle to the background task that owns the WebSocket.
#[derive(Clone)]
pub(crate) struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    cmd_tx: mpsc::Sender<Command>,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    closed: AtomicBool,
    request_timeout: Duration,
    route_capacity: usize,
}

impl Session {
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) || self.inner.cmd_tx.is_closed()
    }

    pub fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Route for watch events, bounded by `event_channel_capacity`.
    pub fn lossy_route(&self) -> (Route, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(self.inner.route_capacity);
        (Route::Lossy(tx), rx)
    }

    /// Route for process output and exit, which must never be dropped.
    pub fn reliable_route(&self) -> (Route, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Route::Reliable(tx), rx)
    }

    pub async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value, Error> {
        self.request(method, params, None).await
    }

    /// Subscribe and return the subscription id. Notifications carrying that
    /// id are sent to `route`, starting with the first frame after the
    /// response.
    pub async fn subscribe(
        &self,
        method: &'static str,
        params: Vec<Value>,
        route: Route,
    ) -> Result<String, Error> {
        match self.request(method, params, Some(route)).await? {
            Value::String(id) => Ok(id),
            other => Err(Error::UnexpectedResponse {
                method: method.to_string(),
                detail: format!("expected subscription id, got {other}"),
            }),
        }
    }

    /// Stop routing `subscription` locally, then tell the server.
    pub async fn unsubscribe(&self, method: &'static str, subscription: String) -> Result<(), Error> {
        self.ensure_open()?;
        self.inner
            .cmd_tx
            .send(Command::Unroute {
                subscription: subscription.clone(),
            })
            .await
            .map_err(|_| Error::Closed)?;
        self.call(method, vec![Value::String(subscription)]).await?;
        Ok(())
    }

    /// Mark the session closed and ask the event loop to shut down. Calls
    /// already in flight fail with [`Error::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let tx = match self.inner.close_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }

    async fn request(
        &self,
        method: &'static str,
        params: Vec<Value>,
        route: Option<Route>,
    ) -> Result<Value, Error> {
        self.ensure_open()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::Call {
                method,
                params,
                route,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Closed)?;

        let outcome = tokio::time::timeout(self.inner.request_timeout, reply_rx).await;
        match outcome {
            Ok(Ok(result)) => result,
            // Event loop exited before answering.
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                tracing::warn!(method, "request timed out");
                let _ = self.inner.cmd_tx.send(Command::Expire).await;
                Err(Error::Timeout(method.to_string()))
            }
        }
    }
}

/// Open the WebSocket and spawn the session event loop.
pub(crate) async fn connect(ws_url: &str, timing: &TimingConfig) -> Result<Session, Error> {
    let (ws, _resp) = tokio::time::timeout(
        timing.connect_timeout,
        tokio_tungstenite::connect_async(ws_url),
    )
    .await
    .map_err(|_| Error::Timeout("WebSocket connect".to_string()))??;
    let (ws_write, ws_read) = ws.split();
    tracing::debug!(url = ws_url, "session connected");

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (close_tx, close_rx) = oneshot::channel();

    tokio::spawn(run_event_loop(
        EventLoopState {
            ws_read,
            ws_write,
            in_flight: InFlight::default(),
            routes: HashMap::new(),
            next_id: 1,
            dropped_notifications: 0,
        },
        cmd_rx,
        close_rx,
    ));

    Ok(Session {
        inner: Arc::new(SessionInner {
            cmd_tx,
            close_tx: Mutex::new(Some(close_tx)),
            closed: AtomicBool::new(false),
            request_timeout: timing.request_timeout,
            route_capacity: timing.event_channel_capacity.max(1),
        }),
    })
}

// ---------------------------------------------------------------------------
// Background event loop
// ---------------------------------------------------------------------------

struct Pending {
    method: &'static str,
    route: Option<Route>,
    reply: oneshot::Sender<Result<Value, Error>>,
}

/// Requests sent on the session and not yet answered.
#[derive(Default)]
struct InFlight {
    pending: HashMap<u64, Pending>,
    /// Subscribe requests whose caller timed out, by id. A late success is
    /// released on the server.
    abandoned: HashMap<u64, &'static str>,
}

impl InFlight {
    /// Forget requests whose caller stopped waiting.
    fn expire(&mut self) {
        let abandoned = &mut self.abandoned;
        self.pending.retain(|&id, pending| {
            if !pending.reply.is_closed() {
                return true;
            }
            tracing::debug!(id, method = pending.method, "dropping expired request");
            if pending.route.is_some() {
                abandoned.insert(id, pending.method);
            }
            false
        });
    }
}

pub(crate) struct EventLoopState {
    ws_read: WsRead,
    ws_write: WsWrite,
    in_flight: InFlight,
    routes: HashMap<String, Route>,
    next_id: u64,
    dropped_notifications: u64,
}

impl EventLoopState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn send_request(&mut self, method: &'static str, params: Vec<Value>) {
        let id = self.next_id();
        let text = match protocol::encode_request(id, method, params) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(method, "failed to encode request: {e}");
                return;
            }
        };
        tracing::debug!(method, id, "sending request");
        if let Err(e) = self.ws_write.send(tungstenite::Message::Text(text.into())).await {
            tracing::warn!(method, "WebSocket write failed: {e}");
        }
    }
}

async fn run_event_loop(
    mut p: EventLoopState,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Call { method, params, route, reply }) => {
                        let id = p.next_id();
                        let text = match protocol::encode_request(id, method, params) {
                            Ok(text) => text,
                            Err(e) => {
                                let _ = reply.send(Err(e));
                                continue;
                            }
                        };
                        tracing::debug!(method, id, "sending request");
                        if let Err(e) = p.ws_write.send(tungstenite::Message::Text(text.into())).await {
                            tracing::warn!("WebSocket write failed: {e}");
                            let _ = reply.send(Err(e.into()));
                            break;
                        }
                        p.in_flight.pending.insert(id, Pending { method, route, reply });
                    }
                    Some(Command::Unroute { subscription }) => {
                        p.routes.remove(&subscription);
                    }
                    Some(Command::Expire) => p.in_flight.expire(),
                    None => {
                        tracing::debug!("All session handles dropped");
                        let _ = p.ws_write.send(tungstenite::Message::Close(None)).await;
                        break;
                    }
                }
            }

            frame = p.ws_read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text(&mut p, text.as_str()).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        tracing::info!(?frame, "Session closed by server");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore binary, ping, pong frames
                    }
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {e}");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = &mut close_rx => {
                tracing::debug!("Close requested");
                let _ = p.ws_write.send(tungstenite::Message::Close(None)).await;
                break;
            }
        }
    }

    for (id, pending) in p.in_flight.pending.drain() {
        tracing::debug!(id, method = pending.method, "failing in-flight request");
        let _ = pending.reply.send(Err(Error::Closed));
    }
    // Dropping the routes ends every watcher and process delivery task.
    p.routes.clear();
}

async fn handle_text(p: &mut EventLoopState, text: &str) {
    let msg = match protocol::decode_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!("Failed to decode message: {e}");
            return;
        }
    };

    if let Some(params) = msg.params {
        route_notification(p, params);
        return;
    }

    let Some(id) = msg.id else {
        tracing::debug!(method = ?msg.method, "Ignoring message without id");
        return;
    };
    let Some(pending) = p.in_flight.pending.remove(&id) else {
        match p.in_flight.abandoned.remove(&id) {
            Some(subscribe) => release_abandoned(p, subscribe, msg.result).await,
            None => tracing::debug!(id, "Response for unknown request"),
        }
        return;
    };

    let result = match msg.error {
        Some(err) => Err(protocol::rpc_error(err)),
        None => Ok(msg.result.unwrap_or(Value::Null)),
    };
    if let Some(route) = pending.route {
        if pending.reply.is_closed() {
            release_abandoned(p, pending.method, result.ok()).await;
            return;
        }
        if let Ok(Value::String(subscription)) = &result {
            p.routes.insert(subscription.clone(), route);
        }
    }
    tracing::debug!(id, method = pending.method, ok = result.is_ok(), "response received");
    let _ = pending.reply.send(result);
}

/// Unsubscribe a subscription whose caller timed out before the response.
async fn release_abandoned(
    p: &mut EventLoopState,
    subscribe: &'static str,
    result: Option<Value>,
) {
    let Some(Value::String(subscription)) = result else {
        return;
    };
    let Some(unsubscribe) = protocol::unsubscribe_method(subscribe) else {
        return;
    };
    tracing::info!(subscription = %subscription, "releasing subscription after timeout");
    p.send_request(unsubscribe, vec![Value::String(subscription)]).await;
}

fn route_notification(p: &mut EventLoopState, params: protocol::NotificationParams) {
    let outcome = match p.routes.get(&params.subscription) {
        Some(route) => route.send(Notification {
            subscription: params.subscription,
            result: params.result,
        }),
        None => {
            tracing::debug!(
                subscription = %params.subscription,
                "Notification for unknown subscription"
            );
            return;
        }
    };
    // Lossy routes never block the loop, so a slow watcher cannot stall
    // responses for everyone else on this session.
    match outcome {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(n)) => {
            p.dropped_notifications += 1;
            tracing::warn!(
                subscription = %n.subscription,
                total_dropped = p.dropped_notifications,
                "event channel full, dropping notification"
            );
        }
        Err(mpsc::error::TrySendError::Closed(n)) => {
            p.routes.remove(&n.subscription);
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery task registry
// ---------------------------------------------------------------------------

/// Delivery tasks (watchers, processes) spawned from one sandbox handle, so
/// closing the handle stops them.
#[derive(Clone, Default)]
pub(crate) struct TaskRegistry {
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl TaskRegistry {
    pub fn register(&self, handle: AbortHandle) {
        let mut tasks = match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    pub fn abort_all(&self) {
        let tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for task in tasks {
            task.abort();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
