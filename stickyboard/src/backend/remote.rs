//! WebSocket adapter for a `stickyboard-hub` backend.
//!
//! [`RemoteBackend`] speaks the hub protocol from
//! [`stickyboard_proto::hub`]: every call becomes a [`ClientFrame`] with a
//! fresh request id, and the background reader task completes the matching
//! pending call when the [`ServerFrame::Response`] arrives. Change frames
//! are forwarded to the currently open [`Subscription`], if any.
//!
//! One `RemoteBackend` is one hub connection and therefore one auth session.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::hub::{self, ClientFrame, Fault, Reply, Request, RequestId, ServerFrame};
use stickyboard_proto::task::{NewTask, Task, TaskId, TaskPatch};
use stickyboard_proto::user::{User, UserId};

use super::{AuthProvider, BackendError, ChangeFeed, RowStore, Subscription, TaskQuery};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Calls waiting for their response, keyed by request id.
type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Result<Reply, Fault>>>>>;

/// Default timeout for opening the WebSocket connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection tuning for [`RemoteBackend::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Timeout for the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Timeout for each request/response round trip.
    pub request_timeout: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Where pushed change events go.
struct FeedSink {
    id: u64,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// State shared with the reader task and subscription release hooks.
struct Link {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Pending,
    feed: Mutex<Option<FeedSink>>,
    next_request: AtomicU64,
    connected: AtomicBool,
}

impl Link {
    fn next_id(&self) -> RequestId {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Queues a frame for the writer task.
    fn send(&self, frame: &ClientFrame) -> Result<(), BackendError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(BackendError::ConnectionClosed);
        }
        let bytes =
            hub::encode_client(frame).map_err(|e| BackendError::Protocol(e.to_string()))?;
        self.outbound
            .send(Message::Binary(bytes.into()))
            .map_err(|_| BackendError::ConnectionClosed)
    }

    /// Drops the feed sink if it still belongs to subscription `id`.
    /// Returns `true` if it did.
    fn clear_feed(&self, id: u64) -> bool {
        let mut feed = self.feed.lock();
        if feed.as_ref().is_some_and(|sink| sink.id == id) {
            *feed = None;
            true
        } else {
            false
        }
    }
}

/// Backend contract implemented over a hub connection.
pub struct RemoteBackend {
    url: String,
    link: Arc<Link>,
    user: watch::Sender<Option<User>>,
    next_subscription: AtomicU64,
    request_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl RemoteBackend {
    /// Connects to the hub at `url` (`ws://` or `wss://`).
    ///
    /// The session starts signed out.
    ///
    /// # Errors
    ///
    /// - [`BackendError::Unreachable`] if the URL is invalid or the hub
    ///   refuses the connection.
    /// - [`BackendError::Timeout`] if the handshake does not finish within
    ///   `options.connect_timeout`.
    pub async fn connect(url: &str, options: RemoteOptions) -> Result<Self, BackendError> {
        validate_url(url)?;

        let (ws_stream, _response) =
            tokio::time::timeout(options.connect_timeout, connect_async(url))
                .await
                .map_err(|_| {
                    tracing::warn!(url, "hub WebSocket connect timed out");
                    BackendError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url, error = %e, "hub WebSocket connect failed");
                    BackendError::Unreachable(e.to_string())
                })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            feed: Mutex::new(None),
            next_request: AtomicU64::new(1),
            connected: AtomicBool::new(true),
        });

        let writer_handle = tokio::spawn(writer_loop(ws_sender, outbound_rx));
        let reader_handle = tokio::spawn(reader_loop(ws_reader, Arc::clone(&link)));
        tracing::info!(url, "connected to hub");

        let (user, _) = watch::channel(None);
        Ok(Self {
            url: url.to_string(),
            link,
            user,
            next_subscription: AtomicU64::new(1),
            request_timeout: options.request_timeout,
            reader_handle,
            writer_handle,
        })
    }

    /// The hub URL this backend is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the hub connection is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Relaxed)
    }

    /// Sends `request` and waits for its response.
    async fn call(&self, request: Request) -> Result<Reply, BackendError> {
        let id = self.link.next_id();
        let (tx, rx) = oneshot::channel();
        self.link.pending.lock().insert(id, tx);

        if let Err(e) = self.link.send(&ClientFrame { id, request }) {
            self.link.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Err(_) => {
                self.link.pending.lock().remove(&id);
                tracing::warn!(request_id = id, "hub request timed out");
                Err(BackendError::Timeout)
            }
            Ok(Err(_)) => Err(BackendError::ConnectionClosed),
            Ok(Ok(result)) => result.map_err(BackendError::from),
        }
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        self.link.connected.store(false, Ordering::Relaxed);
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

fn unexpected(reply: &Reply) -> BackendError {
    BackendError::Protocol(format!("unexpected reply: {reply:?}"))
}

impl RowStore for RemoteBackend {
    async fn select(&self, query: &TaskQuery) -> Result<Vec<Task>, BackendError> {
        if self.current_user().is_some_and(|user| user.id != query.owner) {
            return Err(BackendError::Forbidden);
        }
        let reply = self
            .call(Request::ListTasks {
                include_archived: query.include_archived,
            })
            .await?;
        match reply {
            Reply::Tasks(tasks) => {
                let mut tasks: Vec<Task> =
                    tasks.into_iter().filter(|t| query.matches(t)).collect();
                query.sort(&mut tasks);
                Ok(tasks)
            }
            other => Err(unexpected(&other)),
        }
    }

    async fn insert(&self, row: NewTask) -> Result<Task, BackendError> {
        match self.call(Request::InsertTask(row)).await? {
            Reply::Task(task) => Ok(task),
            other => Err(unexpected(&other)),
        }
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<(), BackendError> {
        let request = Request::UpdateTask {
            id,
            patch: patch.clone(),
        };
        match self.call(request).await? {
            Reply::Task(_) | Reply::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn delete(&self, id: TaskId) -> Result<(), BackendError> {
        match self.call(Request::DeleteTask { id }).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

impl AuthProvider for RemoteBackend {
    fn current_user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        let request = Request::SignIn {
            email: email.to_string(),
            password: password.to_string(),
        };
        match self.call(request).await? {
            Reply::User(user) => {
                tracing::info!(user_id = %user.id, "signed in to hub");
                self.user.send_replace(Some(user.clone()));
                Ok(user)
            }
            other => Err(unexpected(&other)),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, BackendError> {
        let request = Request::SignUp {
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.map(str::to_string),
        };
        match self.call(request).await? {
            Reply::User(user) => Ok(user),
            other => Err(unexpected(&other)),
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        match self.call(Request::SignOut).await? {
            Reply::Ack => {
                // The hub drops the connection's subscription on sign-out.
                self.link.feed.lock().take();
                if let Some(user) = self.user.send_replace(None) {
                    tracing::info!(user_id = %user.id, "signed out of hub");
                }
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    fn watch_user(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }
}

impl ChangeFeed for RemoteBackend {
    async fn subscribe(&self, owner: UserId) -> Result<Subscription, BackendError> {
        let user = self.current_user().ok_or(BackendError::Unauthenticated)?;
        if user.id != owner {
            return Err(BackendError::Forbidden);
        }

        let sub_id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        // Installed before the request so no change pushed right after the
        // hub's acknowledgment is lost.
        *self.link.feed.lock() = Some(FeedSink { id: sub_id, tx });

        match self.call(Request::Subscribe).await {
            Ok(Reply::Ack) => {}
            Ok(other) => {
                self.link.clear_feed(sub_id);
                return Err(unexpected(&other));
            }
            Err(e) => {
                self.link.clear_feed(sub_id);
                return Err(e);
            }
        }

        let link = Arc::clone(&self.link);
        Ok(Subscription::new(owner, rx, move || {
            if link.clear_feed(sub_id) {
                let frame = ClientFrame {
                    id: link.next_id(),
                    request: Request::Unsubscribe,
                };
                // Fire and forget: the response has no pending entry.
                let _ = link.send(&frame);
            }
        }))
    }
}

/// Drains queued frames into the socket.
async fn writer_loop(mut ws_sender: WsSender, mut outbound: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = ws_sender.send(msg).await {
            tracing::warn!(error = %e, "hub send failed");
            break;
        }
    }
    let _ = ws_sender.close().await;
}

/// Background task that reads hub frames and dispatches them.
///
/// Responses complete their pending call; change frames go to the active
/// feed sink. Malformed frames are logged and skipped. When the socket
/// closes, every pending call fails with [`BackendError::ConnectionClosed`]
/// and the active subscription ends.
async fn reader_loop(mut ws_reader: WsReader, link: Arc<Link>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match hub::decode_server(&data) {
                Ok(ServerFrame::Response { id, result }) => {
                    let waiter = link.pending.lock().remove(&id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(result);
                        }
                        None => tracing::debug!(request_id = id, "response without waiter"),
                    }
                }
                Ok(ServerFrame::Change(event)) => {
                    let mut feed = link.feed.lock();
                    let delivered = feed
                        .as_ref()
                        .is_some_and(|sink| sink.tx.send(event.clone()).is_ok());
                    if !delivered {
                        *feed = None;
                        tracing::debug!(task_id = %event.task_id(), "change without subscriber");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed hub frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("hub closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "hub WebSocket read error");
                break;
            }
        }
    }
    link.connected.store(false, Ordering::Relaxed);
    link.pending.lock().clear();
    link.feed.lock().take();
    tracing::info!("hub reader task exiting");
}

/// Accepts only `ws://` and `wss://` URLs.
fn validate_url(raw: &str) -> Result<(), BackendError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| BackendError::Unreachable(format!("invalid hub URL `{raw}`: {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(BackendError::Unreachable(format!(
            "hub URL must use ws:// or wss://, got {other}://"
        ))),
    }
}
