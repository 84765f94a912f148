//! Hub server core: WebSocket handler, per-connection sessions and request
//! dispatch.
//!
//! Each WebSocket connection is one auth session. Requests arrive as
//! [`ClientFrame`]s and are answered with a [`ServerFrame::Response`]
//! carrying the same id. A subscribed connection also receives a
//! [`ServerFrame::Change`] for every committed change to its user's rows.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use stickyboard_proto::hub::{self, ClientFrame, Fault, Reply, Request, ServerFrame};
use stickyboard_proto::user::User;
use tokio::sync::mpsc;

use crate::state::{ConnectionId, HubState};

/// Auth state of one connection.
struct Session {
    connection: ConnectionId,
    user: Option<User>,
    tx: mpsc::UnboundedSender<Message>,
}

impl Session {
    fn user(&self) -> Result<&User, Fault> {
        self.user.as_ref().ok_or(Fault::Unauthenticated)
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Spawn a writer task draining the connection's outbound channel.
/// 2. Read frames, dispatch each request and queue its response.
/// 3. On disconnect, drop the connection's change-feed subscription.
pub async fn handle_socket(socket: WebSocket, state: Arc<HubState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection = state.next_connection_id();
    tracing::info!(connection, "connection opened");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        let mut session = Session {
            connection,
            user: None,
            tx,
        };
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&mut session, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(connection, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unsubscribe(connection);
    tracing::info!(connection, "connection closed");
}

/// Decodes one frame, dispatches it and queues the response.
///
/// Undecodable frames are answered with [`Fault::Malformed`] under request
/// id 0, since their id cannot be recovered.
async fn handle_binary_message(session: &mut Session, data: &[u8], state: &Arc<HubState>) {
    let ClientFrame { id, request } = match hub::decode_client(data, state.max_frame_size()) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(connection = session.connection, error = %e, "failed to decode frame");
            let reply = ServerFrame::Response {
                id: 0,
                result: Err(Fault::Malformed {
                    reason: e.to_string(),
                }),
            };
            send_frame(&session.tx, &reply);
            return;
        }
    };

    let result = dispatch(session, request, state).await;
    if let Err(fault) = &result {
        tracing::debug!(connection = session.connection, id, fault = %fault, "request failed");
    }
    send_frame(&session.tx, &ServerFrame::Response { id, result });
}

/// Performs `request` on behalf of `session`.
async fn dispatch(
    session: &mut Session,
    request: Request,
    state: &Arc<HubState>,
) -> Result<Reply, Fault> {
    match request {
        Request::SignUp {
            email,
            password,
            display_name,
        } => state
            .sign_up(&email, &password, display_name.as_deref())
            .await
            .map(Reply::User),
        Request::SignIn { email, password } => {
            let user = state.authenticate(&email, &password).await?;
            if session.user.as_ref().is_some_and(|current| current.id != user.id) {
                state.unsubscribe(session.connection);
            }
            tracing::info!(connection = session.connection, user_id = %user.id, "signed in");
            session.user = Some(user.clone());
            Ok(Reply::User(user))
        }
        Request::SignOut => {
            state.unsubscribe(session.connection);
            if let Some(user) = session.user.take() {
                tracing::info!(connection = session.connection, user_id = %user.id, "signed out");
            }
            Ok(Reply::Ack)
        }
        Request::ListTasks { include_archived } => {
            let owner = session.user()?.id;
            Ok(Reply::Tasks(state.list_tasks(owner, include_archived).await))
        }
        Request::InsertTask(row) => {
            let owner = session.user()?.id;
            state.insert_task(owner, row).await.map(Reply::Task)
        }
        Request::UpdateTask { id, patch } => {
            let owner = session.user()?.id;
            state.update_task(owner, id, &patch).await.map(Reply::Task)
        }
        Request::DeleteTask { id } => {
            let owner = session.user()?.id;
            state.delete_task(owner, id).await.map(|()| Reply::Ack)
        }
        Request::Subscribe => {
            let owner = session.user()?.id;
            state.subscribe(session.connection, owner, session.tx.clone());
            Ok(Reply::Ack)
        }
        Request::Unsubscribe => {
            state.unsubscribe(session.connection);
            Ok(Reply::Ack)
        }
    }
}

/// Encodes and queues a frame on a connection's outbound channel.
fn send_frame(tx: &mpsc::UnboundedSender<Message>, frame: &ServerFrame) {
    match hub::encode_server(frame) {
        Ok(bytes) => {
            let _ = tx.send(Message::Binary(bytes.into()));
        }
        Err(e) => tracing::error!(error = %e, "failed to encode response"),
    }
}

/// Starts the hub on the given address and returns the bound address and
/// a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(HubState::new())).await
}

/// Starts the hub with a pre-configured [`HubState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<HubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<HubState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
