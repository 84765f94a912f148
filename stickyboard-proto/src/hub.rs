//! Wire protocol between clients and the `StickyBoard` hub.
//!
//! Frames are postcard-encoded and carried in WebSocket binary messages.
//! Every [`ClientFrame`] carries a request id which the hub echoes in the
//! matching [`ServerFrame::Response`]. Change notifications are pushed as
//! [`ServerFrame::Change`] at any time once the connection has subscribed.
//!
//! A connection is one auth session: `SignIn` binds it to an account until
//! `SignOut` or disconnect.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::event::ChangeEvent;
use crate::task::{NewTask, Task, TaskId, TaskPatch};
use crate::user::User;

/// Default maximum encoded frame size accepted by the hub (256 KB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Correlates a response with its request.
pub type RequestId = u64;

/// Operations a client can ask the hub to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Register a new account. Does not sign in.
    SignUp {
        /// Login email.
        email: String,
        /// Plain password; only its salted digest is kept.
        password: String,
        /// Display name; defaults to the local part of the email.
        display_name: Option<String>,
    },
    /// Bind this connection to an account.
    SignIn {
        /// Login email.
        email: String,
        /// Plain password.
        password: String,
    },
    /// Unbind this connection and drop its subscription.
    SignOut,
    /// All non-archived tasks of the signed-in user, newest first.
    ListTasks {
        /// Include archived rows.
        include_archived: bool,
    },
    /// Insert a row owned by the signed-in user.
    InsertTask(NewTask),
    /// Apply a partial update to one of the signed-in user's rows.
    UpdateTask {
        /// Target row.
        id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Hard-delete one of the signed-in user's rows.
    DeleteTask {
        /// Target row.
        id: TaskId,
    },
    /// Start receiving [`ServerFrame::Change`] for the signed-in user's rows.
    Subscribe,
    /// Stop receiving change notifications.
    Unsubscribe,
}

/// A request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Echoed back in the response.
    pub id: RequestId,
    /// The operation.
    pub request: Request,
}

/// Successful outcome of a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// The operation succeeded and returns nothing.
    Ack,
    /// An account (sign-up and sign-in).
    User(User),
    /// Result of `ListTasks`.
    Tasks(Vec<Task>),
    /// The authoritative row after `InsertTask` or `UpdateTask`.
    Task(Task),
}

/// Failure outcome of a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Fault {
    /// The connection is not signed in.
    #[error("not signed in")]
    Unauthenticated,
    /// Unknown email or wrong password.
    #[error("invalid login credentials")]
    InvalidCredentials,
    /// Sign-up for an email that is already registered.
    #[error("an account already exists for {email}")]
    AccountExists {
        /// The conflicting email.
        email: String,
    },
    /// No row with this id is visible to the signed-in user.
    #[error("task not found: {id}")]
    NotFound {
        /// The requested row.
        id: TaskId,
    },
    /// The request targets rows of another user.
    #[error("permission denied")]
    Forbidden,
    /// The request could not be decoded or is not valid in this state.
    #[error("malformed request: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },
}

/// Frames sent by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Answer to the client request with the same id.
    Response {
        /// The request id being answered.
        id: RequestId,
        /// Outcome of the request.
        result: Result<Reply, Fault>,
    },
    /// A committed change to one of the subscribed user's rows.
    Change(ChangeEvent),
}

/// Encodes a [`ClientFrame`].
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_client(frame: &ClientFrame) -> Result<Vec<u8>, CodecError> {
    codec::encode(frame)
}

/// Decodes a [`ClientFrame`], rejecting frames above `max_frame_size`.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is oversized or malformed.
pub fn decode_client(bytes: &[u8], max_frame_size: usize) -> Result<ClientFrame, CodecError> {
    codec::decode_bounded(bytes, max_frame_size)
}

/// Encodes a [`ServerFrame`].
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_server(frame: &ServerFrame) -> Result<Vec<u8>, CodecError> {
    codec::encode(frame)
}

/// Decodes a [`ServerFrame`].
///
/// # Errors
///
/// Returns [`CodecError`] if the bytes are malformed.
pub fn decode_server(bytes: &[u8]) -> Result<ServerFrame, CodecError> {
    codec::decode(bytes)
}
