//! Integration tests for the remote backend against a real hub.
//!
//! Each test starts `stickyboard-hub` in-process on an OS-assigned port and
//! drives it through `RemoteBackend`, so the postcard protocol, request
//! correlation and change fan-out are exercised over a real socket.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use stickyboard::backend::remote::{RemoteBackend, RemoteOptions};
use stickyboard::backend::{AuthProvider, BackendError, ChangeFeed, RowStore, TaskQuery};
use stickyboard::board::Board;
use stickyboard::canvas::{Bounds, DEFAULT_CLICK_GUARD, NoteDrag, Viewport};
use stickyboard::realtime::RealtimeIngest;
use stickyboard_hub::state::HubState;
use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::task::{NewTask, Position, Priority, TaskId, TaskPatch};

/// Start the hub in-process and return a ws:// URL and its state.
async fn start_hub() -> (String, Arc<HubState>) {
    let state = Arc::new(HubState::new());
    let (addr, _handle) = stickyboard_hub::hub::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start hub");
    (format!("ws://{addr}/ws"), state)
}

async fn connect(url: &str) -> RemoteBackend {
    RemoteBackend::connect(url, RemoteOptions::default())
        .await
        .expect("failed to connect to hub")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sign_up_and_sign_in() {
    let (url, state) = start_hub().await;
    let backend = connect(&url).await;

    let user = backend
        .sign_up("ada@example.com", "secret", Some("Ada Lovelace"))
        .await
        .unwrap();
    assert_eq!(user.display_name, "Ada Lovelace");
    assert!(backend.current_user().is_none());
    assert_eq!(state.account_count().await, 1);

    let err = backend.sign_up("ada@example.com", "x", None).await.unwrap_err();
    assert!(matches!(err, BackendError::AccountExists(_)));

    let err = backend.sign_in("ada@example.com", "wrong").await.unwrap_err();
    assert_eq!(err, BackendError::InvalidCredentials);

    let mut auth = backend.watch_user();
    let signed_in = backend.sign_in("ada@example.com", "secret").await.unwrap();
    assert_eq!(signed_in.id, user.id);
    assert!(auth.has_changed().unwrap());
    assert_eq!(auth.borrow_and_update().as_ref().map(|u| u.id), Some(user.id));

    backend.sign_out().await.unwrap();
    assert!(backend.current_user().is_none());
}

#[tokio::test]
async fn rows_require_sign_in() {
    let (url, _state) = start_hub().await;
    let backend = connect(&url).await;
    let owner = backend
        .sign_up("ada@example.com", "pw", None)
        .await
        .unwrap()
        .id;

    let row = NewTask::new(owner, "t", Position::default(), Priority::Low);
    assert_eq!(backend.insert(row).await.unwrap_err(), BackendError::Unauthenticated);
    assert_eq!(
        backend.delete(TaskId::new()).await.unwrap_err(),
        BackendError::Unauthenticated
    );
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn board_round_trip_through_hub() {
    let (url, state) = start_hub().await;
    let board = Board::new(Arc::new(connect(&url).await));
    board.sign_up("ada@example.com", "pw", None).await.unwrap();
    board.sign_in("ada@example.com", "pw").await.unwrap();
    let store = board.store();

    let task = store
        .create("Buy milk", Position::new(50.0, 50.0), Priority::Low)
        .await
        .unwrap();
    assert_eq!(state.row_count().await, 1);

    let bounds = Bounds::for_viewport(Viewport::new(1024.0, 768.0));
    let mut drag = NoteDrag::new(&task, bounds, DEFAULT_CLICK_GUARD);
    board.begin_drag(&mut drag, Position::new(50.0, 50.0));
    drag.pointer_moved(Position::new(5000.0, 5000.0));
    assert_eq!(
        board.end_drag(&mut drag).await.unwrap(),
        Some(Position::new(824.0, 618.0))
    );

    store.list().await;
    assert!(store.error().is_none());
    let listed = store.task(task.id).unwrap();
    assert_eq!(listed.position, Position::new(824.0, 618.0));
    assert!(listed.updated_at > task.updated_at);

    assert!(store.delete(task.id).await);
    store.list().await;
    assert!(store.is_empty());
    assert_eq!(state.row_count().await, 0);
}

#[tokio::test]
async fn foreign_rows_are_rejected() {
    let (url, _state) = start_hub().await;
    let ada = connect(&url).await;
    ada.sign_up("ada@example.com", "pw", None).await.unwrap();
    let ada_user = ada.sign_in("ada@example.com", "pw").await.unwrap();
    let task = ada
        .insert(NewTask::new(ada_user.id, "mine", Position::default(), Priority::Low))
        .await
        .unwrap();

    let bob = connect(&url).await;
    bob.sign_up("bob@example.com", "pw", None).await.unwrap();
    bob.sign_in("bob@example.com", "pw").await.unwrap();

    let forged = NewTask::new(ada_user.id, "forged", Position::default(), Priority::Low);
    assert_eq!(bob.insert(forged).await.unwrap_err(), BackendError::Forbidden);

    let patch = TaskPatch::default().with_title("hijacked");
    assert_eq!(
        bob.update(task.id, &patch).await.unwrap_err(),
        BackendError::NotFound(task.id)
    );
    assert_eq!(
        bob.delete(task.id).await.unwrap_err(),
        BackendError::NotFound(task.id)
    );
    assert_eq!(
        bob.select(&TaskQuery::board(ada_user.id)).await.unwrap_err(),
        BackendError::Forbidden
    );

    let rows = ada.select(&TaskQuery::board(ada_user.id)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "mine");
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

#[tokio::test]
async fn changes_reach_other_connections_in_order() {
    let (url, _state) = start_hub().await;
    let first = Arc::new(connect(&url).await);
    first.sign_up("ada@example.com", "pw", None).await.unwrap();
    let user = first.sign_in("ada@example.com", "pw").await.unwrap();
    let mut ingest = RealtimeIngest::new(Arc::clone(&first));
    ingest.follow_user(Some(&user)).await.unwrap();

    let second = connect(&url).await;
    second.sign_in("ada@example.com", "pw").await.unwrap();
    let task = second
        .insert(NewTask::new(user.id, "shared", Position::new(1.0, 1.0), Priority::Medium))
        .await
        .unwrap();
    second
        .update(task.id, &TaskPatch::position(Position::new(40.0, 30.0)))
        .await
        .unwrap();
    second.delete(task.id).await.unwrap();

    let timeout = Duration::from_secs(5);
    let insert = tokio::time::timeout(timeout, ingest.recv()).await.unwrap();
    assert_eq!(insert, Some(ChangeEvent::Insert(task.clone())));
    match tokio::time::timeout(timeout, ingest.recv()).await.unwrap() {
        Some(ChangeEvent::Update(updated)) => {
            assert_eq!(updated.id, task.id);
            assert_eq!(updated.position, Position::new(40.0, 30.0));
        }
        other => panic!("expected an update, got {other:?}"),
    }
    let delete = tokio::time::timeout(timeout, ingest.recv()).await.unwrap();
    assert_eq!(delete, Some(ChangeEvent::Delete { id: task.id }));
}

#[tokio::test]
async fn two_boards_sync_through_hub() {
    let (url, _state) = start_hub().await;
    let first = Board::new(Arc::new(connect(&url).await));
    first.sign_up("ada@example.com", "pw", None).await.unwrap();
    first.sign_in("ada@example.com", "pw").await.unwrap();
    first.start_realtime();

    let second = Board::new(Arc::new(connect(&url).await));
    second.sign_in("ada@example.com", "pw").await.unwrap();
    second.start_realtime();
    // Let both drivers subscribe before writing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let task = first
        .store()
        .create("from first", Position::new(5.0, 5.0), Priority::High)
        .await
        .unwrap();
    wait_until(|| second.store().task(task.id).is_some()).await;
    assert_eq!(second.store().len(), 1);
    assert_eq!(first.store().len(), 1);

    assert!(second.store().delete(task.id).await);
    wait_until(|| first.store().is_empty()).await;
    assert!(first.store().is_empty());
}

#[tokio::test]
async fn closing_subscription_unsubscribes_on_hub() {
    let (url, state) = start_hub().await;
    let backend = connect(&url).await;
    backend.sign_up("ada@example.com", "pw", None).await.unwrap();
    let user = backend.sign_in("ada@example.com", "pw").await.unwrap();

    let subscription = backend.subscribe(user.id).await.unwrap();
    assert_eq!(state.subscriber_count(), 1);

    subscription.close();
    wait_until(|| state.subscriber_count() == 0).await;
    assert_eq!(state.subscriber_count(), 0);

    // The connection stays usable after the fire-and-forget unsubscribe.
    let rows = backend.select(&TaskQuery::board(user.id)).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn dropped_connection_unsubscribes_on_hub() {
    let (url, state) = start_hub().await;
    {
        let backend = connect(&url).await;
        backend.sign_up("ada@example.com", "pw", None).await.unwrap();
        let user = backend.sign_in("ada@example.com", "pw").await.unwrap();
        let _subscription = backend.subscribe(user.id).await.unwrap();
        assert_eq!(state.subscriber_count(), 1);
    }
    wait_until(|| state.subscriber_count() == 0).await;
    assert_eq!(state.subscriber_count(), 0);
}
