//! Integration tests for the board over the in-process backend.
//!
//! Covers the note lifecycle (create, drag, delete), cross-session sync
//! through the change feed and the merge guards that keep the local
//! collection consistent when responses and events race.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use stickyboard::backend::memory::MemoryBackend;
use stickyboard::board::Board;
use stickyboard::canvas::{Bounds, DEFAULT_CLICK_GUARD, NoteDrag, OffscreenRecovery, Viewport};
use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::task::{Position, Priority, TaskPatch};

async fn signed_in_board(backend: &Arc<MemoryBackend>) -> Board<MemoryBackend> {
    let board = Board::new(Arc::clone(backend));
    board.sign_up("ada@example.com", "pw", None).await.unwrap();
    board.sign_in("ada@example.com", "pw").await.unwrap();
    board
}

async fn second_tab(backend: &Arc<MemoryBackend>) -> Board<MemoryBackend> {
    let board = Board::new(Arc::new(backend.session()));
    board.sign_in("ada@example.com", "pw").await.unwrap();
    board
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn viewport_bounds() -> Bounds {
    Bounds::for_viewport(Viewport::new(1024.0, 768.0))
}

// ---------------------------------------------------------------------------
// Note lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn buy_milk_lifecycle() {
    let backend = Arc::new(MemoryBackend::new());
    let board = signed_in_board(&backend).await;
    let store = board.store();

    let task = store
        .create("Buy milk", Position::new(50.0, 50.0), Priority::Low)
        .await
        .expect("create should succeed");
    assert_eq!(task.color, "#C8F7C5");
    assert_eq!(store.len(), 1);

    let mut drag = NoteDrag::new(&task, viewport_bounds(), DEFAULT_CLICK_GUARD);
    board.begin_drag(&mut drag, Position::new(50.0, 50.0));
    drag.pointer_moved(Position::new(5000.0, 5000.0));
    let saved = board.end_drag(&mut drag).await.unwrap();
    assert_eq!(saved, Some(Position::new(824.0, 618.0)));
    assert_eq!(backend.row(task.id).unwrap().position, Position::new(824.0, 618.0));
    assert_eq!(store.task(task.id).unwrap().position, Position::new(824.0, 618.0));

    tokio::time::sleep(DEFAULT_CLICK_GUARD + Duration::from_millis(20)).await;
    assert!(board.open_note(&drag));

    assert!(store.delete(task.id).await);
    assert!(store.is_empty());
    assert!(store.selection().is_none());
    assert_eq!(backend.row_count(), 0);

    let mut late = task.clone();
    late.title = "stale".to_string();
    assert!(!store.apply_change(&ChangeEvent::Update(late)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn empty_titles_get_placeholders() {
    let backend = Arc::new(MemoryBackend::new());
    let board = signed_in_board(&backend).await;
    let store = board.store();

    let task = store
        .create("", Position::new(0.0, 0.0), Priority::Medium)
        .await
        .unwrap();
    assert_eq!(task.title, "New Task");

    assert!(store.update(task.id, TaskPatch::default().with_title("")).await);
    assert_eq!(store.task(task.id).unwrap().title, "Untitled");
    assert_eq!(backend.row(task.id).unwrap().title, "Untitled");
}

#[tokio::test]
async fn update_position_is_idempotent() {
    let backend = Arc::new(MemoryBackend::new());
    let board = signed_in_board(&backend).await;
    let store = board.store();
    let task = store
        .create("t", Position::new(10.0, 10.0), Priority::High)
        .await
        .unwrap();

    store.update_position(task.id, Position::new(300.0, 200.0)).await.unwrap();
    let once = store.tasks();
    store.update_position(task.id, Position::new(300.0, 200.0)).await.unwrap();
    let twice = store.tasks();

    assert_eq!(once.len(), twice.len());
    assert_eq!(once[0].position, twice[0].position);
    assert_eq!(backend.row(task.id).unwrap().position, Position::new(300.0, 200.0));
}

#[tokio::test]
async fn deleted_task_is_absent_from_next_list() {
    let backend = Arc::new(MemoryBackend::new());
    let board = signed_in_board(&backend).await;
    let store = board.store();
    let keep = store.create("keep", Position::default(), Priority::Low).await.unwrap();
    let gone = store.create("gone", Position::default(), Priority::Low).await.unwrap();

    assert!(store.delete(gone.id).await);
    store.list().await;
    let ids: Vec<_> = store.tasks().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![keep.id]);
}

#[tokio::test]
async fn failed_move_keeps_local_position_and_records_error() {
    let backend = Arc::new(MemoryBackend::new());
    let board = signed_in_board(&backend).await;
    let store = board.store();
    let task = store
        .create("t", Position::new(100.0, 100.0), Priority::Low)
        .await
        .unwrap();

    backend.fail_next("network down");
    let mut drag = NoteDrag::new(&task, viewport_bounds(), DEFAULT_CLICK_GUARD);
    board.begin_drag(&mut drag, Position::new(100.0, 100.0));
    drag.pointer_moved(Position::new(400.0, 300.0));
    assert!(board.end_drag(&mut drag).await.is_err());

    assert_eq!(drag.position(), Position::new(400.0, 300.0));
    assert_eq!(store.task(task.id).unwrap().position, Position::new(100.0, 100.0));
    assert!(store.error().unwrap().contains("network down"));
    assert!(!board.ui().dragging);
}

// ---------------------------------------------------------------------------
// Cross-session sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_tabs_stay_in_sync() {
    let backend = Arc::new(MemoryBackend::new());
    let first = signed_in_board(&backend).await;
    first.start_realtime();
    let second = second_tab(&backend).await;
    second.start_realtime();
    wait_until(|| backend.subscriber_count() == 2).await;

    let task = second
        .store()
        .create("from tab two", Position::new(5.0, 5.0), Priority::Medium)
        .await
        .unwrap();
    wait_until(|| first.store().task(task.id).is_some()).await;

    first
        .store()
        .update_position(task.id, Position::new(120.0, 80.0))
        .await
        .unwrap();
    wait_until(|| {
        second.store().task(task.id).map(|t| t.position) == Some(Position::new(120.0, 80.0))
    })
    .await;
    assert_eq!(
        second.store().task(task.id).unwrap().position,
        Position::new(120.0, 80.0)
    );

    second.store().select(second.store().task(task.id));
    assert!(first.store().delete(task.id).await);
    wait_until(|| second.store().task(task.id).is_none()).await;
    assert!(second.store().is_empty());
    assert!(second.store().selection().is_none());
    assert!(first.store().is_empty());
}

#[tokio::test]
async fn own_insert_event_does_not_duplicate() {
    let backend = Arc::new(MemoryBackend::new());
    let board = signed_in_board(&backend).await;
    board.start_realtime();
    wait_until(|| backend.subscriber_count() == 1).await;

    let task = board
        .store()
        .create("once", Position::default(), Priority::Low)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(board.store().len(), 1);

    assert!(!board.store().apply_change(&ChangeEvent::Insert(task)));
    assert_eq!(board.store().len(), 1);
}

#[tokio::test]
async fn other_users_changes_are_invisible() {
    let backend = Arc::new(MemoryBackend::new());
    let ada = signed_in_board(&backend).await;
    ada.start_realtime();
    wait_until(|| backend.subscriber_count() == 1).await;

    let bob = Board::new(Arc::new(backend.session()));
    bob.sign_up("bob@example.com", "pw", None).await.unwrap();
    bob.sign_in("bob@example.com", "pw").await.unwrap();
    bob.store()
        .create("bob's", Position::default(), Priority::High)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ada.store().is_empty());
}

#[tokio::test]
async fn recovery_pulls_offscreen_notes_back() {
    let backend = Arc::new(MemoryBackend::new());
    let board = signed_in_board(&backend).await;
    let store = board.store();
    let far = store
        .create("far", Position::new(3000.0, -40.0), Priority::Low)
        .await
        .unwrap();
    let near = store
        .create("near", Position::new(10.0, 10.0), Priority::Low)
        .await
        .unwrap();

    let report = OffscreenRecovery::new().run(store, &viewport_bounds()).await;
    assert!(report.is_clean());
    assert_eq!(report.corrected, vec![far.id]);
    assert_eq!(backend.row(far.id).unwrap().position, Position::new(824.0, 0.0));
    assert_eq!(backend.row(near.id).unwrap().position, Position::new(10.0, 10.0));
}
