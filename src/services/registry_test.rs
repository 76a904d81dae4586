use super::*;
use crate::frame::{Frame, Presence};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

fn registry() -> Registry {
    Registry::new("default", 64)
}

async fn recv(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("frame receive timed out")
        .expect("channel closed unexpectedly")
}

async fn admit(
    registry: &Registry,
    candidate: Option<&str>,
    room: Option<&str>,
) -> (Connection, RoomHandle, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(32);
    let (conn, handle) = registry.admit(candidate, room, tx).await.expect("admit should succeed");
    (conn, handle, rx)
}

#[test]
fn ident_validation() {
    assert!(is_valid_ident("a"));
    assert!(is_valid_ident("550e8400-e29b-41d4-a716-446655440000"));
    assert!(is_valid_ident("room_1.blue"));
    assert!(!is_valid_ident(""));
    assert!(!is_valid_ident("has space"));
    assert!(!is_valid_ident("slash/y"));
    assert!(!is_valid_ident(&"x".repeat(MAX_IDENT_LEN + 1)));
}

#[tokio::test]
async fn admit_keeps_valid_candidate_and_defaults_room() {
    let registry = registry();
    let (conn, handle, mut rx) = admit(&registry, Some("alice"), None).await;

    assert_eq!(conn.id, "alice");
    assert_eq!(conn.room, "default");
    assert_eq!(handle.id(), "default");
    assert_eq!(recv(&mut rx).await, Frame::Init(vec![]));
    assert_eq!(registry.lookup("alice").await, Some(conn));
}

#[tokio::test]
async fn admit_generates_id_for_absent_or_invalid_candidate() {
    let registry = registry();
    let (absent, _, _rx1) = admit(&registry, None, None).await;
    let (invalid, _, _rx2) = admit(&registry, Some("not valid!"), Some("bad room")).await;

    assert!(Uuid::parse_str(&absent.id).is_ok());
    assert!(Uuid::parse_str(&invalid.id).is_ok());
    assert_ne!(absent.id, invalid.id);
    assert_eq!(invalid.room, "default");
    assert_eq!(registry.connection_count().await, 2);
}

#[tokio::test]
async fn rooms_are_created_lazily_and_isolated() {
    let registry = registry();
    assert_eq!(registry.room_count().await, 0);

    let (a, room_red, mut rx_a) = admit(&registry, Some("a"), Some("red")).await;
    let (_b, _room_blue, mut rx_b) = admit(&registry, Some("b"), Some("blue")).await;
    assert_eq!(registry.room_count().await, 2);

    let _ = recv(&mut rx_a).await;
    let _ = recv(&mut rx_a).await;
    let _ = recv(&mut rx_b).await;
    let _ = recv(&mut rx_b).await;

    room_red.clear(a.id.clone(), a.session).await.expect("clear");
    let _ = room_red.snapshot().await.expect("snapshot");
    assert!(rx_b.try_recv().is_err(), "blue room must not see red traffic");
}

#[tokio::test]
async fn evict_is_idempotent() {
    let registry = registry();
    let (_a, _, mut rx_a) = admit(&registry, Some("a"), None).await;
    let (b, _, _rx_b) = admit(&registry, Some("b"), None).await;
    let _ = recv(&mut rx_a).await;
    let _ = recv(&mut rx_a).await;
    let _ = recv(&mut rx_a).await;

    registry.evict(&b.id).await.expect("evict");
    registry.evict(&b.id).await.expect("evict again");
    registry.evict("never-admitted").await.expect("evict unknown");

    assert_eq!(registry.lookup("b").await, None);
    assert_eq!(
        recv(&mut rx_a).await,
        Frame::UserLeft(Presence { count: 1, client_id: Some("b".into()) })
    );
    assert!(timeout(Duration::from_millis(80), rx_a.recv()).await.is_err());
}

#[tokio::test]
async fn duplicate_id_replaces_previous_connection() {
    let registry = registry();
    let (first, _, mut rx_first) = admit(&registry, Some("dup"), None).await;
    let (second, handle, mut rx_second) = admit(&registry, Some("dup"), None).await;
    assert_ne!(first.session, second.session);

    // The replaced connection gets its queue closed after what it already had.
    let _ = recv(&mut rx_first).await;
    let _ = recv(&mut rx_first).await;
    assert!(timeout(Duration::from_millis(500), rx_first.recv()).await.expect("close wait").is_none());

    // Its late release must not evict the replacement.
    registry.release(&first).await.expect("release");
    assert_eq!(registry.lookup("dup").await, Some(second.clone()));
    let _ = handle.snapshot().await.expect("snapshot");
    assert_eq!(handle.members(), 1);

    assert_eq!(recv(&mut rx_second).await, Frame::Init(vec![]));
    registry.release(&second).await.expect("release");
    assert_eq!(registry.lookup("dup").await, None);
}

#[tokio::test]
async fn duplicate_id_in_other_room_leaves_old_room() {
    let registry = registry();
    let (_watcher, red, mut rx_watch) = admit(&registry, Some("watcher"), Some("red")).await;
    let (_first, _, _rx_first) = admit(&registry, Some("dup"), Some("red")).await;
    let (_second, _, _rx_second) = admit(&registry, Some("dup"), Some("blue")).await;

    let frames = [recv(&mut rx_watch).await, recv(&mut rx_watch).await, recv(&mut rx_watch).await, recv(&mut rx_watch).await];
    assert_eq!(frames[2], Frame::UserJoined(Presence { count: 2, client_id: Some("dup".into()) }));
    assert_eq!(frames[3], Frame::UserLeft(Presence { count: 1, client_id: Some("dup".into()) }));
    let _ = red.snapshot().await.expect("snapshot");
    assert_eq!(red.members(), 1);
}

#[tokio::test]
async fn refused_admission_is_not_registered() {
    let registry = registry();
    let (tx, _rx) = mpsc::channel(1);

    let err = registry.admit(Some("tiny"), None, tx).await.expect_err("single-slot queue is refused");
    assert!(matches!(err, RoomError::Refused { .. }));
    assert_eq!(registry.lookup("tiny").await, None);
    assert_eq!(registry.connection_count().await, 0);
}

#[tokio::test]
async fn refused_replacement_keeps_previous_connection() {
    let registry = registry();
    let (first, handle, mut rx_first) = admit(&registry, Some("dup"), None).await;
    let (tx, _rx) = mpsc::channel(1);

    registry.admit(Some("dup"), None, tx).await.expect_err("single-slot queue is refused");
    assert_eq!(registry.lookup("dup").await, Some(first.clone()));

    // The original stays a member and its release still leaves the room.
    assert_eq!(recv(&mut rx_first).await, Frame::Init(vec![]));
    assert_eq!(recv(&mut rx_first).await, Frame::UserJoined(Presence { count: 1, client_id: Some("dup".into()) }));
    registry.release(&first).await.expect("release");
    let _ = handle.snapshot().await.expect("snapshot");
    assert_eq!(handle.members(), 0);
}

#[tokio::test]
async fn other_ids_do_not_wait_on_an_admission_in_flight() {
    let registry = registry();
    let (held, _, _rx_held) = admit(&registry, Some("held"), None).await;
    let turn = registry.admission_turn("busy").await;
    let _guard = turn.lock().await;

    let (tx, _rx) = mpsc::channel(8);
    timeout(Duration::from_millis(500), registry.admit(Some("other"), Some("elsewhere"), tx))
        .await
        .expect("admission under another id should not wait")
        .expect("admit");
    timeout(Duration::from_millis(500), registry.release(&held))
        .await
        .expect("release should not wait")
        .expect("release");
    assert_eq!(registry.lookup("held").await, None);
}

#[tokio::test]
async fn concurrent_admissions_of_one_id_agree_with_room() {
    let registry = std::sync::Arc::new(registry());
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let (tx, rx) = mpsc::channel(32);
            let (conn, handle) = registry.admit(Some("dup"), None, tx).await.expect("admit");
            (conn, handle, rx)
        }));
    }
    let mut admitted = Vec::new();
    for task in tasks {
        admitted.push(task.await.expect("admission task"));
    }

    let current = registry.lookup("dup").await.expect("one connection holds the id");
    let handle = admitted[0].1.clone();
    let _ = handle.snapshot().await.expect("snapshot");
    assert_eq!(handle.members(), 1);

    // The registered session is the room's member, so releasing it empties the room.
    registry.release(&current).await.expect("release");
    let _ = handle.snapshot().await.expect("snapshot");
    assert_eq!(handle.members(), 0);
    assert!(registry.admitting.lock().await.is_empty());
}
