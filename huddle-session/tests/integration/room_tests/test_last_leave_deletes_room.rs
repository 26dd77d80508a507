use std::sync::Arc;

use huddle_core::HuddleError;
use huddle_session::MemoryStore;

use crate::integration::{alice_and_bob, init_tracing};
use crate::utils::{pid, spawn_peer};

#[tokio::test]
async fn test_last_leave_deletes_room() {
    init_tracing();

    let store = MemoryStore::new();
    let (room_id, alice, bob) = alice_and_bob(&store).await;

    alice.session.leave_room().await.expect("alice leave failed");
    bob.session.leave_room().await.expect("bob leave failed");

    assert!(!store.room_exists(&room_id));

    let carol = spawn_peer(Arc::new(store.clone()));
    let err = carol
        .session
        .join_room_as(&room_id, pid("carol"), "Carol")
        .await
        .expect_err("joining a deleted room must fail");
    assert_eq!(err, HuddleError::RoomNotFound(room_id));

    // The failed join does not keep carol's devices open.
    assert_eq!(carol.devices.open_count().await, 0);
    assert!(!carol.session.view().in_room());
}
