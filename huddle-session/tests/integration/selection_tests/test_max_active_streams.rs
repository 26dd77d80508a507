use std::sync::Arc;

use huddle_session::{MemoryStore, SessionConfig};

use crate::integration::init_tracing;
use crate::utils::{MockTransportFactory, pid, spawn_peer, spawn_peer_with, test_config, wait_for_view};

#[tokio::test]
async fn test_max_active_streams() {
    init_tracing();

    let store = MemoryStore::new();
    let config = SessionConfig {
        max_active_streams: Some(1),
        ..test_config()
    };
    let alice = spawn_peer_with(Arc::new(store.clone()), config, MockTransportFactory::new());
    let bob = spawn_peer(Arc::new(store.clone()));
    let carol = spawn_peer(Arc::new(store.clone()));

    let room_id = alice
        .session
        .create_room_as(pid("alice"), "Alice")
        .await
        .expect("Failed to create room");
    bob.session
        .join_room_as(&room_id, pid("bob"), "Bob")
        .await
        .expect("Failed to join room");
    wait_for_view(&alice.session, 2000, |v| v.remote_media.len() == 1).await;
    carol
        .session
        .join_room_as(&room_id, pid("carol"), "Carol")
        .await
        .expect("Failed to join room");

    // The first remote fills the only slot.
    let view = wait_for_view(&alice.session, 2000, |v| v.remote_media.len() == 2).await;
    assert!(view.remote_media[&pid("bob")].active);
    assert!(!view.remote_media[&pid("carol")].active);

    // An explicit choice goes above the cap.
    alice
        .session
        .select_participant(&pid("carol"), true)
        .await
        .expect("session is running");
    assert_eq!(alice.session.view().active_media().count(), 2);

    // Without a cap everyone is consumed.
    let view = wait_for_view(&bob.session, 2000, |v| v.remote_media.len() == 2).await;
    assert_eq!(view.active_media().count(), 2);
}
