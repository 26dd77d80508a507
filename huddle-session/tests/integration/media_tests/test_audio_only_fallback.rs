use std::sync::Arc;

use huddle_core::{HuddleError, MediaError, TrackKind};
use huddle_session::{MemoryStore, NegotiationState};

use crate::integration::init_tracing;
use crate::utils::{pid, spawn_peer, wait_for_peer_state, wait_for_view};

#[tokio::test]
async fn test_busy_camera_joins_audio_only() {
    init_tracing();

    let store = MemoryStore::new();
    let alice = spawn_peer(Arc::new(store.clone()));
    let bob = spawn_peer(Arc::new(store.clone()));
    alice.devices.set_kind_busy(TrackKind::Video, true).await;

    let room_id = alice
        .session
        .create_room_as(pid("alice"), "Alice")
        .await
        .expect("Failed to create room");

    let media = alice.session.local_media().await.expect("media acquired");
    assert!(media.audio_only);
    assert!(media.audio.is_some());
    assert!(media.video.is_none());

    let document = store.document(&room_id).expect("room document exists");
    assert!(document.participants[0].stream_active);

    bob.session
        .join_room_as(&room_id, pid("bob"), "Bob")
        .await
        .expect("Failed to join room");
    wait_for_peer_state(&bob.session, "alice", NegotiationState::Stable, 3000).await;

    // bob only ever receives audio from alice, but alice gets both from bob.
    let view = wait_for_view(&bob.session, 2000, |v| {
        v.remote_media
            .get(&pid("alice"))
            .is_some_and(|m| !m.tracks.is_empty())
    })
    .await;
    let from_alice = &view.remote_media[&pid("alice")];
    assert_eq!(from_alice.tracks.len(), 1);
    assert!(from_alice.track(TrackKind::Audio).is_some());

    wait_for_view(&alice.session, 2000, |v| {
        v.remote_media
            .get(&pid("bob"))
            .is_some_and(|m| m.tracks.len() == 2)
    })
    .await;
}

#[tokio::test]
async fn test_denied_microphone_fails_join_and_releases_camera() {
    init_tracing();

    let store = MemoryStore::new();
    let alice = spawn_peer(Arc::new(store.clone()));
    alice.devices.set_denied(TrackKind::Audio, true).await;

    let err = alice
        .session
        .create_room_as(pid("alice"), "Alice")
        .await
        .expect_err("create must fail without a microphone");
    assert!(
        matches!(err, HuddleError::Media(MediaError::PermissionDenied(TrackKind::Audio))),
        "unexpected error: {}",
        err
    );

    assert!(!alice.session.view().in_room());
    assert!(alice.session.local_media().await.is_none());
    assert_eq!(alice.devices.open_count().await, 0);
}
