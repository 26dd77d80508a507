use std::time::Duration;

use bytes::Bytes;
use huddle_core::TrackKind;
use huddle_session::{MemoryStore, NegotiationState};
use webrtc::media::Sample;

use crate::integration::{alice_and_bob, init_tracing};
use crate::utils::wait_for_peer_state;

fn frame() -> Sample {
    Sample {
        data: Bytes::from_static(&[0u8; 32]),
        duration: Duration::from_millis(33),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_toggle_track_does_not_renegotiate() {
    init_tracing();

    let store = MemoryStore::new();
    let (_room_id, alice, bob) = alice_and_bob(&store).await;

    alice
        .session
        .toggle_track(TrackKind::Video, false)
        .await
        .expect("Failed to disable video");

    let media = alice.session.local_media().await.expect("media acquired");
    assert!(!media.is_enabled(TrackKind::Video));
    assert!(media.is_enabled(TrackKind::Audio));

    let video = media.track(TrackKind::Video).expect("video track");
    let written = video.write_sample(&frame()).await.expect("write frame");
    assert!(!written, "disabled track must drop frames");

    alice
        .session
        .toggle_track(TrackKind::Video, true)
        .await
        .expect("Failed to enable video");
    let written = video.write_sample(&frame()).await.expect("write frame");
    assert!(written);

    // Same track, same connection, no new offer.
    assert_eq!(alice.transports.count("bob", "create_offer"), 1);
    assert_eq!(alice.transports.count("bob", "replace_track"), 0);
    wait_for_peer_state(&bob.session, "alice", NegotiationState::Stable, 1000).await;
}

#[tokio::test]
async fn test_toggle_without_media_fails() {
    init_tracing();

    let store = MemoryStore::new();
    let (_room_id, alice, _bob) = alice_and_bob(&store).await;
    alice.session.leave_room().await.expect("Failed to leave");

    alice
        .session
        .toggle_track(TrackKind::Audio, false)
        .await
        .expect_err("no track after leaving");
}
