use std::sync::Arc;
use std::time::Duration;

use huddle_core::{HuddleError, RoomId};

use crate::integration::init_tracing;
use crate::utils::{MockTransportFactory, StallingChannel, pid, spawn_peer_with, test_config};

#[tokio::test(start_paused = true)]
async fn test_join_timeout() {
    init_tracing();

    let channel = StallingChannel::default();
    let mut config = test_config();
    config.join_timeout = Duration::from_secs(10);
    let bob = spawn_peer_with(Arc::new(channel), config, MockTransportFactory::new());

    let started = tokio::time::Instant::now();
    let err = bob
        .session
        .join_room_as(&RoomId::from("somewhere"), pid("bob"), "Bob")
        .await
        .expect_err("join must not hang");

    assert!(matches!(err, HuddleError::ChannelUnavailable(_)));
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(!bob.session.view().in_room());
    assert_eq!(bob.devices.open_count().await, 0);
}
