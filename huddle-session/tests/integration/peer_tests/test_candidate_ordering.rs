use huddle_core::IceCandidate;
use huddle_session::NegotiationState;

use crate::integration::init_tracing;
use crate::integration::peer_tests::{deliver, mock_manager};
use crate::utils::MockTransportFactory;

fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{} 1 udp 2130706431 127.0.0.1 {} typ host", n, 41000 + n),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
    }
}

#[tokio::test]
async fn test_candidates_apply_exactly_once_in_any_order() {
    init_tracing();

    let alice_transports = MockTransportFactory::new();
    let bob_transports = MockTransportFactory::new();
    let (mut alice, _alice_events) = mock_manager("alice", "bob", &alice_transports).await;
    let (mut bob, _bob_events) = mock_manager("bob", "alice", &bob_transports).await;

    let mut sent = alice.start().await.expect("alice offer");
    sent.extend(alice.local_candidate(candidate(1)));
    sent.extend(alice.local_candidate(candidate(2)));
    assert_eq!(sent.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);

    // Candidates first, with redeliveries, the offer last.
    let scrambled = vec![
        sent[2].clone(),
        sent[1].clone(),
        sent[2].clone(),
        sent[0].clone(),
        sent[1].clone(),
    ];
    let replies = deliver(&mut bob, scrambled).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(bob.state(), NegotiationState::Stable);
    assert_eq!(
        bob_transports.applied_candidates("alice"),
        vec![candidate(1).candidate, candidate(2).candidate]
    );

    // The answer completes alice's side.
    deliver(&mut alice, replies).await;
    assert_eq!(alice.state(), NegotiationState::Stable);
}

#[tokio::test]
async fn test_end_of_candidates_is_not_applied() {
    init_tracing();

    let alice_transports = MockTransportFactory::new();
    let bob_transports = MockTransportFactory::new();
    let (mut alice, _alice_events) = mock_manager("alice", "bob", &alice_transports).await;
    let (mut bob, _bob_events) = mock_manager("bob", "alice", &bob_transports).await;

    let mut sent = alice.start().await.expect("alice offer");
    sent.extend(alice.local_candidate(IceCandidate::new("")));
    deliver(&mut bob, sent).await;

    assert_eq!(bob.state(), NegotiationState::Stable);
    assert!(bob_transports.applied_candidates("alice").is_empty());
}

#[tokio::test]
async fn test_rejected_candidate_does_not_block_later_ones() {
    init_tracing();

    let alice_transports = MockTransportFactory::new();
    let bob_transports = MockTransportFactory::new();
    bob_transports.reject_candidate("10.9.9.9");
    let (mut alice, _alice_events) = mock_manager("alice", "bob", &alice_transports).await;
    let (mut bob, _bob_events) = mock_manager("bob", "alice", &bob_transports).await;

    let bad = IceCandidate::new("candidate:9 1 udp 2130706431 10.9.9.9 49999 typ host");
    let mut sent = alice.start().await.expect("alice offer");
    sent.extend(alice.local_candidate(bad));
    sent.extend(alice.local_candidate(candidate(3)));

    // Offer first, so both candidates hit a connection with a remote description.
    let replies = deliver(&mut bob, sent).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(bob.state(), NegotiationState::Stable);
    assert_eq!(bob_transports.count("alice", "rejected:"), 1);
    assert_eq!(
        bob_transports.applied_candidates("alice"),
        vec![candidate(3).candidate]
    );

    // A candidate after the failure still goes through.
    let late = alice.local_candidate(candidate(4)).expect("connection is open");
    deliver(&mut bob, vec![late]).await;
    assert_eq!(bob.state(), NegotiationState::Stable);
    assert_eq!(
        bob_transports.applied_candidates("alice"),
        vec![candidate(3).candidate, candidate(4).candidate]
    );

    deliver(&mut alice, replies).await;
    assert_eq!(alice.state(), NegotiationState::Stable);
}
