use huddle_core::{IceCandidate, SignalPayload};
use huddle_session::NegotiationState;

use crate::integration::init_tracing;
use crate::integration::peer_tests::{deliver, mock_manager};
use crate::utils::MockTransportFactory;

#[tokio::test]
async fn test_glare_converges_to_one_stable_pair() {
    init_tracing();

    let alice_transports = MockTransportFactory::new();
    let bob_transports = MockTransportFactory::new();
    let (mut alice, _alice_events) = mock_manager("alice", "bob", &alice_transports).await;
    let (mut bob, _bob_events) = mock_manager("bob", "alice", &bob_transports).await;

    // Both sides offer at once; bob also gathers a candidate for his offer.
    let alice_offer = alice.create_offer().await.expect("alice offer");
    let mut bob_out = bob.create_offer().await.expect("bob offer");
    let bob_candidate = IceCandidate::new("candidate:7 1 udp 2130706431 127.0.0.1 40007 typ host");
    bob_out.extend(bob.local_candidate(bob_candidate.clone()));
    assert_eq!(alice.state(), NegotiationState::HaveLocalOffer);
    assert_eq!(bob.state(), NegotiationState::HaveLocalOffer);

    // bob has the larger id and yields.
    let bob_answer = deliver(&mut bob, alice_offer).await;
    assert_eq!(bob.state(), NegotiationState::Stable);
    assert_eq!(bob_transports.count("alice", "discard_local_offer"), 1);
    assert!(matches!(bob_answer[0].payload, SignalPayload::Answer { .. }));

    // alice ignores bob's offer and buffers his early candidate.
    let ignored = deliver(&mut alice, bob_out).await;
    assert!(ignored.is_empty());
    assert_eq!(alice.state(), NegotiationState::HaveLocalOffer);
    assert_eq!(alice.pending_candidates(), 1);
    assert_eq!(alice_transports.count("bob", "set_remote_offer"), 0);

    let replies = deliver(&mut alice, bob_answer).await;
    assert!(replies.is_empty());
    assert_eq!(alice.state(), NegotiationState::Stable);
    assert_eq!(alice.pending_candidates(), 0);
    assert_eq!(
        alice_transports.applied_candidates("bob"),
        vec![bob_candidate.candidate]
    );
}

#[tokio::test]
async fn test_rebuilt_connection_gets_earlier_candidates_again() {
    init_tracing();

    let alice_transports = MockTransportFactory::new();
    let bob_transports = MockTransportFactory::new();
    let (mut alice, _alice_events) = mock_manager("alice", "bob", &alice_transports).await;
    let (mut bob, _bob_events) = mock_manager("bob", "alice", &bob_transports).await;

    // First round, with one candidate from alice applied on bob's side.
    let alice_candidate = IceCandidate::new("candidate:5 1 udp 2130706431 127.0.0.1 40005 typ host");
    let mut sent = alice.start().await.expect("alice offer");
    sent.extend(alice.local_candidate(alice_candidate.clone()));
    let answer = deliver(&mut bob, sent).await;
    deliver(&mut alice, answer).await;
    assert_eq!(alice.state(), NegotiationState::Stable);
    assert_eq!(
        bob_transports.applied_candidates("alice"),
        vec![alice_candidate.candidate.clone()]
    );

    // Both renegotiate at once and bob's rollback has to rebuild.
    bob_transports.set_rebuild_on_discard(true);
    let alice_offer = alice.create_offer().await.expect("alice offer");
    let bob_offer = bob.create_offer().await.expect("bob offer");

    let bob_out = deliver(&mut bob, alice_offer).await;
    assert_eq!(bob_transports.count("alice", "rebuild"), 1);
    assert_eq!(
        bob_transports.applied_candidates("alice"),
        vec![alice_candidate.candidate.clone(), alice_candidate.candidate]
    );

    // bob answers, then offers his own change again.
    assert!(matches!(bob_out[0].payload, SignalPayload::Answer { .. }));
    assert!(matches!(bob_out[1].payload, SignalPayload::Offer { .. }));
    assert_eq!(bob.state(), NegotiationState::HaveLocalOffer);

    let mut to_alice = bob_offer;
    to_alice.extend(bob_out);
    let alice_out = deliver(&mut alice, to_alice).await;
    assert_eq!(alice.state(), NegotiationState::Stable);

    deliver(&mut bob, alice_out).await;
    assert_eq!(bob.state(), NegotiationState::Stable);
}
