pub mod test_candidate_ordering;
pub mod test_glare;

use std::time::Duration;

use huddle_core::SignalEnvelope;
use huddle_session::{PeerConnectionManager, PeerLink, TransportEvent, TransportFactory};
use tokio::sync::mpsc;

use crate::utils::{MockTransportFactory, pid};

/// A manager for `local` -> `remote` over a mock transport.
pub async fn mock_manager(
    local: &str,
    remote: &str,
    factory: &MockTransportFactory,
) -> (PeerConnectionManager, mpsc::Receiver<TransportEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let link = PeerLink {
        participant: pid(remote),
        connection: 1,
    };
    let transport = factory
        .open(link.clone(), tx)
        .await
        .expect("Failed to open transport");
    let manager = PeerConnectionManager::new(pid(local), link, transport, &[], Duration::from_secs(30))
        .await
        .expect("Failed to create manager");
    (manager, rx)
}

/// Feed envelopes in the given order and collect the replies.
pub async fn deliver(to: &mut PeerConnectionManager, envelopes: Vec<SignalEnvelope>) -> Vec<SignalEnvelope> {
    let mut replies = Vec::new();
    for envelope in envelopes {
        replies.extend(to.accept(envelope).await.expect("negotiation failed"));
    }
    replies
}
