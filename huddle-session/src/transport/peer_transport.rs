use crate::media::LocalTrack;
use crate::transport::{PeerLink, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use huddle_core::IceCandidate;
use tokio::sync::mpsc;

/// One real-time media connection to a single remote participant.
///
/// Methods that produce a description also install it as the local
/// description. Negotiation rules live in the peer connection manager; a
/// transport only executes.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&mut self, track: &LocalTrack) -> Result<()>;

    /// Swap the outgoing track of the same kind in place.
    ///
    /// Returns `false` when the change needs a new offer/answer round.
    async fn replace_track(&mut self, track: &LocalTrack) -> Result<bool>;

    async fn create_offer(&mut self) -> Result<String>;

    async fn create_answer(&mut self) -> Result<String>;

    async fn set_remote_offer(&mut self, sdp: &str) -> Result<()>;

    async fn set_remote_answer(&mut self, sdp: &str) -> Result<()>;

    /// Drop a local offer that was never answered.
    ///
    /// Returns `true` when the transport had to start over on a fresh
    /// connection, which forgets every remote candidate applied so far.
    async fn discard_local_offer(&mut self) -> Result<bool>;

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Creates transports. Every transport reports through `events`, tagged
/// with the link it was opened for.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(
        &self,
        link: PeerLink,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
