use huddle_core::{IceCandidate, ParticipantId, TrackKind};
use std::fmt;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// Identifies one connection to one participant.
///
/// `connection` changes whenever the connection is recreated, so events from
/// a connection that has since been discarded can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerLink {
    pub participant: ParticipantId,
    pub connection: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Media received from a remote participant.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// The RTP source. `None` for transports that do not carry real media.
    pub rtp: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Events a transport produces for the session loop.
#[derive(Debug)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered and must be sent to the remote.
    CandidateGenerated(PeerLink, IceCandidate),

    /// The remote started sending a track.
    RemoteTrack(PeerLink, RemoteTrack),

    /// Connectivity of the underlying connection changed.
    StateChanged(PeerLink, LinkState),
}
