mod media;
mod participant;
mod room;
mod signaling;

pub use media::TrackKind;
pub use participant::{Participant, ParticipantId};
pub use room::{RoomDocument, RoomId, RoomSnapshot};
pub use signaling::{IceCandidate, IceServerConfig, SignalEnvelope, SignalPayload};

/// Milliseconds since the unix epoch, the timestamp unit of room documents.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
