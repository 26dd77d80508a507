use crate::model::{ParticipantId, RoomId, TrackKind};
use thiserror::Error;

/// Device-level failures reported by media acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("{0} device is busy")]
    DeviceBusy(TrackKind),

    #[error("no {0} device found")]
    DeviceNotFound(TrackKind),

    #[error("permission to use the {0} device was denied")]
    PermissionDenied(TrackKind),

    #[error("no local {0} track")]
    NoTrack(TrackKind),

    #[error("media device error: {0}")]
    Device(String),
}

impl MediaError {
    /// Errors after which retrying with fewer devices can still succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            MediaError::DeviceBusy(_) | MediaError::DeviceNotFound(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HuddleError {
    #[error("signaling channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("negotiation with {participant} failed: {reason}")]
    NegotiationFailed {
        participant: ParticipantId,
        reason: String,
    },

    #[error("protocol violation from {participant}: {reason}")]
    ProtocolViolation {
        participant: ParticipantId,
        reason: String,
    },

    #[error("participant {0} is already in the room")]
    DuplicateParticipant(ParticipantId),

    #[error("already in room {0}")]
    AlreadyInRoom(RoomId),

    #[error("not in a room")]
    NotInRoom,

    #[error("only the host may do that")]
    NotHost,

    #[error("session task has shut down")]
    SessionClosed,
}

impl HuddleError {
    /// Whether the coordinator should retry the operation with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, HuddleError::ChannelUnavailable(_))
    }
}

pub type Result<T, E = HuddleError> = std::result::Result<T, E>;
