use crate::peer::NegotiationState;
use crate::transport::RemoteTrack;
use huddle_core::{Participant, ParticipantId, RoomId, TrackKind};
use std::collections::BTreeMap;

/// Media received from one remote participant.
#[derive(Debug, Clone)]
pub struct RemoteMedia {
    pub participant: Participant,
    pub tracks: Vec<RemoteTrack>,
    /// Whether the local viewer currently consumes this participant.
    pub active: bool,
}

impl RemoteMedia {
    pub fn track(&self, kind: TrackKind) -> Option<&RemoteTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }
}

/// What the presentation layer renders. Published on every change.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    pub room_id: Option<RoomId>,
    pub me: Option<ParticipantId>,
    pub host: Option<ParticipantId>,
    pub participants: Vec<Participant>,
    pub remote_media: BTreeMap<ParticipantId, RemoteMedia>,
}

impl SessionView {
    pub fn is_host(&self) -> bool {
        self.me.is_some() && self.me == self.host
    }

    pub fn in_room(&self) -> bool {
        self.room_id.is_some()
    }

    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    /// Remote media the viewer has selected.
    pub fn active_media(&self) -> impl Iterator<Item = &RemoteMedia> {
        self.remote_media.values().filter(|m| m.active)
    }
}

/// Diagnostic snapshot of one peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub participant: ParticipantId,
    pub state: NegotiationState,
    pub connected: bool,
    pub pending_candidates: usize,
}
