use crate::model::participant::{Participant, ParticipantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The room record as kept by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDocument {
    pub created_at: u64,
    pub host: ParticipantId,
    /// In join order.
    pub participants: Vec<Participant>,
    /// Bumped on every mutation.
    pub revision: u64,
}

impl RoomDocument {
    pub fn new(mut host: Participant) -> Self {
        host.is_host = true;
        Self {
            created_at: super::now_millis(),
            host: host.id.clone(),
            participants: vec![host],
            revision: 1,
        }
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.iter().any(|p| &p.id == id)
    }

    pub fn snapshot(&self, room_id: &RoomId) -> RoomSnapshot {
        RoomSnapshot {
            room_id: room_id.clone(),
            created_at: self.created_at,
            host: self.host.clone(),
            participants: self.participants.clone(),
            revision: self.revision,
        }
    }
}

/// Point-in-time roster handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub created_at: u64,
    pub host: ParticipantId,
    pub participants: Vec<Participant>,
    pub revision: u64,
}

impl RoomSnapshot {
    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.iter().any(|p| &p.id == id)
    }
}
