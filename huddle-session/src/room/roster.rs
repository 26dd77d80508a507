use huddle_core::{Participant, ParticipantId, RoomSnapshot};

/// Membership change between two roster revisions.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub joined: Vec<Participant>,
    pub left: Vec<ParticipantId>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// The locally observed membership of a room.
///
/// Snapshots are applied only when their revision is newer than the last one
/// seen, so duplicated or reordered notifications cannot resurrect anyone.
#[derive(Debug, Default)]
pub struct Roster {
    revision: u64,
    host: Option<ParticipantId>,
    members: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt `snapshot` if it is newer. Returns `None` for stale snapshots.
    pub fn apply(&mut self, snapshot: &RoomSnapshot) -> Option<RosterDiff> {
        if snapshot.revision <= self.revision {
            return None;
        }

        let joined = snapshot
            .participants
            .iter()
            .filter(|p| !self.contains(&p.id))
            .cloned()
            .collect();
        let left = self
            .members
            .iter()
            .filter(|p| !snapshot.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();

        self.revision = snapshot.revision;
        self.host = Some(snapshot.host.clone());
        self.members = snapshot.participants.clone();
        Some(RosterDiff { joined, left })
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn host(&self) -> Option<&ParticipantId> {
        self.host.as_ref()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.members
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.members.iter().any(|p| &p.id == id)
    }
}
