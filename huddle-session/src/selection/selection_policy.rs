use huddle_core::ParticipantId;
use std::collections::HashSet;

/// Which remote participants the local viewer actively consumes.
///
/// Purely a presentation concern: deselecting someone never touches their
/// connection.
#[derive(Debug, Default)]
pub struct SelectionPolicy {
    known: HashSet<ParticipantId>,
    selected: HashSet<ParticipantId>,
    max_active: Option<usize>,
}

impl SelectionPolicy {
    pub fn new(max_active: Option<usize>) -> Self {
        Self {
            max_active,
            ..Default::default()
        }
    }

    /// Register a joiner. Returns whether it starts selected.
    pub fn on_join(&mut self, participant: &ParticipantId) -> bool {
        if !self.known.insert(participant.clone()) {
            return self.selected.contains(participant);
        }
        let has_room = self.max_active.is_none_or(|max| self.selected.len() < max);
        if has_room {
            self.selected.insert(participant.clone());
        }
        has_room
    }

    pub fn on_leave(&mut self, participant: &ParticipantId) {
        self.known.remove(participant);
        self.selected.remove(participant);
    }

    /// Change a participant's selection. Returns `false` for unknown ids.
    ///
    /// An explicit selection is honoured even above the cap.
    pub fn select(&mut self, participant: &ParticipantId, active: bool) -> bool {
        if !self.known.contains(participant) {
            return false;
        }
        if active {
            self.selected.insert(participant.clone());
        } else {
            self.selected.remove(participant);
        }
        true
    }

    pub fn is_selected(&self, participant: &ParticipantId) -> bool {
        self.selected.contains(participant)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }
}
