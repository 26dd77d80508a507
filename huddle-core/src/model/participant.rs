use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one endpoint inside a room.
///
/// Ordering is plain lexicographic string ordering. Both ends of a connection
/// compare the same two ids, so it doubles as the offer/glare tie-break.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives a session-unique id from a display name, e.g. `alice-1f3a9c2e`.
    pub fn for_session(display_name: &str) -> Self {
        let slug: String = display_name
            .trim()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug.trim_matches('-');
        let slug = if slug.is_empty() { "guest" } else { slug };

        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", slug, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub is_host: bool,
    pub joined_at: u64,
    pub stream_active: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_host: false,
            joined_at: super::now_millis(),
            stream_active: false,
        }
    }
}
