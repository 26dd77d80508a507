use crate::media::LocalTrack;
use crate::room::PeerStatus;
use crate::signaling::{ChannelEvent, Subscription};
use crate::transport::PeerLink;
use huddle_core::{HuddleError, Participant, ParticipantId, Result, RoomId, RoomSnapshot};
use tokio::sync::{mpsc, oneshot};

/// Store membership that still has to be removed after leaving locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Departure {
    pub room_id: RoomId,
    pub participant: ParticipantId,
}

/// Requests from the session handle to the room actor.
pub(crate) enum RoomCommand {
    /// Start tracking a room the store has already admitted us to.
    Enter {
        room_id: RoomId,
        me: Participant,
        /// Roster as of entering.
        snapshot: RoomSnapshot,
        events: mpsc::Receiver<ChannelEvent>,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Hand over the store subscription feeding the entered room.
    Subscribed {
        room_id: RoomId,
        subscription: Subscription,
    },

    /// Tear down local state. Replies with what the store still holds.
    Leave {
        release_media: bool,
        reply: oneshot::Sender<Option<Departure>>,
    },

    /// A local track changed device; push it to every connection.
    ReplaceTrack {
        track: LocalTrack,
        reply: oneshot::Sender<()>,
    },

    Select {
        participant: ParticipantId,
        active: bool,
        reply: oneshot::Sender<bool>,
    },

    PeerStates {
        reply: oneshot::Sender<Vec<PeerStatus>>,
    },
}

/// Completions of work the actor spawned.
#[derive(Debug)]
pub(crate) enum InternalEvent {
    /// Envelopes to this link could not be stored even after retries.
    SignalUndeliverable {
        link: PeerLink,
        error: HuddleError,
    },

    /// Result of a direct roster read.
    RosterFetched(Result<Option<RoomSnapshot>>),
}
