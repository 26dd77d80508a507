use crate::signaling::Subscription;
use async_trait::async_trait;
use huddle_core::{Participant, ParticipantId, Result, RoomId, RoomSnapshot, SignalEnvelope};
use tokio::sync::mpsc;

/// Notifications pushed to a subscriber.
///
/// Delivery may repeat or lag; consumers compare `RoomSnapshot::revision` and
/// envelope sequence numbers instead of trusting arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Roster(RoomSnapshot),
    Signal(SignalEnvelope),
    /// The room document was deleted. No further events follow.
    RoomClosed,
}

/// The shared document store, used as a relay for room membership and
/// connection-setup messages.
///
/// Implementations never retry internally. Transient failures surface as
/// `HuddleError::ChannelUnavailable` and the session decides what to do.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Create a room with `host` as its only participant.
    async fn create_room(&self, host: Participant) -> Result<RoomId>;

    /// Append `participant` to the roster and return the resulting snapshot.
    async fn join_room(&self, room_id: &RoomId, participant: Participant) -> Result<RoomSnapshot>;

    /// Remove a participant. Deletes the room once nobody is left. Leaving a
    /// room you are not in, or one that no longer exists, is not an error.
    async fn leave_room(&self, room_id: &RoomId, participant_id: &ParticipantId) -> Result<()>;

    /// Queue a message for `envelope.to`.
    async fn send_signal(&self, room_id: &RoomId, envelope: SignalEnvelope) -> Result<()>;

    /// Observe roster changes and signals addressed to `participant_id`.
    ///
    /// The current roster and any queued signals are delivered first. Events
    /// stop once the returned handle is cancelled or dropped.
    async fn subscribe(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
        sink: mpsc::Sender<ChannelEvent>,
    ) -> Result<Subscription>;

    /// Read the roster directly, bypassing subscriptions.
    async fn fetch_room(&self, room_id: &RoomId) -> Result<Option<RoomSnapshot>>;
}
