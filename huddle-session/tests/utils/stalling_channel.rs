use async_trait::async_trait;
use huddle_core::{Participant, ParticipantId, Result, RoomId, RoomSnapshot, SignalEnvelope};
use huddle_session::{ChannelEvent, MemoryStore, SignalingChannel, Subscription};
use tokio::sync::mpsc;

/// A store whose joins never complete. Everything else goes to `inner`.
#[derive(Clone, Default)]
pub struct StallingChannel {
    pub inner: MemoryStore,
}

#[async_trait]
impl SignalingChannel for StallingChannel {
    async fn create_room(&self, host: Participant) -> Result<RoomId> {
        self.inner.create_room(host).await
    }

    async fn join_room(&self, _room_id: &RoomId, _participant: Participant) -> Result<RoomSnapshot> {
        std::future::pending().await
    }

    async fn leave_room(&self, room_id: &RoomId, participant_id: &ParticipantId) -> Result<()> {
        self.inner.leave_room(room_id, participant_id).await
    }

    async fn send_signal(&self, room_id: &RoomId, envelope: SignalEnvelope) -> Result<()> {
        self.inner.send_signal(room_id, envelope).await
    }

    async fn subscribe(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
        sink: mpsc::Sender<ChannelEvent>,
    ) -> Result<Subscription> {
        self.inner.subscribe(room_id, participant_id, sink).await
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<Option<RoomSnapshot>> {
        self.inner.fetch_room(room_id).await
    }
}
