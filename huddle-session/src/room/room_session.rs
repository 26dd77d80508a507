use crate::config::SessionConfig;
use crate::media::{DeviceInfo, LocalMediaState, MediaAcquisition, MediaDevices};
use crate::room::{Departure, PeerStatus, Room, RoomCommand, SessionView, with_retry};
use crate::signaling::SignalingChannel;
use crate::transport::TransportFactory;
use huddle_core::{HuddleError, Participant, ParticipantId, Result, RoomId, RoomSnapshot, TrackKind};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{info, warn};

struct SessionInner {
    config: SessionConfig,
    channel: Arc<dyn SignalingChannel>,
    media: Arc<MediaAcquisition>,
    command_tx: mpsc::Sender<RoomCommand>,
    view_rx: watch::Receiver<SessionView>,
    /// Serializes create/join/leave and remembers a removal the store
    /// has not confirmed yet.
    lifecycle: Mutex<Option<Departure>>,
}

/// Handle to one local conferencing session.
///
/// Cloning is cheap; all clones drive the same session. The background task
/// stops once the last clone is dropped.
#[derive(Clone)]
pub struct RoomSession {
    inner: Arc<SessionInner>,
}

impl RoomSession {
    /// Start the session task. Must be called inside a tokio runtime.
    pub fn spawn(
        config: SessionConfig,
        channel: Arc<dyn SignalingChannel>,
        transports: Arc<dyn TransportFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        let media = Arc::new(MediaAcquisition::new(devices));
        let (command_tx, command_rx) = mpsc::channel(100);
        let (view_tx, view_rx) = watch::channel(SessionView::default());

        let room = Room::new(
            config.clone(),
            channel.clone(),
            transports,
            media.clone(),
            command_rx,
            view_tx,
        );
        tokio::spawn(room.run());

        Self {
            inner: Arc::new(SessionInner {
                config,
                channel,
                media,
                command_tx,
                view_rx,
                lifecycle: Mutex::new(None),
            }),
        }
    }

    /// Open the configured devices without entering a room.
    pub async fn acquire_media(&self) -> Result<LocalMediaState> {
        Ok(self.inner.media.acquire(&self.inner.config.media).await?)
    }

    /// Create a room hosted by `display_name` and enter it.
    pub async fn create_room(&self, display_name: &str) -> Result<RoomId> {
        self.create_room_as(ParticipantId::for_session(display_name), display_name)
            .await
    }

    pub async fn create_room_as(&self, id: ParticipantId, display_name: &str) -> Result<RoomId> {
        let mut pending = self.inner.lifecycle.lock().await;
        self.settle_departure(&mut pending).await?;
        if let Some(room_id) = self.view().room_id {
            return Err(HuddleError::AlreadyInRoom(room_id));
        }

        let acquired_here = self.ensure_media().await?;
        let me = self.local_participant(id, display_name).await;

        let created = async {
            let room_id = self
                .bounded("create room", || {
                    let channel = self.inner.channel.clone();
                    let me = me.clone();
                    async move { channel.create_room(me).await }
                })
                .await?;

            let entered = async {
                let snapshot = self
                    .bounded("read new room", || {
                        let channel = self.inner.channel.clone();
                        let room_id = room_id.clone();
                        async move { channel.fetch_room(&room_id).await }
                    })
                    .await?
                    .ok_or_else(|| HuddleError::RoomNotFound(room_id.clone()))?;
                self.enter(room_id.clone(), me.clone(), snapshot).await
            }
            .await;

            if let Err(e) = entered {
                self.abandon(&room_id, &me.id).await;
                return Err(e);
            }
            Ok::<_, HuddleError>(room_id)
        }
        .await;

        match created {
            Ok(room_id) => {
                info!("Created room {} as {}", room_id, me.id);
                Ok(room_id)
            }
            Err(e) => {
                if acquired_here {
                    self.inner.media.release_all().await;
                }
                Err(e)
            }
        }
    }

    /// Join an existing room as `display_name`.
    pub async fn join_room(&self, room_id: &RoomId, display_name: &str) -> Result<()> {
        self.join_room_as(room_id, ParticipantId::for_session(display_name), display_name)
            .await
    }

    pub async fn join_room_as(&self, room_id: &RoomId, id: ParticipantId, display_name: &str) -> Result<()> {
        let mut pending = self.inner.lifecycle.lock().await;
        self.settle_departure(&mut pending).await?;
        if let Some(current) = self.view().room_id {
            return Err(HuddleError::AlreadyInRoom(current));
        }

        let acquired_here = self.ensure_media().await?;
        let me = self.local_participant(id, display_name).await;

        let joined = async {
            let snapshot = self
                .bounded("join room", || {
                    let channel = self.inner.channel.clone();
                    let room_id = room_id.clone();
                    let me = me.clone();
                    async move { channel.join_room(&room_id, me).await }
                })
                .await?;

            if let Err(e) = self.enter(room_id.clone(), me.clone(), snapshot).await {
                self.abandon(room_id, &me.id).await;
                return Err(e);
            }
            Ok::<_, HuddleError>(())
        }
        .await;

        match joined {
            Ok(()) => {
                info!("Joined room {} as {}", room_id, me.id);
                Ok(())
            }
            Err(e) => {
                warn!("Joining room {} failed: {}", room_id, e);
                if acquired_here {
                    self.inner.media.release_all().await;
                }
                Err(e)
            }
        }
    }

    /// Leave the current room.
    ///
    /// Connections are closed, local media is stopped and the subscription is
    /// cancelled before the store is updated. Calling it again, or without a
    /// room, is a no-op unless an earlier store removal is still outstanding.
    pub async fn leave_room(&self) -> Result<()> {
        let mut pending = self.inner.lifecycle.lock().await;

        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::Leave {
            release_media: true,
            reply,
        })
        .await?;
        if let Some(departure) = rx.await.map_err(|_| HuddleError::SessionClosed)? {
            *pending = Some(departure);
        }

        self.settle_departure(&mut pending).await
    }

    /// Enable or disable a local track without renegotiating.
    pub async fn toggle_track(&self, kind: TrackKind, enabled: bool) -> Result<()> {
        Ok(self.inner.media.toggle_track(kind, enabled).await?)
    }

    /// Move the `kind` track to another device and push it to every peer.
    pub async fn switch_device(&self, kind: TrackKind, device_id: &str) -> Result<()> {
        let track = self.inner.media.switch_device(kind, device_id).await?;

        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::ReplaceTrack { track, reply }).await?;
        rx.await.map_err(|_| HuddleError::SessionClosed)
    }

    /// Start or stop consuming a participant's media. Returns `false` when
    /// the participant is not in the room.
    pub async fn select_participant(&self, participant: &ParticipantId, active: bool) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::Select {
            participant: participant.clone(),
            active,
            reply,
        })
        .await?;
        rx.await.map_err(|_| HuddleError::SessionClosed)
    }

    /// Remove another participant from the room. Host only.
    pub async fn evict(&self, participant: &ParticipantId) -> Result<()> {
        let view = self.view();
        let (Some(room_id), Some(me)) = (view.room_id.clone(), view.me.clone()) else {
            return Err(HuddleError::NotInRoom);
        };
        if !view.is_host() {
            return Err(HuddleError::NotHost);
        }
        if participant == &me {
            return self.leave_room().await;
        }

        info!("Evicting {} from room {}", participant, room_id);
        self.bounded("evict participant", || {
            let channel = self.inner.channel.clone();
            let room_id = room_id.clone();
            let participant = participant.clone();
            async move { channel.leave_room(&room_id, &participant).await }
        })
        .await
    }

    pub fn view(&self) -> SessionView {
        self.inner.view_rx.borrow().clone()
    }

    /// Receiver that is notified on every view change.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.inner.view_rx.clone()
    }

    pub fn is_host(&self) -> bool {
        self.inner.view_rx.borrow().is_host()
    }

    /// Capture devices available for [`RoomSession::switch_device`].
    pub async fn list_devices(&self) -> Vec<DeviceInfo> {
        self.inner.media.enumerate().await
    }

    pub async fn local_media(&self) -> Option<LocalMediaState> {
        self.inner.media.state().await
    }

    pub async fn peer_states(&self) -> Result<Vec<PeerStatus>> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::PeerStates { reply }).await?;
        rx.await.map_err(|_| HuddleError::SessionClosed)
    }

    async fn command(&self, cmd: RoomCommand) -> Result<()> {
        self.inner
            .command_tx
            .send(cmd)
            .await
            .map_err(|_| HuddleError::SessionClosed)
    }

    /// Acquire media unless it is already held. Returns whether this call
    /// opened the devices.
    async fn ensure_media(&self) -> Result<bool> {
        if self.inner.media.state().await.is_some() {
            return Ok(false);
        }
        self.inner.media.acquire(&self.inner.config.media).await?;
        Ok(true)
    }

    async fn local_participant(&self, id: ParticipantId, display_name: &str) -> Participant {
        let mut me = Participant::new(id, display_name);
        me.stream_active = self
            .inner
            .media
            .state()
            .await
            .is_some_and(|m| m.has_media());
        me
    }

    /// Hand the room to the actor, then subscribe on its behalf.
    async fn enter(&self, room_id: RoomId, me: Participant, snapshot: RoomSnapshot) -> Result<()> {
        let (events_tx, events_rx) = mpsc::channel(self.inner.config.event_queue_capacity);
        let participant = me.id.clone();

        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::Enter {
            room_id: room_id.clone(),
            me,
            snapshot,
            events: events_rx,
            reply,
        })
        .await?;
        rx.await.map_err(|_| HuddleError::SessionClosed)??;

        let subscribed = self
            .bounded("subscribe", || {
                let channel = self.inner.channel.clone();
                let room_id = room_id.clone();
                let participant = participant.clone();
                let sink = events_tx.clone();
                async move { channel.subscribe(&room_id, &participant, sink).await }
            })
            .await;

        match subscribed {
            Ok(subscription) => {
                self.command(RoomCommand::Subscribed {
                    room_id,
                    subscription,
                })
                .await
            }
            Err(e) => {
                let (reply, rx) = oneshot::channel();
                self.command(RoomCommand::Leave {
                    release_media: false,
                    reply,
                })
                .await?;
                let _ = rx.await;
                Err(e)
            }
        }
    }

    /// Best-effort removal after a failed create/join.
    async fn abandon(&self, room_id: &RoomId, participant: &ParticipantId) {
        if let Err(e) = self.inner.channel.leave_room(room_id, participant).await {
            warn!("Failed to undo membership in room {}: {}", room_id, e);
        }
    }

    /// Finish an outstanding store removal, if there is one.
    async fn settle_departure(&self, pending: &mut Option<Departure>) -> Result<()> {
        let Some(departure) = pending.clone() else {
            return Ok(());
        };

        self.bounded("leave room", || {
            let channel = self.inner.channel.clone();
            let departure = departure.clone();
            async move {
                channel
                    .leave_room(&departure.room_id, &departure.participant)
                    .await
            }
        })
        .await?;

        info!("Left room {} as {}", departure.room_id, departure.participant);
        *pending = None;
        Ok(())
    }

    /// Run a store operation with retries, bounded by the join timeout.
    async fn bounded<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limit = self.inner.config.join_timeout;
        match tokio::time::timeout(limit, with_retry(&self.inner.config.retry, what, op)).await {
            Ok(result) => result,
            Err(_) => Err(HuddleError::ChannelUnavailable(format!(
                "{} timed out after {:?}",
                what, limit
            ))),
        }
    }
}
