use crate::config::{RetryPolicy, SessionConfig};
use crate::media::{LocalTrack, MediaAcquisition};
use crate::peer::PeerConnectionManager;
use crate::room::{
    Departure, InternalEvent, PeerStatus, RemoteMedia, RoomCommand, Roster, SessionView,
    with_retry,
};
use crate::selection::SelectionPolicy;
use crate::signaling::{ChannelEvent, SignalingChannel, Subscription};
use crate::transport::{PeerLink, TransportEvent, TransportFactory};
use futures::future::join_all;
use huddle_core::{
    HuddleError, Participant, ParticipantId, Result, RoomId, RoomSnapshot, SignalEnvelope,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// A signal from a participant the roster does not know yet.
struct HeldSignal {
    received: Instant,
    envelope: SignalEnvelope,
}

/// Everything tied to the room the session is currently in.
struct ActiveRoom {
    room_id: RoomId,
    me: Participant,
    roster: Roster,

    /// One connection per remote participant.
    peers: HashMap<ParticipantId, PeerConnectionManager>,

    remote_media: BTreeMap<ParticipantId, RemoteMedia>,
    selection: SelectionPolicy,

    held: HashMap<ParticipantId, Vec<HeldSignal>>,
    fetch_in_flight: bool,

    /// Store notifications. `None` once the feed has ended.
    events: Option<mpsc::Receiver<ChannelEvent>>,
    subscription: Option<Subscription>,
}

/// Writes to the store on behalf of the actor without blocking it.
///
/// Results that matter come back through the internal queue.
#[derive(Clone)]
struct Outbox {
    channel: Arc<dyn SignalingChannel>,
    retry: RetryPolicy,
    internal_tx: mpsc::Sender<InternalEvent>,
}

impl Outbox {
    /// Send `envelopes` in order on a background task.
    fn send(&self, room_id: &RoomId, link: &PeerLink, envelopes: Vec<SignalEnvelope>) {
        if envelopes.is_empty() {
            return;
        }

        let outbox = self.clone();
        let room_id = room_id.clone();
        let link = link.clone();
        tokio::spawn(async move {
            for envelope in envelopes {
                let result = with_retry(&outbox.retry, "send signal", || {
                    let channel = outbox.channel.clone();
                    let room_id = room_id.clone();
                    let envelope = envelope.clone();
                    async move { channel.send_signal(&room_id, envelope).await }
                })
                .await;

                if let Err(error) = result {
                    let _ = outbox
                        .internal_tx
                        .send(InternalEvent::SignalUndeliverable { link, error })
                        .await;
                    return;
                }
            }
        });
    }

    fn fetch_roster(&self, room_id: &RoomId) {
        let outbox = self.clone();
        let room_id = room_id.clone();
        tokio::spawn(async move {
            let result = with_retry(&outbox.retry, "fetch roster", || {
                let channel = outbox.channel.clone();
                let room_id = room_id.clone();
                async move { channel.fetch_room(&room_id).await }
            })
            .await;
            let _ = outbox
                .internal_tx
                .send(InternalEvent::RosterFetched(result))
                .await;
        });
    }
}

/// The session actor.
///
/// Owns the roster and every peer connection; all mutations happen on its
/// task, one event at a time.
pub(crate) struct Room {
    config: SessionConfig,
    transports: Arc<dyn TransportFactory>,
    media: Arc<MediaAcquisition>,
    outbox: Outbox,

    active: Option<ActiveRoom>,
    next_connection: u64,

    /// Requests from [`crate::RoomSession`].
    command_rx: mpsc::Receiver<RoomCommand>,

    /// Events from every transport, tagged with their link.
    transport_rx: mpsc::Receiver<TransportEvent>,
    transport_tx: mpsc::Sender<TransportEvent>,

    internal_rx: mpsc::Receiver<InternalEvent>,

    view_tx: watch::Sender<SessionView>,
}

impl Room {
    pub(crate) fn new(
        config: SessionConfig,
        channel: Arc<dyn SignalingChannel>,
        transports: Arc<dyn TransportFactory>,
        media: Arc<MediaAcquisition>,
        command_rx: mpsc::Receiver<RoomCommand>,
        view_tx: watch::Sender<SessionView>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(config.event_queue_capacity);
        let (internal_tx, internal_rx) = mpsc::channel(config.event_queue_capacity);

        let outbox = Outbox {
            channel,
            retry: config.retry.clone(),
            internal_tx,
        };

        Self {
            config,
            transports,
            media,
            outbox,
            active: None,
            next_connection: 0,
            command_rx,
            transport_rx,
            transport_tx,
            internal_rx,
            view_tx,
        }
    }

    /// Main event loop. Runs until every session handle is dropped.
    pub(crate) async fn run(mut self) {
        info!("Session event loop started");

        let mut housekeeping = tokio::time::interval(self.config.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down session.");
                            break;
                        }
                    }
                }

                evt = next_channel_event(&mut self.active) => {
                    match evt {
                        Some(e) => self.handle_channel_event(e).await,
                        None => {
                            warn!("Room notification feed ended");
                            if let Some(active) = self.active.as_mut() {
                                active.events = None;
                            }
                        }
                    }
                }

                Some(evt) = self.transport_rx.recv() => self.handle_transport_event(evt).await,

                Some(evt) = self.internal_rx.recv() => self.handle_internal_event(evt).await,

                _ = housekeeping.tick() => self.housekeeping().await,
            }
        }

        // Dropped without leaving: release what we can in the background.
        if let Some(departure) = self.teardown(true).await {
            let channel = self.outbox.channel.clone();
            tokio::spawn(async move {
                if let Err(e) = channel
                    .leave_room(&departure.room_id, &departure.participant)
                    .await
                {
                    warn!("Failed to leave room {} on shutdown: {}", departure.room_id, e);
                }
            });
        }

        info!("Session event loop finished");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Enter {
                room_id,
                me,
                snapshot,
                events,
                reply,
            } => {
                let result = self.enter(room_id, me, snapshot, events).await;
                let _ = reply.send(result);
            }

            RoomCommand::Subscribed {
                room_id,
                subscription,
            } => match self.active.as_mut() {
                Some(active) if active.room_id == room_id => {
                    active.subscription = Some(subscription);
                }
                _ => {
                    debug!("Room {} is no longer active, cancelling its subscription", room_id);
                    subscription.cancel();
                }
            },

            RoomCommand::Leave {
                release_media,
                reply,
            } => {
                let departure = self.teardown(release_media).await;
                let _ = reply.send(departure);
            }

            RoomCommand::ReplaceTrack { track, reply } => {
                self.replace_track(&track).await;
                let _ = reply.send(());
            }

            RoomCommand::Select {
                participant,
                active,
                reply,
            } => {
                let known = self.select(&participant, active);
                let _ = reply.send(known);
            }

            RoomCommand::PeerStates { reply } => {
                let _ = reply.send(self.peer_states());
            }
        }
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Roster(snapshot) => self.apply_roster(snapshot).await,
            ChannelEvent::Signal(envelope) => self.handle_signal(envelope).await,
            ChannelEvent::RoomClosed => {
                info!("Room was closed by the store");
                self.teardown(true).await;
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let link = match &event {
            TransportEvent::CandidateGenerated(link, _)
            | TransportEvent::RemoteTrack(link, _)
            | TransportEvent::StateChanged(link, _) => link.clone(),
        };
        let Some(manager) = active
            .peers
            .get_mut(&link.participant)
            .filter(|m| m.link() == &link)
        else {
            debug!("Ignoring event from stale connection {:?}", link);
            return;
        };

        match event {
            TransportEvent::CandidateGenerated(_, candidate) => {
                if let Some(envelope) = manager.local_candidate(candidate) {
                    self.outbox.send(&active.room_id, &link, vec![envelope]);
                }
            }

            TransportEvent::RemoteTrack(_, track) => {
                if manager.state().is_terminal() {
                    debug!("Ignoring {} track from closed connection {:?}", track.kind, link);
                    return;
                }
                info!("Received {} track from {:?}", track.kind, link.participant);
                if let Some(media) = active.remote_media.get_mut(&link.participant) {
                    media.tracks.retain(|t| t.kind != track.kind);
                    media.tracks.push(track);
                }
                self.publish();
            }

            TransportEvent::StateChanged(_, state) => {
                if manager.on_link_state(state).await.is_some() {
                    self.peer_failed(&link.participant);
                }
            }
        }
    }

    async fn handle_internal_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::SignalUndeliverable { link, error } => {
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                let Some(manager) = active
                    .peers
                    .get_mut(&link.participant)
                    .filter(|m| m.link() == &link && !m.state().is_terminal())
                else {
                    return;
                };
                manager
                    .fail(format!("signal could not be delivered: {}", error))
                    .await;
                self.peer_failed(&link.participant);
            }

            InternalEvent::RosterFetched(result) => {
                if let Some(active) = self.active.as_mut() {
                    active.fetch_in_flight = false;
                }
                match result {
                    Ok(Some(snapshot)) => self.apply_roster(snapshot).await,
                    Ok(None) => debug!("Roster fetch found no room"),
                    Err(e) => warn!("Roster fetch failed: {}", e),
                }
            }
        }
    }

    async fn enter(
        &mut self,
        room_id: RoomId,
        me: Participant,
        snapshot: RoomSnapshot,
        events: mpsc::Receiver<ChannelEvent>,
    ) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(HuddleError::AlreadyInRoom(active.room_id.clone()));
        }

        info!("Entering room {} as {}", room_id, me.id);
        self.active = Some(ActiveRoom {
            room_id,
            me,
            roster: Roster::new(),
            peers: HashMap::new(),
            remote_media: BTreeMap::new(),
            selection: SelectionPolicy::new(self.config.max_active_streams),
            held: HashMap::new(),
            fetch_in_flight: false,
            events: Some(events),
            subscription: None,
        });

        self.apply_roster(snapshot).await;
        if self.active.is_none() {
            return Err(HuddleError::NotInRoom);
        }
        Ok(())
    }

    async fn apply_roster(&mut self, snapshot: RoomSnapshot) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if snapshot.room_id != active.room_id {
            debug!("Ignoring roster for foreign room {}", snapshot.room_id);
            return;
        }
        let Some(diff) = active.roster.apply(&snapshot) else {
            debug!(
                "Ignoring stale roster revision {} for room {}",
                snapshot.revision, snapshot.room_id
            );
            return;
        };

        let me = active.me.id.clone();
        if !snapshot.contains(&me) {
            warn!("{} is no longer in room {}, leaving", me, snapshot.room_id);
            self.teardown(true).await;
            return;
        }

        for id in &diff.left {
            self.remove_peer(id).await;
        }
        for participant in diff.joined {
            if participant.id != me {
                self.add_peer(participant).await;
            }
        }

        if let Some(active) = self.active.as_mut() {
            for participant in &snapshot.participants {
                if let Some(media) = active.remote_media.get_mut(&participant.id) {
                    media.participant = participant.clone();
                }
            }
        }
        self.publish();
    }

    async fn add_peer(&mut self, participant: Participant) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.peers.contains_key(&participant.id) {
            return;
        }
        let me = active.me.id.clone();

        self.next_connection += 1;
        let link = PeerLink {
            participant: participant.id.clone(),
            connection: self.next_connection,
        };
        let opened = self.open_peer(me, link.clone()).await;

        let Some(active) = self.active.as_mut() else {
            return;
        };
        let selected = active.selection.on_join(&participant.id);
        active.remote_media.insert(
            participant.id.clone(),
            RemoteMedia {
                participant: participant.clone(),
                tracks: Vec::new(),
                active: selected,
            },
        );

        let mut manager = match opened {
            Ok(manager) => manager,
            Err(e) => {
                error!("Failed to create connection for {:?}: {}", participant.id, e);
                return;
            }
        };
        info!("Created connection to {:?}", participant.id);

        let outgoing = manager.start().await.unwrap_or_default();
        active.peers.insert(participant.id.clone(), manager);
        self.outbox.send(&active.room_id, &link, outgoing);

        let held = active.held.remove(&participant.id).unwrap_or_default();
        if !held.is_empty() {
            debug!("Replaying {} held signal(s) from {:?}", held.len(), participant.id);
        }
        for signal in held {
            self.handle_signal(signal.envelope).await;
        }
    }

    async fn open_peer(&self, me: ParticipantId, link: PeerLink) -> Result<PeerConnectionManager> {
        let transport = self
            .transports
            .open(link.clone(), self.transport_tx.clone())
            .await
            .map_err(|e| HuddleError::NegotiationFailed {
                participant: link.participant.clone(),
                reason: format!("{:#}", e),
            })?;

        let tracks: Vec<LocalTrack> = self.media.tracks().await;
        PeerConnectionManager::new(me, link, transport, &tracks, self.config.negotiation_timeout)
            .await
    }

    async fn remove_peer(&mut self, id: &ParticipantId) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(mut manager) = active.peers.remove(id) {
            manager.close().await;
        }
        active.remote_media.remove(id);
        active.selection.on_leave(id);
        active.held.remove(id);
        info!("Participant {:?} left room {}", id, active.room_id);
    }

    async fn handle_signal(&mut self, envelope: SignalEnvelope) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if envelope.to != active.me.id {
            debug!("Ignoring {} addressed to {}", envelope.payload.kind(), envelope.to);
            return;
        }

        if let Some(manager) = active.peers.get_mut(&envelope.from) {
            let link = manager.link().clone();
            match manager.accept(envelope).await {
                Ok(outgoing) => self.outbox.send(&active.room_id, &link, outgoing),
                Err(_) => self.peer_failed(&link.participant),
            }
            return;
        }

        if active.roster.contains(&envelope.from) {
            debug!(
                "No connection for {:?}, dropping {}",
                envelope.from,
                envelope.payload.kind()
            );
            return;
        }

        debug!(
            "Holding {} from {:?} until the roster catches up",
            envelope.payload.kind(),
            envelope.from
        );
        active
            .held
            .entry(envelope.from.clone())
            .or_default()
            .push(HeldSignal {
                received: Instant::now(),
                envelope,
            });
        if !active.fetch_in_flight {
            active.fetch_in_flight = true;
            self.outbox.fetch_roster(&active.room_id);
        }
    }

    async fn replace_track(&mut self, track: &LocalTrack) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let mut failed = Vec::new();
        for manager in active.peers.values_mut() {
            let link = manager.link().clone();
            match manager.replace_track(track).await {
                Ok(outgoing) => self.outbox.send(&active.room_id, &link, outgoing),
                Err(_) => failed.push(link.participant),
            }
        }
        for id in &failed {
            self.peer_failed(id);
        }
    }

    fn select(&mut self, participant: &ParticipantId, selected: bool) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if !active.selection.select(participant, selected) {
            return false;
        }
        if let Some(media) = active.remote_media.get_mut(participant) {
            media.active = selected;
        }
        self.publish();
        true
    }

    fn peer_states(&self) -> Vec<PeerStatus> {
        let Some(active) = self.active.as_ref() else {
            return Vec::new();
        };
        let mut states: Vec<PeerStatus> = active
            .peers
            .values()
            .map(|m| PeerStatus {
                participant: m.participant().clone(),
                state: m.state(),
                connected: m.is_connected(),
                pending_candidates: m.pending_candidates(),
            })
            .collect();
        states.sort_by(|a, b| a.participant.cmp(&b.participant));
        states
    }

    async fn housekeeping(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let now = Instant::now();

        let mut failed = Vec::new();
        for manager in active.peers.values_mut() {
            if manager.check_deadline(now).await.is_some() {
                failed.push(manager.participant().clone());
            }
        }
        let grace = self.config.unknown_sender_grace;
        for (from, signals) in active.held.iter_mut() {
            let before = signals.len();
            signals.retain(|s| now.duration_since(s.received) < grace);
            let dropped = before - signals.len();
            if dropped > 0 {
                warn!("Dropped {} signal(s) from unknown participant {:?}", dropped, from);
            }
        }
        active.held.retain(|_, signals| !signals.is_empty());

        for id in &failed {
            self.peer_failed(id);
        }
    }

    /// A connection went to `Failed`: its media is gone, the participant
    /// stays in the room.
    fn peer_failed(&mut self, id: &ParticipantId) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(media) = active.remote_media.get_mut(id) {
            media.tracks.clear();
        }
        self.publish();
    }

    /// Close every connection, optionally stop local media, and cancel the
    /// subscription. Returns the store membership left behind, if any.
    async fn teardown(&mut self, release_media: bool) -> Option<Departure> {
        let departure = match self.active.take() {
            Some(mut active) => {
                info!("Leaving room {} as {}", active.room_id, active.me.id);
                join_all(active.peers.values_mut().map(|m| m.close())).await;
                if release_media {
                    self.media.release_all().await;
                }
                if let Some(subscription) = active.subscription.take() {
                    subscription.cancel();
                }
                Some(Departure {
                    room_id: active.room_id,
                    participant: active.me.id,
                })
            }
            None => {
                if release_media {
                    self.media.release_all().await;
                }
                None
            }
        };

        self.publish();
        departure
    }

    fn publish(&self) {
        let view = match &self.active {
            Some(active) => SessionView {
                room_id: Some(active.room_id.clone()),
                me: Some(active.me.id.clone()),
                host: active.roster.host().cloned(),
                participants: active.roster.participants().to_vec(),
                remote_media: active.remote_media.clone(),
            },
            None => SessionView::default(),
        };
        self.view_tx.send_replace(view);
    }
}

async fn next_channel_event(active: &mut Option<ActiveRoom>) -> Option<ChannelEvent> {
    match active.as_mut().and_then(|a| a.events.as_mut()) {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
