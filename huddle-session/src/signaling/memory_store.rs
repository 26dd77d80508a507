use crate::signaling::{ChannelEvent, SignalingChannel, Subscription};
use async_trait::async_trait;
use dashmap::DashMap;
use huddle_core::{
    HuddleError, Participant, ParticipantId, Result, RoomDocument, RoomId, RoomSnapshot,
    SignalEnvelope,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

struct Watcher {
    participant: ParticipantId,
    sink: mpsc::Sender<ChannelEvent>,
}

/// A signal as persisted: the sender for purging, the envelope as JSON text.
struct StoredSignal {
    from: ParticipantId,
    json: String,
}

struct RoomEntry {
    document: RoomDocument,
    /// Signals not yet purged, per recipient, in the order they were written.
    mailboxes: HashMap<ParticipantId, Vec<StoredSignal>>,
    watchers: HashMap<u64, Watcher>,
}

impl RoomEntry {
    fn roster_deliveries(&self, room_id: &RoomId) -> Vec<Delivery> {
        let snapshot = self.document.snapshot(room_id);
        self.watchers
            .values()
            .map(|w| (w.sink.clone(), ChannelEvent::Roster(snapshot.clone())))
            .collect()
    }
}

type Delivery = (mpsc::Sender<ChannelEvent>, ChannelEvent);

struct StoreInner {
    rooms: DashMap<RoomId, RoomEntry>,
    next_watcher: AtomicU64,
    available: AtomicBool,
    duplicate_delivery: AtomicBool,
}

/// In-process document store implementing [`SignalingChannel`].
///
/// Cloning shares the same rooms, so every session in a process can talk
/// through one instance.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                rooms: DashMap::new(),
                next_watcher: AtomicU64::new(1),
                available: AtomicBool::new(true),
                duplicate_delivery: AtomicBool::new(false),
            }),
        }
    }

    /// While unavailable every operation fails with `ChannelUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Deliver every notification twice.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.inner.duplicate_delivery.store(enabled, Ordering::SeqCst);
    }

    pub fn document(&self, room_id: &RoomId) -> Option<RoomDocument> {
        self.inner.rooms.get(room_id).map(|e| e.document.clone())
    }

    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.inner.rooms.contains_key(room_id)
    }

    pub fn watcher_count(&self, room_id: &RoomId) -> usize {
        self.inner
            .rooms
            .get(room_id)
            .map(|e| e.watchers.len())
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HuddleError::ChannelUnavailable(
                "document store is unreachable".to_owned(),
            ))
        }
    }

    /// Sends outside of any map guard so a slow subscriber cannot stall
    /// writers on other rooms. Returns how many events reached a subscriber.
    async fn deliver(&self, deliveries: Vec<Delivery>) -> usize {
        let copies = if self.inner.duplicate_delivery.load(Ordering::SeqCst) {
            2
        } else {
            1
        };

        let mut delivered = 0;
        for (sink, event) in deliveries {
            for copy in 0..copies {
                if sink.send(event.clone()).await.is_err() {
                    debug!("Subscriber went away before delivery");
                    break;
                }
                if copy == 0 {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn enqueue(&self, room_id: &RoomId, to: &ParticipantId, stored: StoredSignal) {
        let Some(mut entry) = self.inner.rooms.get_mut(room_id) else {
            return;
        };
        if entry.document.contains(to) {
            entry.mailboxes.entry(to.clone()).or_default().push(stored);
        }
    }

    /// Signals waiting for `participant` to subscribe.
    pub fn queued_signals(&self, room_id: &RoomId, participant: &ParticipantId) -> usize {
        self.inner
            .rooms
            .get(room_id)
            .and_then(|e| e.mailboxes.get(participant).map(Vec::len))
            .unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingChannel for MemoryStore {
    async fn create_room(&self, host: Participant) -> Result<RoomId> {
        self.ensure_available()?;

        let room_id = RoomId::new();
        info!("Creating room {} hosted by {}", room_id, host.id);

        self.inner.rooms.insert(
            room_id.clone(),
            RoomEntry {
                document: RoomDocument::new(host),
                mailboxes: HashMap::new(),
                watchers: HashMap::new(),
            },
        );
        Ok(room_id)
    }

    async fn join_room(&self, room_id: &RoomId, mut participant: Participant) -> Result<RoomSnapshot> {
        self.ensure_available()?;

        let (snapshot, deliveries) = {
            let Some(mut entry) = self.inner.rooms.get_mut(room_id) else {
                return Err(HuddleError::RoomNotFound(room_id.clone()));
            };
            if entry.document.contains(&participant.id) {
                return Err(HuddleError::DuplicateParticipant(participant.id));
            }

            participant.is_host = false;
            info!("Participant {} joined room {}", participant.id, room_id);
            entry.document.participants.push(participant);
            entry.document.revision += 1;

            (entry.document.snapshot(room_id), entry.roster_deliveries(room_id))
        };

        self.deliver(deliveries).await;
        Ok(snapshot)
    }

    async fn leave_room(&self, room_id: &RoomId, participant_id: &ParticipantId) -> Result<()> {
        self.ensure_available()?;

        let (deliveries, now_empty) = {
            let Some(mut entry) = self.inner.rooms.get_mut(room_id) else {
                return Ok(());
            };
            if !entry.document.contains(participant_id) {
                return Ok(());
            }

            let document = &mut entry.document;
            document.participants.retain(|p| &p.id != participant_id);
            document.revision += 1;

            if &document.host == participant_id {
                if let Some(next) = document.participants.first() {
                    info!("Host {} left room {}, {} takes over", participant_id, room_id, next.id);
                    document.host = next.id.clone();
                }
            }
            let host = document.host.clone();
            for p in document.participants.iter_mut() {
                p.is_host = p.id == host;
            }

            entry.mailboxes.remove(participant_id);
            for mailbox in entry.mailboxes.values_mut() {
                mailbox.retain(|stored| &stored.from != participant_id);
            }

            info!("Participant {} left room {}", participant_id, room_id);
            let now_empty = entry.document.participants.is_empty();
            (entry.roster_deliveries(room_id), now_empty)
        };

        if !now_empty {
            self.deliver(deliveries).await;
            return Ok(());
        }

        let removed = self
            .inner
            .rooms
            .remove_if(room_id, |_, e| e.document.participants.is_empty());
        if let Some((_, entry)) = removed {
            info!("Room {} is empty, deleting it", room_id);
            let closing = entry
                .watchers
                .into_values()
                .map(|w| (w.sink, ChannelEvent::RoomClosed))
                .collect();
            self.deliver(closing).await;
        }
        Ok(())
    }

    async fn send_signal(&self, room_id: &RoomId, envelope: SignalEnvelope) -> Result<()> {
        self.ensure_available()?;

        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize signal for {}: {}", envelope.to, e);
                return Err(HuddleError::ChannelUnavailable(format!("encode signal: {}", e)));
            }
        };

        let stored = StoredSignal {
            from: envelope.from.clone(),
            json,
        };

        // Queued only while nobody watches for the recipient; a live
        // subscriber gets it directly.
        let deliveries: Vec<Delivery> = {
            let Some(mut entry) = self.inner.rooms.get_mut(room_id) else {
                return Err(HuddleError::RoomNotFound(room_id.clone()));
            };
            if !entry.document.contains(&envelope.to) {
                debug!(
                    "Dropping {} for {} who is not in room {}",
                    envelope.payload.kind(),
                    envelope.to,
                    room_id
                );
                return Ok(());
            }

            let deliveries: Vec<Delivery> = entry
                .watchers
                .values()
                .filter(|w| w.participant == envelope.to)
                .map(|w| (w.sink.clone(), ChannelEvent::Signal(envelope.clone())))
                .collect();
            if deliveries.is_empty() {
                entry
                    .mailboxes
                    .entry(envelope.to.clone())
                    .or_default()
                    .push(stored);
                return Ok(());
            }
            deliveries
        };

        if self.deliver(deliveries).await == 0 {
            self.enqueue(room_id, &envelope.to, stored);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
        sink: mpsc::Sender<ChannelEvent>,
    ) -> Result<Subscription> {
        self.ensure_available()?;

        let watcher_id = self.inner.next_watcher.fetch_add(1, Ordering::SeqCst);
        let initial: Vec<Delivery> = {
            let Some(mut entry) = self.inner.rooms.get_mut(room_id) else {
                return Err(HuddleError::RoomNotFound(room_id.clone()));
            };

            entry.watchers.insert(
                watcher_id,
                Watcher {
                    participant: participant_id.clone(),
                    sink: sink.clone(),
                },
            );

            let mut initial = vec![(
                sink.clone(),
                ChannelEvent::Roster(entry.document.snapshot(room_id)),
            )];
            if let Some(mailbox) = entry.mailboxes.remove(participant_id) {
                for stored in mailbox {
                    match serde_json::from_str::<SignalEnvelope>(&stored.json) {
                        Ok(envelope) => initial.push((sink.clone(), ChannelEvent::Signal(envelope))),
                        Err(e) => warn!("Skipping unreadable signal from {}: {}", stored.from, e),
                    }
                }
            }
            initial
        };

        debug!("Watcher {} subscribed {} to room {}", watcher_id, participant_id, room_id);
        self.deliver(initial).await;

        let inner = Arc::downgrade(&self.inner);
        let room_id = room_id.clone();
        Ok(Subscription::new(move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Some(mut entry) = inner.rooms.get_mut(&room_id) {
                entry.watchers.remove(&watcher_id);
            }
        }))
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<Option<RoomSnapshot>> {
        self.ensure_available()?;
        Ok(self
            .inner
            .rooms
            .get(room_id)
            .map(|e| e.document.snapshot(room_id)))
    }
}
