use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use huddle_core::{IceCandidate, ParticipantId, TrackKind};
use huddle_session::{
    LinkState, LocalTrack, PeerLink, PeerTransport, RemoteTrack, TransportEvent, TransportFactory,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    pub remote: ParticipantId,
    pub connection: u64,
    pub call: String,
}

#[derive(Default)]
struct MockShared {
    calls: Mutex<Vec<TransportCall>>,
    fail_for: Mutex<HashSet<ParticipantId>>,
    rejected_candidates: Mutex<Vec<String>>,
    replace_in_place: AtomicBool,
    never_connect: AtomicBool,
    rebuild_on_discard: AtomicBool,
    candidates: AtomicU64,
}

/// Transport factory with scripted behaviour and a shared call log.
///
/// Descriptions are plain strings of the form
/// `mock-offer n=<n> tracks=audio,video`; applying one records which tracks
/// the remote sends. Every created description gathers one candidate. A
/// connection reports `Connected` and the remote tracks once it has both
/// descriptions, unless `set_never_connect(true)`.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    shared: Arc<MockShared>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        let factory = Self::default();
        factory.set_replace_in_place(true);
        factory
    }

    /// Opening a transport to `participant` fails.
    pub fn fail_for(&self, participant: &str) {
        self.shared
            .fail_for
            .lock()
            .unwrap()
            .insert(ParticipantId::from(participant));
    }

    pub fn set_replace_in_place(&self, enabled: bool) {
        self.shared.replace_in_place.store(enabled, Ordering::SeqCst);
    }

    pub fn set_never_connect(&self, enabled: bool) {
        self.shared.never_connect.store(enabled, Ordering::SeqCst);
    }

    /// Candidates containing `pattern` are refused even once a remote
    /// description is set.
    pub fn reject_candidate(&self, pattern: &str) {
        self.shared
            .rejected_candidates
            .lock()
            .unwrap()
            .push(pattern.to_owned());
    }

    /// Discarding a local offer starts over on a fresh connection.
    pub fn set_rebuild_on_discard(&self, enabled: bool) {
        self.shared.rebuild_on_discard.store(enabled, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    /// Calls made on transports to `remote`, in order.
    pub fn calls_to(&self, remote: &str) -> Vec<String> {
        let remote = ParticipantId::from(remote);
        self.calls()
            .into_iter()
            .filter(|c| c.remote == remote)
            .map(|c| c.call)
            .collect()
    }

    pub fn count(&self, remote: &str, prefix: &str) -> usize {
        self.calls_to(remote)
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Candidates applied on transports to `remote`, in order.
    pub fn applied_candidates(&self, remote: &str) -> Vec<String> {
        self.calls_to(remote)
            .into_iter()
            .filter_map(|c| c.strip_prefix("candidate:").map(str::to_owned))
            .collect()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn open(
        &self,
        link: PeerLink,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        if self.shared.fail_for.lock().unwrap().contains(&link.participant) {
            bail!("mock transport refused {}", link.participant);
        }
        let transport = MockTransport {
            link,
            events,
            shared: self.shared.clone(),
            local_tracks: Vec::new(),
            remote_tracks: Vec::new(),
            has_local: false,
            has_remote: false,
            descriptions: 0,
        };
        transport.record("open");
        Ok(Box::new(transport))
    }
}

pub struct MockTransport {
    link: PeerLink,
    events: mpsc::Sender<TransportEvent>,
    shared: Arc<MockShared>,
    local_tracks: Vec<TrackKind>,
    remote_tracks: Vec<TrackKind>,
    has_local: bool,
    has_remote: bool,
    descriptions: u32,
}

impl MockTransport {
    fn record(&self, call: impl Into<String>) {
        self.shared.calls.lock().unwrap().push(TransportCall {
            remote: self.link.participant.clone(),
            connection: self.link.connection,
            call: call.into(),
        });
    }

    /// Events go out on their own task so the session loop never waits on
    /// its own queue.
    fn emit(&self, event: TransportEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(event).await;
        });
    }

    fn describe(&mut self, kind: &str) -> String {
        self.descriptions += 1;
        let tracks: Vec<String> = self.local_tracks.iter().map(|k| k.to_string()).collect();
        format!("mock-{} n={} tracks={}", kind, self.descriptions, tracks.join(","))
    }

    fn gather_candidate(&self) {
        let n = self.shared.candidates.fetch_add(1, Ordering::SeqCst) + 1;
        let candidate = IceCandidate {
            candidate: format!("candidate:{} 1 udp 2130706431 127.0.0.1 {} typ host", n, 40000 + n),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        };
        self.emit(TransportEvent::CandidateGenerated(self.link.clone(), candidate));
    }

    fn parse_tracks(sdp: &str) -> Result<Vec<TrackKind>> {
        if !sdp.starts_with("mock-") {
            bail!("unparseable description: {}", sdp);
        }
        let Some(list) = sdp.split("tracks=").nth(1) else {
            return Ok(Vec::new());
        };
        list.split(',')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "audio" => Ok(TrackKind::Audio),
                "video" => Ok(TrackKind::Video),
                other => Err(anyhow!("unknown track kind {}", other)),
            })
            .collect()
    }

    fn maybe_connect(&self) {
        if !(self.has_local && self.has_remote) || self.shared.never_connect.load(Ordering::SeqCst) {
            return;
        }
        self.emit(TransportEvent::StateChanged(self.link.clone(), LinkState::Connected));
        for kind in &self.remote_tracks {
            self.emit(TransportEvent::RemoteTrack(
                self.link.clone(),
                RemoteTrack {
                    id: format!("{}-{}", kind, self.link.connection),
                    stream_id: format!("mock-{}", self.link.participant),
                    kind: *kind,
                    rtp: None,
                },
            ));
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn add_track(&mut self, track: &LocalTrack) -> Result<()> {
        self.record(format!("add_track:{}", track.kind()));
        self.local_tracks.push(track.kind());
        Ok(())
    }

    async fn replace_track(&mut self, track: &LocalTrack) -> Result<bool> {
        self.record(format!("replace_track:{}", track.kind()));
        if !self.local_tracks.contains(&track.kind()) {
            self.local_tracks.push(track.kind());
            return Ok(false);
        }
        Ok(self.shared.replace_in_place.load(Ordering::SeqCst))
    }

    async fn create_offer(&mut self) -> Result<String> {
        let sdp = self.describe("offer");
        self.record("create_offer");
        self.has_local = true;
        self.gather_candidate();
        Ok(sdp)
    }

    async fn create_answer(&mut self) -> Result<String> {
        if !self.has_remote {
            bail!("cannot answer without a remote offer");
        }
        let sdp = self.describe("answer");
        self.record("create_answer");
        self.has_local = true;
        self.gather_candidate();
        self.maybe_connect();
        Ok(sdp)
    }

    async fn set_remote_offer(&mut self, sdp: &str) -> Result<()> {
        self.remote_tracks = Self::parse_tracks(sdp)?;
        self.record("set_remote_offer");
        self.has_remote = true;
        Ok(())
    }

    async fn set_remote_answer(&mut self, sdp: &str) -> Result<()> {
        if !self.has_local {
            bail!("answer without a local offer");
        }
        self.remote_tracks = Self::parse_tracks(sdp)?;
        self.record("set_remote_answer");
        self.has_remote = true;
        self.maybe_connect();
        Ok(())
    }

    async fn discard_local_offer(&mut self) -> Result<bool> {
        self.record("discard_local_offer");
        if !self.shared.rebuild_on_discard.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.record("rebuild");
        self.has_local = false;
        self.has_remote = false;
        Ok(true)
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        if !self.has_remote {
            bail!("candidate before remote description");
        }
        let rejected = self
            .shared
            .rejected_candidates
            .lock()
            .unwrap()
            .iter()
            .any(|p| candidate.candidate.contains(p.as_str()));
        if rejected {
            self.record(format!("rejected:{}", candidate.candidate));
            bail!("malformed candidate {}", candidate.candidate);
        }
        self.record(format!("candidate:{}", candidate.candidate));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.record("close");
        Ok(())
    }
}
