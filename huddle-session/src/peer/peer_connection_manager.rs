use crate::media::LocalTrack;
use crate::peer::{CandidateBuffer, InboundSequencer, NegotiationState};
use crate::transport::{LinkState, PeerLink, PeerTransport};
use huddle_core::{HuddleError, IceCandidate, ParticipantId, Result, SignalEnvelope, SignalPayload};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Negotiation driver for the connection to one remote participant.
///
/// Every handler returns the envelopes that must be sent to the remote, in
/// order. Messages that do not fit the current state are logged and ignored;
/// only transport failures surface as errors, after the manager has moved to
/// [`NegotiationState::Failed`].
pub struct PeerConnectionManager {
    local: ParticipantId,
    link: PeerLink,
    state: NegotiationState,
    transport: Box<dyn PeerTransport>,
    candidates: CandidateBuffer,
    inbound: InboundSequencer<SignalPayload>,
    outbound_seq: u64,
    /// Point by which the transport must report connected.
    deadline: Option<Instant>,
    connected: bool,
    /// Reached `Stable` at least once.
    negotiated: bool,
    /// A local change needs a fresh offer once the current round ends.
    needs_renegotiation: bool,
    transport_closed: bool,
}

impl PeerConnectionManager {
    /// Wrap `transport` and attach the local tracks to it.
    pub async fn new(
        local: ParticipantId,
        link: PeerLink,
        mut transport: Box<dyn PeerTransport>,
        tracks: &[LocalTrack],
        negotiation_timeout: Duration,
    ) -> Result<Self> {
        for track in tracks {
            if let Err(e) = transport.add_track(track).await {
                let _ = transport.close().await;
                return Err(HuddleError::NegotiationFailed {
                    participant: link.participant.clone(),
                    reason: format!("{:#}", e),
                });
            }
        }

        Ok(Self {
            local,
            link,
            state: NegotiationState::New,
            transport,
            candidates: CandidateBuffer::new(),
            inbound: InboundSequencer::new(),
            outbound_seq: 0,
            deadline: Some(Instant::now() + negotiation_timeout),
            connected: false,
            negotiated: false,
            needs_renegotiation: false,
            transport_closed: false,
        })
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.link.participant
    }

    pub fn link(&self) -> &PeerLink {
        &self.link
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn pending_candidates(&self) -> usize {
        self.candidates.pending_len()
    }

    /// The smaller id sends the first offer.
    pub fn is_initiator(&self) -> bool {
        self.local < self.link.participant
    }

    /// On glare the larger id drops its own offer and answers.
    pub fn yields_on_glare(&self) -> bool {
        self.local > self.link.participant
    }

    /// Kick off negotiation if this side is the initiator.
    pub async fn start(&mut self) -> Result<Vec<SignalEnvelope>> {
        if self.state == NegotiationState::New && self.is_initiator() {
            self.create_offer().await
        } else {
            Ok(Vec::new())
        }
    }

    /// Create and install a local offer. Only valid from `New` or `Stable`.
    pub async fn create_offer(&mut self) -> Result<Vec<SignalEnvelope>> {
        match self.state {
            NegotiationState::New | NegotiationState::Stable => {}
            other => {
                debug!("Deferring offer to {:?} while {}", self.link.participant, other);
                self.needs_renegotiation = true;
                return Ok(Vec::new());
            }
        }

        let sdp = match self.transport.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => return Err(self.fail(format!("create offer: {:#}", e)).await),
        };
        self.needs_renegotiation = false;
        self.state = NegotiationState::HaveLocalOffer;
        info!("Sent offer to {:?}", self.link.participant);
        Ok(vec![self.envelope(SignalPayload::Offer { sdp })])
    }

    /// Feed an envelope received from the channel.
    ///
    /// Out-of-order envelopes are held and redeliveries dropped, so payloads
    /// reach the state machine in the order the remote sent them.
    pub async fn accept(&mut self, envelope: SignalEnvelope) -> Result<Vec<SignalEnvelope>> {
        if envelope.from != self.link.participant || envelope.to != self.local {
            self.violation(format!(
                "envelope {:?} -> {:?} routed to the wrong connection",
                envelope.from, envelope.to
            ));
            return Ok(Vec::new());
        }
        if self.state.is_terminal() {
            debug!(
                "Ignoring {} from {:?}, connection is {}",
                envelope.payload.kind(),
                self.link.participant,
                self.state
            );
            return Ok(Vec::new());
        }

        let mut outgoing = Vec::new();
        for payload in self.inbound.push(envelope.seq, envelope.payload) {
            outgoing.extend(self.handle_payload(payload).await?);
        }
        Ok(outgoing)
    }

    pub async fn handle_payload(&mut self, payload: SignalPayload) -> Result<Vec<SignalEnvelope>> {
        match payload {
            SignalPayload::Offer { sdp } => self.handle_remote_offer(sdp).await,
            SignalPayload::Answer { sdp } => self.handle_remote_answer(sdp).await,
            SignalPayload::IceCandidate(candidate) => {
                self.handle_remote_candidate(candidate).await;
                Ok(Vec::new())
            }
        }
    }

    pub async fn handle_remote_offer(&mut self, sdp: String) -> Result<Vec<SignalEnvelope>> {
        match self.state {
            NegotiationState::New | NegotiationState::Stable => {}
            NegotiationState::HaveLocalOffer if self.yields_on_glare() => {
                info!("Offer glare with {:?}, yielding", self.link.participant);
                match self.transport.discard_local_offer().await {
                    Ok(true) => {
                        debug!("Connection to {:?} was rebuilt, replaying candidates", self.link.participant);
                        self.candidates.rewind();
                    }
                    Ok(false) => {}
                    Err(e) => return Err(self.fail(format!("discard local offer: {:#}", e)).await),
                }
                // Our own change still has to be offered after this round.
                if self.negotiated {
                    self.needs_renegotiation = true;
                }
            }
            NegotiationState::HaveLocalOffer => {
                info!(
                    "Offer glare with {:?}, keeping our offer",
                    self.link.participant
                );
                return Ok(Vec::new());
            }
            other => {
                self.violation(format!("offer received while {}", other));
                return Ok(Vec::new());
            }
        }

        if let Err(e) = self.transport.set_remote_offer(&sdp).await {
            return Err(self.fail(format!("apply remote offer: {:#}", e)).await);
        }
        self.state = NegotiationState::HaveRemoteOffer;
        self.flush_candidates().await;

        let answer = match self.transport.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail(format!("create answer: {:#}", e)).await),
        };
        self.state = NegotiationState::Stable;
        self.negotiated = true;
        info!("Answered offer from {:?}", self.link.participant);

        let mut outgoing = vec![self.envelope(SignalPayload::Answer { sdp: answer })];
        if self.needs_renegotiation {
            outgoing.extend(self.create_offer().await?);
        }
        Ok(outgoing)
    }

    pub async fn handle_remote_answer(&mut self, sdp: String) -> Result<Vec<SignalEnvelope>> {
        if self.state != NegotiationState::HaveLocalOffer {
            self.violation(format!("answer received while {}", self.state));
            return Ok(Vec::new());
        }

        if let Err(e) = self.transport.set_remote_answer(&sdp).await {
            return Err(self.fail(format!("apply remote answer: {:#}", e)).await);
        }
        self.state = NegotiationState::Stable;
        self.negotiated = true;
        self.flush_candidates().await;
        info!("Negotiation with {:?} is stable", self.link.participant);

        if self.needs_renegotiation {
            return self.create_offer().await;
        }
        Ok(Vec::new())
    }

    /// Apply or buffer a remote candidate. Failures are logged and dropped.
    pub async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.state.is_terminal() {
            return;
        }
        if candidate.is_end_of_candidates() {
            debug!("End of candidates from {:?}", self.link.participant);
            return;
        }
        if let Some(candidate) = self.candidates.admit(candidate) {
            self.apply_candidate(&candidate).await;
        }
    }

    /// Wrap a locally gathered candidate for the remote.
    pub fn local_candidate(&mut self, candidate: IceCandidate) -> Option<SignalEnvelope> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.envelope(SignalPayload::IceCandidate(candidate)))
    }

    /// Swap the outgoing track of `track.kind()`.
    ///
    /// Transports that cannot swap in place get a new offer, now if the
    /// connection is stable or once the current round completes.
    pub async fn replace_track(&mut self, track: &LocalTrack) -> Result<Vec<SignalEnvelope>> {
        if self.state.is_terminal() {
            return Ok(Vec::new());
        }

        match self.transport.replace_track(track).await {
            Ok(true) => {
                debug!("Replaced {} track for {:?} in place", track.kind(), self.link.participant);
                Ok(Vec::new())
            }
            Ok(false) => {
                info!("Renegotiating with {:?} for new {} track", self.link.participant, track.kind());
                if self.state == NegotiationState::Stable {
                    self.create_offer().await
                } else {
                    self.needs_renegotiation = true;
                    Ok(Vec::new())
                }
            }
            Err(e) => Err(self.fail(format!("replace {} track: {:#}", track.kind(), e)).await),
        }
    }

    /// Record a connectivity change from the transport.
    ///
    /// Returns the failure when the connection is lost for good.
    pub async fn on_link_state(&mut self, state: LinkState) -> Option<HuddleError> {
        if self.state.is_terminal() {
            return None;
        }
        match state {
            LinkState::Connected => {
                self.connected = true;
                self.deadline = None;
                info!("Connected to {:?}", self.link.participant);
                None
            }
            LinkState::Disconnected => {
                warn!("Connection to {:?} interrupted", self.link.participant);
                None
            }
            LinkState::Failed => Some(self.fail("ICE failure".to_owned()).await),
            LinkState::Connecting | LinkState::Closed => None,
        }
    }

    /// Fail the connection if it missed its negotiation deadline.
    pub async fn check_deadline(&mut self, now: Instant) -> Option<HuddleError> {
        if self.connected || self.state.is_terminal() {
            return None;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {
                Some(self.fail("negotiation timed out".to_owned()).await)
            }
            _ => None,
        }
    }

    /// Tear the connection down. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.shutdown_transport().await;
        self.candidates.clear();
        self.deadline = None;
        self.state = NegotiationState::Closed;
        info!("Closed connection to {:?}", self.link.participant);
    }

    /// Move to `Failed` and close the transport.
    pub async fn fail(&mut self, reason: String) -> HuddleError {
        let err = HuddleError::NegotiationFailed {
            participant: self.link.participant.clone(),
            reason,
        };
        error!("{}", err);
        self.state = NegotiationState::Failed;
        self.deadline = None;
        self.shutdown_transport().await;
        err
    }

    async fn shutdown_transport(&mut self) {
        if self.transport_closed {
            return;
        }
        self.transport_closed = true;
        if let Err(e) = self.transport.close().await {
            warn!("Failed to close transport for {:?}: {:?}", self.link.participant, e);
        }
    }

    async fn flush_candidates(&mut self) {
        for candidate in self.candidates.release() {
            self.apply_candidate(&candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: &IceCandidate) {
        if let Err(e) = self.transport.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate for {:?}: {:?}", self.link.participant, e);
        }
    }

    fn violation(&self, reason: String) {
        let err = HuddleError::ProtocolViolation {
            participant: self.link.participant.clone(),
            reason,
        };
        warn!("{}", err);
    }

    fn envelope(&mut self, payload: SignalPayload) -> SignalEnvelope {
        self.outbound_seq += 1;
        SignalEnvelope {
            from: self.local.clone(),
            to: self.link.participant.clone(),
            seq: self.outbound_seq,
            payload,
        }
    }
}
