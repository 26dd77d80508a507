use crate::media::LocalTrack;
use crate::transport::{
    LinkState, PeerLink, PeerTransport, RemoteTrack, TransportConfig, TransportEvent,
    TransportFactory,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use huddle_core::{IceCandidate, TrackKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds [`WebRtcTransport`]s that share one `webrtc` API instance.
pub struct WebRtcTransportFactory {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcTransportFactory {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api: Arc::new(api),
            ice_servers: config.rtc_ice_servers(),
        })
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn open(
        &self,
        link: PeerLink,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        let transport =
            WebRtcTransport::new(link, self.api.clone(), self.ice_servers.clone(), events).await?;
        Ok(Box::new(transport))
    }
}

/// A `webrtc` peer connection to one remote participant.
pub struct WebRtcTransport {
    link: PeerLink,
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
    events: mpsc::Sender<TransportEvent>,
    peer_connection: Arc<RTCPeerConnection>,
    senders: HashMap<TrackKind, Arc<RTCRtpSender>>,
    tracks: Vec<LocalTrack>,
}

impl WebRtcTransport {
    pub async fn new(
        link: PeerLink,
        api: Arc<API>,
        ice_servers: Vec<RTCIceServer>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        let peer_connection = Self::connect(&link, &api, &ice_servers, &events).await?;
        Ok(Self {
            link,
            api,
            ice_servers,
            events,
            peer_connection,
            senders: HashMap::new(),
            tracks: Vec::new(),
        })
    }

    async fn connect(
        link: &PeerLink,
        api: &API,
        ice_servers: &[RTCIceServer],
        events: &mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<RTCPeerConnection>> {
        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers.to_vec(),
            ..Default::default()
        };
        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = events.clone();
        let link_state = link.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let link = link_state.clone();

                Box::pin(async move {
                    info!("Peer Connection State changed for {:?}: {:?}", link.participant, s);
                    let state = match s {
                        RTCPeerConnectionState::Connecting => LinkState::Connecting,
                        RTCPeerConnectionState::Connected => LinkState::Connected,
                        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
                        RTCPeerConnectionState::Failed => LinkState::Failed,
                        RTCPeerConnectionState::Closed => LinkState::Closed,
                        _ => return,
                    };
                    let _ = tx.send(TransportEvent::StateChanged(link, state)).await;
                })
            },
        ));

        let ice_tx = events.clone();
        let link_ice = link.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let link = link_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated(link, candidate))
                    .await;
            })
        }));

        let track_tx = events.clone();
        let link_track = link.clone();
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let tx = track_tx.clone();
            let link = link_track.clone();

            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                debug!("Remote {} track {} from {:?}", kind, track.id(), link.participant);

                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                    rtp: Some(track),
                };
                let _ = tx.send(TransportEvent::RemoteTrack(link, remote)).await;
            })
        }));

        Ok(peer_connection)
    }

    async fn attach(&mut self, track: &LocalTrack) -> Result<()> {
        let rtp_track: Arc<dyn TrackLocal + Send + Sync> = track.rtp();
        let sender = self
            .peer_connection
            .add_track(rtp_track)
            .await
            .with_context(|| format!("Failed to add {} track", track.kind()))?;

        // RTCP has to be drained for interceptors like NACK to work.
        let rtcp_sender = sender.clone();
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        self.senders.insert(track.kind(), sender);
        Ok(())
    }

    /// Replace the peer connection with a fresh one carrying the same tracks.
    async fn rebuild(&mut self) -> Result<()> {
        let fresh = Self::connect(&self.link, &self.api, &self.ice_servers, &self.events).await?;
        let old = std::mem::replace(&mut self.peer_connection, fresh);

        old.on_peer_connection_state_change(Box::new(|_| Box::pin(async {})));
        old.on_ice_candidate(Box::new(|_| Box::pin(async {})));
        old.on_track(Box::new(|_, _, _| Box::pin(async {})));
        if let Err(e) = old.close().await {
            debug!("Closing replaced connection for {:?}: {:?}", self.link.participant, e);
        }

        self.senders.clear();
        for track in self.tracks.clone() {
            self.attach(&track).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_track(&mut self, track: &LocalTrack) -> Result<()> {
        self.attach(track).await?;
        self.tracks.push(track.clone());
        Ok(())
    }

    async fn replace_track(&mut self, track: &LocalTrack) -> Result<bool> {
        self.tracks.retain(|t| t.kind() != track.kind());
        self.tracks.push(track.clone());

        match self.senders.get(&track.kind()) {
            Some(sender) => {
                let rtp_track: Arc<dyn TrackLocal + Send + Sync> = track.rtp();
                sender.replace_track(Some(rtp_track)).await?;
                Ok(true)
            }
            None => {
                self.attach(track).await?;
                Ok(false)
            }
        }
    }

    async fn create_offer(&mut self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&mut self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    async fn set_remote_offer(&mut self, sdp: &str) -> Result<()> {
        let desc = RTCSessionDescription::offer(sdp.to_owned())?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn set_remote_answer(&mut self, sdp: &str) -> Result<()> {
        let desc = RTCSessionDescription::answer(sdp.to_owned())?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn discard_local_offer(&mut self) -> Result<bool> {
        let mut rollback = RTCSessionDescription::default();
        rollback.sdp_type = RTCSdpType::Rollback;

        match self.peer_connection.set_local_description(rollback).await {
            Ok(()) => Ok(false),
            Err(e) => {
                warn!(
                    "Rollback failed for {:?} ({}), rebuilding the connection",
                    self.link.participant, e
                );
                self.rebuild().await?;
                Ok(true)
            }
        }
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
