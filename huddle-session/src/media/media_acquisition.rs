use crate::media::{DeviceInfo, LocalMediaState, LocalTrack, MediaDevices, MediaRequest};
use huddle_core::{MediaError, TrackKind};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Steps of the acquisition fallback.
#[derive(Debug)]
enum AcquireStep {
    RequestBoth,
    RequestAudioOnly { degraded: bool },
    RequestVideoOnly,
    Done(LocalMediaState),
    Failed(MediaError),
}

impl AcquireStep {
    fn initial(request: &MediaRequest) -> Self {
        match (request.video, request.audio) {
            (true, true) => AcquireStep::RequestBoth,
            (true, false) => AcquireStep::RequestVideoOnly,
            (false, true) => AcquireStep::RequestAudioOnly { degraded: false },
            (false, false) => AcquireStep::Done(LocalMediaState::default()),
        }
    }
}

/// Sole owner of the local capture tracks.
///
/// Connections only ever receive clones of the tracks; stopping, replacing
/// and enabling all go through here.
pub struct MediaAcquisition {
    devices: Arc<dyn MediaDevices>,
    state: Mutex<Option<LocalMediaState>>,
}

impl MediaAcquisition {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            state: Mutex::new(None),
        }
    }

    /// Devices the platform offers, for picking a switch target.
    pub async fn enumerate(&self) -> Vec<DeviceInfo> {
        self.devices.enumerate().await
    }

    /// Open the requested devices, degrading to audio-only when the camera is
    /// unavailable. Returns the existing state if media is already held.
    pub async fn acquire(&self, request: &MediaRequest) -> Result<LocalMediaState, MediaError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.as_ref() {
            return Ok(existing.clone());
        }

        let mut step = AcquireStep::initial(request);
        let acquired = loop {
            step = match step {
                AcquireStep::RequestBoth => {
                    match self.open_all(&[TrackKind::Video, TrackKind::Audio], request).await {
                        Ok(tracks) => AcquireStep::Done(Self::assemble(tracks, false)),
                        Err(e) if e.is_unavailable() => {
                            warn!("Camera unavailable ({}), retrying with audio only", e);
                            AcquireStep::RequestAudioOnly { degraded: true }
                        }
                        Err(e) => AcquireStep::Failed(e),
                    }
                }
                AcquireStep::RequestAudioOnly { degraded } => {
                    match self.open_all(&[TrackKind::Audio], request).await {
                        Ok(tracks) => AcquireStep::Done(Self::assemble(tracks, degraded)),
                        Err(e) => AcquireStep::Failed(e),
                    }
                }
                AcquireStep::RequestVideoOnly => {
                    match self.open_all(&[TrackKind::Video], request).await {
                        Ok(tracks) => AcquireStep::Done(Self::assemble(tracks, false)),
                        Err(e) => AcquireStep::Failed(e),
                    }
                }
                AcquireStep::Done(media) => break Ok(media),
                AcquireStep::Failed(e) => break Err(e),
            };
        };

        match acquired {
            Ok(media) => {
                info!(
                    "Local media ready (audio: {}, video: {}, audio_only: {})",
                    media.audio.is_some(),
                    media.video.is_some(),
                    media.audio_only
                );
                *state = Some(media.clone());
                Ok(media)
            }
            Err(e) => {
                warn!("Media acquisition failed: {}", e);
                Err(e)
            }
        }
    }

    pub async fn state(&self) -> Option<LocalMediaState> {
        self.state.lock().await.clone()
    }

    /// Tracks to attach to a new connection.
    pub async fn tracks(&self) -> Vec<LocalTrack> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|s| s.tracks())
            .unwrap_or_default()
    }

    /// Enable or disable a track in place. Connections keep sending on the
    /// same track, so nothing is renegotiated.
    pub async fn toggle_track(&self, kind: TrackKind, enabled: bool) -> Result<(), MediaError> {
        let state = self.state.lock().await;
        let track = state
            .as_ref()
            .and_then(|s| s.track(kind))
            .ok_or(MediaError::NoTrack(kind))?;

        track.set_enabled(enabled);
        info!("Local {} track {}", kind, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Replace the device behind the `kind` track and return the new track.
    ///
    /// The old device is only released once the replacement is open, so a
    /// failed switch leaves the current track untouched.
    pub async fn switch_device(&self, kind: TrackKind, device_id: &str) -> Result<LocalTrack, MediaError> {
        let mut state = self.state.lock().await;
        let media = state.as_mut().ok_or(MediaError::NoTrack(kind))?;
        let Some(current) = media.track(kind).cloned() else {
            return Err(MediaError::NoTrack(kind));
        };
        if current.device_id() == device_id {
            return Ok(current);
        }

        let replacement = self.devices.open(kind, Some(device_id)).await?;
        replacement.set_enabled(current.is_enabled());
        self.devices.close(&current).await;

        info!("Switched {} from {} to {}", kind, current.device_id(), device_id);
        *media.slot(kind) = Some(replacement.clone());
        Ok(replacement)
    }

    /// Stop every local track. Safe to call repeatedly.
    pub async fn release_all(&self) {
        let Some(media) = self.state.lock().await.take() else {
            return;
        };
        for track in media.tracks() {
            self.devices.close(&track).await;
        }
        info!("Local media released");
    }

    async fn open_all(&self, kinds: &[TrackKind], request: &MediaRequest) -> Result<Vec<LocalTrack>, MediaError> {
        let mut opened = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self.devices.open(*kind, request.preferred_device(*kind)).await {
                Ok(track) => opened.push(track),
                Err(e) => {
                    for track in &opened {
                        self.devices.close(track).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(opened)
    }

    fn assemble(tracks: Vec<LocalTrack>, audio_only: bool) -> LocalMediaState {
        let mut media = LocalMediaState {
            audio_only,
            ..Default::default()
        };
        for track in tracks {
            let kind = track.kind();
            *media.slot(kind) = Some(track);
        }
        media
    }
}
