use huddle_core::TrackKind;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use webrtc::media::Sample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Which devices to open when entering a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub video: bool,
    pub audio: bool,
    pub video_device: Option<String>,
    pub audio_device: Option<String>,
}

impl MediaRequest {
    pub fn audio_only() -> Self {
        Self {
            video: false,
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self {
            video: false,
            audio: false,
            video_device: None,
            audio_device: None,
        }
    }

    pub fn preferred_device(&self, kind: TrackKind) -> Option<&str> {
        match kind {
            TrackKind::Audio => self.audio_device.as_deref(),
            TrackKind::Video => self.video_device.as_deref(),
        }
    }
}

impl Default for MediaRequest {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            video_device: None,
            audio_device: None,
        }
    }
}

/// An outgoing capture track.
///
/// Clones share the enabled flag, so a connection holding a clone observes
/// toggles made through [`crate::MediaAcquisition`].
#[derive(Clone)]
pub struct LocalTrack {
    kind: TrackKind,
    device_id: String,
    rtp: Arc<TrackLocalStaticSample>,
    enabled: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, device_id: impl Into<String>, rtp: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            device_id: device_id.into(),
            rtp,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn id(&self) -> &str {
        self.rtp.id()
    }

    pub fn rtp(&self) -> Arc<TrackLocalStaticSample> {
        self.rtp.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Write a captured frame. Frames written while the track is disabled are
    /// dropped and `Ok(false)` is returned.
    pub async fn write_sample(&self, sample: &Sample) -> Result<bool, webrtc::Error> {
        if !self.is_enabled() {
            return Ok(false);
        }
        self.rtp.write_sample(sample).await?;
        Ok(true)
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("id", &self.id())
            .field("device_id", &self.device_id)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// The local participant's captured media.
#[derive(Debug, Clone, Default)]
pub struct LocalMediaState {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
    /// Video was requested but only audio could be opened.
    pub audio_only: bool,
}

impl LocalMediaState {
    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    pub(crate) fn slot(&mut self, kind: TrackKind) -> &mut Option<LocalTrack> {
        match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
        }
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.audio.iter().chain(self.video.iter()).cloned().collect()
    }

    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.track(kind).is_some_and(|t| t.is_enabled())
    }

    pub fn device_id(&self, kind: TrackKind) -> Option<&str> {
        self.track(kind).map(|t| t.device_id())
    }

    pub fn has_media(&self) -> bool {
        self.audio.is_some() || self.video.is_some()
    }
}
