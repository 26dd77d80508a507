use crate::media::{DeviceInfo, LocalTrack, MediaDevices};
use async_trait::async_trait;
use huddle_core::{MediaError, TrackKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const LOCAL_STREAM_ID: &str = "huddle-local";

struct SyntheticInner {
    devices: Vec<DeviceInfo>,
    busy: HashSet<String>,
    denied: HashSet<TrackKind>,
    open: HashMap<String, usize>,
}

/// Capture devices backed by sample tracks with no hardware behind them.
///
/// Used by headless endpoints and tests. Devices can be marked busy or
/// denied to exercise the failure paths of acquisition.
pub struct SyntheticDevices {
    inner: Mutex<SyntheticInner>,
}

impl SyntheticDevices {
    /// Two cameras (`camera-0`, `camera-1`) and two microphones
    /// (`microphone-0`, `microphone-1`).
    pub fn new() -> Self {
        let mut devices = Vec::new();
        for i in 0..2 {
            devices.push(DeviceInfo {
                id: format!("camera-{}", i),
                kind: TrackKind::Video,
                label: format!("Synthetic Camera {}", i),
            });
            devices.push(DeviceInfo {
                id: format!("microphone-{}", i),
                kind: TrackKind::Audio,
                label: format!("Synthetic Microphone {}", i),
            });
        }

        Self {
            inner: Mutex::new(SyntheticInner {
                devices,
                busy: HashSet::new(),
                denied: HashSet::new(),
                open: HashMap::new(),
            }),
        }
    }

    pub async fn set_busy(&self, device_id: &str, busy: bool) {
        let mut inner = self.inner.lock().await;
        if busy {
            inner.busy.insert(device_id.to_owned());
        } else {
            inner.busy.remove(device_id);
        }
    }

    /// Mark every device of `kind` busy.
    pub async fn set_kind_busy(&self, kind: TrackKind, busy: bool) {
        let ids: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .devices
                .iter()
                .filter(|d| d.kind == kind)
                .map(|d| d.id.clone())
                .collect()
        };
        for id in ids {
            self.set_busy(&id, busy).await;
        }
    }

    pub async fn set_denied(&self, kind: TrackKind, denied: bool) {
        let mut inner = self.inner.lock().await;
        if denied {
            inner.denied.insert(kind);
        } else {
            inner.denied.remove(&kind);
        }
    }

    /// Number of tracks currently open across all devices.
    pub async fn open_count(&self) -> usize {
        self.inner.lock().await.open.values().sum()
    }

    pub async fn is_open(&self, device_id: &str) -> bool {
        self.inner
            .lock()
            .await
            .open
            .get(device_id)
            .is_some_and(|n| *n > 0)
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn enumerate(&self) -> Vec<DeviceInfo> {
        self.inner.lock().await.devices.clone()
    }

    async fn open(&self, kind: TrackKind, device_id: Option<&str>) -> Result<LocalTrack, MediaError> {
        let mut inner = self.inner.lock().await;

        let device = match device_id {
            Some(id) => inner.devices.iter().find(|d| d.id == id && d.kind == kind),
            None => inner.devices.iter().find(|d| d.kind == kind),
        };
        let Some(device) = device.cloned() else {
            return Err(MediaError::DeviceNotFound(kind));
        };

        if inner.denied.contains(&kind) {
            return Err(MediaError::PermissionDenied(kind));
        }
        if inner.busy.contains(&device.id) {
            return Err(MediaError::DeviceBusy(kind));
        }

        *inner.open.entry(device.id.clone()).or_default() += 1;
        debug!("Opened synthetic {} device {}", kind, device.id);

        let rtp = Arc::new(TrackLocalStaticSample::new(
            codec_for(kind),
            format!("{}-{}", kind, Uuid::new_v4().simple()),
            LOCAL_STREAM_ID.to_owned(),
        ));
        Ok(LocalTrack::new(kind, device.id, rtp))
    }

    async fn close(&self, track: &LocalTrack) {
        let mut inner = self.inner.lock().await;
        if let Some(count) = inner.open.get_mut(track.device_id()) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.open.remove(track.device_id());
            }
            debug!("Closed synthetic device {}", track.device_id());
        }
    }
}
