use crate::media::LocalTrack;
use async_trait::async_trait;
use huddle_core::{MediaError, TrackKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub kind: TrackKind,
    pub label: String,
}

/// Platform capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn enumerate(&self) -> Vec<DeviceInfo>;

    /// Open a capture device. `None` picks the default device for `kind`.
    async fn open(&self, kind: TrackKind, device_id: Option<&str>) -> Result<LocalTrack, MediaError>;

    /// Stop capturing on the device behind `track`.
    async fn close(&self, track: &LocalTrack);
}
