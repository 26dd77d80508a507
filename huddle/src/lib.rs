//! Full-mesh video conferencing over a shared document store.
//!
//! ```no_run
//! # #[cfg(feature = "session")]
//! # async fn demo() -> huddle::Result<()> {
//! use std::sync::Arc;
//! use huddle::session::{
//!     MemoryStore, RoomSession, SessionConfig, SyntheticDevices, TransportConfig,
//!     WebRtcTransportFactory,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let transports = WebRtcTransportFactory::new(&TransportConfig::default())
//!     .map_err(|e| huddle::HuddleError::ChannelUnavailable(e.to_string()))?;
//! let session = RoomSession::spawn(
//!     SessionConfig::default(),
//!     store,
//!     Arc::new(transports),
//!     Arc::new(SyntheticDevices::new()),
//! );
//!
//! let room_id = session.create_room("Alice").await?;
//! println!("share {}", room_id);
//! session.leave_room().await?;
//! # Ok(())
//! # }
//! ```

pub use huddle_core::{HuddleError, MediaError, ParticipantId, Result, RoomId};

pub mod model {
    pub use huddle_core::model::*;
}

#[cfg(feature = "session")]
pub mod session {
    pub use huddle_session::*;
}
