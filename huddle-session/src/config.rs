use crate::media::MediaRequest;
use crate::transport::TransportConfig;
use std::time::Duration;

/// Backoff schedule for transient signaling-store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// Settings for one conferencing session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    /// Devices requested on create/join.
    pub media: MediaRequest,
    /// Upper bound for create/join including retries.
    pub join_timeout: Duration,
    /// Time a peer has to reach a connected transport before it is failed.
    pub negotiation_timeout: Duration,
    /// How long signals from a participant missing from the roster are held.
    pub unknown_sender_grace: Duration,
    pub housekeeping_interval: Duration,
    pub event_queue_capacity: usize,
    pub retry: RetryPolicy,
    /// Joiners beyond this many selected streams start deselected.
    pub max_active_streams: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            media: MediaRequest::default(),
            join_timeout: Duration::from_secs(10),
            negotiation_timeout: Duration::from_secs(30),
            unknown_sender_grace: Duration::from_secs(5),
            housekeeping_interval: Duration::from_secs(1),
            event_queue_capacity: 256,
            retry: RetryPolicy::default(),
            max_active_streams: None,
        }
    }
}
