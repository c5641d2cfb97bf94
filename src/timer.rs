//! Timeout and retry parameters.
//!
//! DRTP uses a fixed retransmission timeout: when no segment arrives within
//! [`TimerConfig::response_timeout`] the sender resends its whole window.
//! There is no RTT estimation and no back-off on the data path.
//!
//! The handshake and teardown exchanges are bounded separately so that a
//! silent peer yields a distinguished error instead of an endless wait.

use std::time::Duration;

/// Fixed retransmission timeout for data segments.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Adjustable timeout parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// How long the sender waits for an inbound segment before resending the
    /// window.  Also bounds each SYN|ACK wait during the handshake.
    pub response_timeout: Duration,
    /// Extra SYN transmissions after the first one goes unanswered.
    pub handshake_retries: u32,
    /// How long the sender waits for ACK|FIN after each FIN.
    pub teardown_timeout: Duration,
    /// Extra FIN transmissions after the first one goes unanswered.
    pub teardown_retries: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            response_timeout: RESPONSE_TIMEOUT,
            handshake_retries: 3,
            teardown_timeout: RESPONSE_TIMEOUT,
            teardown_retries: 5,
        }
    }
}

impl TimerConfig {
    /// Total SYN transmissions before giving up.
    pub fn handshake_attempts(&self) -> u32 {
        self.handshake_retries.saturating_add(1)
    }

    /// Total FIN transmissions before giving up.
    pub fn teardown_attempts(&self) -> u32 {
        self.teardown_retries.saturating_add(1)
    }
}
