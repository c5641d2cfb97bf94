//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only the segment whose sequence number equals [`GbnReceiver::expected_seq`]
//!   is accepted.
//! - Anything else is **silently discarded**: no ACK is produced and state
//!   is unchanged, so the sender's window stalls until its timer fires.
//! - An accepted segment is acknowledged with `ack = seq`.
//!
//! The receiver also keeps the counters needed for the throughput report.
//! This module only manages state; socket and sink I/O belong to
//! [`crate::server`].

use std::time::{Duration, Instant};

/// First data sequence number; 0 belongs to the handshake.
pub const FIRST_DATA_SEQ: u16 = 1;

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

/// Go-Back-N receive-side state for one connection.
#[derive(Debug)]
pub struct GbnReceiver {
    /// The only sequence number that will be accepted next.
    pub expected_seq: u16,

    bytes_accepted: u64,
    segments_accepted: u64,
    segments_discarded: u64,
    first_accepted_at: Option<Instant>,
}

impl Default for GbnReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self {
            expected_seq: FIRST_DATA_SEQ,
            bytes_accepted: 0,
            segments_accepted: 0,
            segments_discarded: 0,
            first_accepted_at: None,
        }
    }

    /// Process an inbound data segment.
    ///
    /// Returns `true` if the segment was accepted; the caller must then
    /// deliver `payload` and send `ACK(seq)`.  Returns `false` for any other
    /// sequence number; the caller sends nothing.
    pub fn on_segment(&mut self, seq: u16, payload: &[u8]) -> bool {
        self.on_segment_at(seq, payload, Instant::now())
    }

    fn on_segment_at(&mut self, seq: u16, payload: &[u8], now: Instant) -> bool {
        if seq != self.expected_seq {
            self.segments_discarded += 1;
            return false;
        }
        self.expected_seq = self.expected_seq.wrapping_add(1);
        self.bytes_accepted += payload.len() as u64;
        self.segments_accepted += 1;
        self.first_accepted_at.get_or_insert(now);
        true
    }

    /// Snapshot the counters, measuring elapsed time up to now.
    pub fn finish(&self) -> TransferStats {
        self.finish_at(Instant::now())
    }

    fn finish_at(&self, now: Instant) -> TransferStats {
        TransferStats {
            bytes_accepted: self.bytes_accepted,
            segments_accepted: self.segments_accepted,
            segments_discarded: self.segments_discarded,
            elapsed: self
                .first_accepted_at
                .map(|start| now.saturating_duration_since(start)),
        }
    }
}

// ---------------------------------------------------------------------------
// TransferStats
// ---------------------------------------------------------------------------

/// Receiver-side summary of one connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    /// Payload bytes accepted in order.
    pub bytes_accepted: u64,
    /// Data segments accepted.
    pub segments_accepted: u64,
    /// Data segments dropped as out of order or duplicate.
    pub segments_discarded: u64,
    /// Time from the first accepted segment to the end of the session;
    /// `None` when nothing was accepted.
    pub elapsed: Option<Duration>,
}

impl TransferStats {
    /// Throughput in megabits per second, `None` without a measurable interval.
    pub fn throughput_mbps(&self) -> Option<f64> {
        let secs = self.elapsed?.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Some(self.bytes_accepted as f64 * 8.0 / (secs * 1_000_000.0))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
