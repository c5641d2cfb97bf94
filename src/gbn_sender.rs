//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight segments.
//!
//! # Protocol contract
//!
//! - Sequence numbers count **segments**, not bytes: each data segment takes
//!   the next integer.
//! - At most `window_size` segments may be in flight at once.
//! - ACKs are **cumulative**: `ack = K` confirms every segment with
//!   sequence number `≤ K`.
//! - On timeout, the caller retransmits **all** unacked segments from
//!   `base` onwards (go back to N).
//! - Sequence numbers never wrap.  The sender stops assigning new numbers
//!   before reaching `u16::MAX`; see [`GbnSender::is_exhausted`].
//!
//! This module only manages state; all socket I/O is the caller's responsibility.

use std::collections::BTreeMap;

use crate::packet::Packet;

// ---------------------------------------------------------------------------
// GbnEntry
// ---------------------------------------------------------------------------

/// A single in-flight segment occupying one slot in the retransmit window.
#[derive(Debug, Clone)]
pub struct GbnEntry {
    /// The segment as it goes on the wire.
    pub packet: Packet,
    /// Total number of times this segment has been transmitted.
    pub tx_count: u32,
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one connection.
///
/// # Sequence-number layout
///
/// ```text
///    base             next_seq
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
///
/// The window map always holds exactly the keys `base..next_seq`.
#[derive(Debug)]
pub struct GbnSender {
    /// Sequence number of the **oldest** unacked segment (left window edge).
    pub base: u16,

    /// Sequence number to use for the **next** new segment.
    pub next_seq: u16,

    /// Maximum number of segments that may be in flight simultaneously (N).
    window_size: usize,

    /// In-flight segments keyed by sequence number.
    window: BTreeMap<u16, GbnEntry>,
}

impl GbnSender {
    /// Create a new [`GbnSender`].
    ///
    /// `seq_start` is the first data sequence number (the client's initial
    /// sequence number + 1).  `window_size` is the GBN window size N (≥ 1).
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(seq_start: u16, window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: seq_start,
            next_seq: seq_start,
            window_size,
            window: BTreeMap::new(),
        }
    }

    /// Configured window size N.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// `true` when `next_seq < base + window_size`.
    pub fn can_send(&self) -> bool {
        (self.next_seq as usize) < self.base as usize + self.window_size
    }

    /// `true` when no further sequence number can be assigned without
    /// wrapping the 16-bit field.
    pub fn is_exhausted(&self) -> bool {
        self.next_seq == u16::MAX
    }

    /// Number of segments currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// `true` when at least one segment is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    /// Build a data segment carrying the next sequence number.
    ///
    /// Call [`record_sent`](Self::record_sent) once it is on the wire.
    pub fn build_data_packet(&self, payload: Vec<u8>) -> Packet {
        Packet::new(self.next_seq, 0, 0, payload)
    }

    /// Place a just-transmitted segment into the window and advance `next_seq`.
    ///
    /// Check [`can_send`](Self::can_send) and
    /// [`is_exhausted`](Self::is_exhausted) before calling.
    pub fn record_sent(&mut self, packet: Packet) {
        debug_assert!(
            self.can_send(),
            "record_sent called on a full GBN window ({} / {})",
            self.window.len(),
            self.window_size
        );
        debug_assert!(!self.is_exhausted(), "sequence space exhausted");
        debug_assert_eq!(packet.header.seq, self.next_seq);

        self.window.insert(
            self.next_seq,
            GbnEntry {
                packet,
                tx_count: 1,
            },
        );
        self.next_seq += 1;
    }

    /// Process a cumulative ACK.
    ///
    /// Removes every window entry with sequence number `≤ ack_num`, advances
    /// `base`, and returns how many segments were newly acknowledged.  ACKs
    /// at or behind `base - 1` return `0`; ACKs for unsent sequence numbers
    /// only release what is actually in flight.
    pub fn on_ack(&mut self, ack_num: u16) -> usize {
        let mut acked = 0usize;
        while self.base <= ack_num && self.base < self.next_seq {
            self.window.remove(&self.base);
            self.base += 1;
            acked += 1;
        }
        acked
    }

    /// Iterate over all in-flight segments in ascending sequence order.
    ///
    /// Used by the connection layer to retransmit on timeout.
    pub fn window_entries(&self) -> impl Iterator<Item = &GbnEntry> {
        self.window.values()
    }

    /// Sequence numbers currently in flight, oldest first.
    pub fn window_seqs(&self) -> Vec<u16> {
        self.window.keys().copied().collect()
    }

    /// Increment the transmission count of every in-flight segment and
    /// return how many there are.
    ///
    /// Call this immediately after retransmitting the entire window.
    pub fn on_retransmit(&mut self) -> usize {
        for entry in self.window.values_mut() {
            entry.tx_count += 1;
        }
        self.window.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
