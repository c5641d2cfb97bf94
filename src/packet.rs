//! Wire-format definitions for DRTP segments.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`].
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Sequence Number        |     Acknowledgment Number     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags (low 4 bits)        |          Payload ...          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! There is no length field: the payload is whatever follows the header in
//! the datagram.  There is no checksum either.

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u16 = 0x8;
    /// Acknowledgement field is valid.
    pub const ACK: u16 = 0x4;
    /// Finish: sender has no more data to send.
    pub const FIN: u16 = 0x2;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 6;

/// Largest datagram either peer puts on the wire.
pub const MAX_DATAGRAM: usize = 1000;

/// Largest payload carried by one data segment.
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - HEADER_LEN;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 2;
const OFF_FLAGS: usize = 4;

/// Fixed-size protocol header, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Data segments: position in the stream.  Control segments: role-dependent.
    pub seq: u16,
    /// Meaningful only on ACK-flagged and handshake segments.
    pub ack: u16,
    /// Bitmask of [`flags`] constants.
    pub flags: u16,
}

impl Header {
    /// `true` when **every** bit of `mask` is set.
    pub fn has(&self, mask: u16) -> bool {
        self.flags & mask == mask
    }

    /// `true` when ACK is the only flag set.
    pub fn is_pure_ack(&self) -> bool {
        self.flags & (flags::SYN | flags::ACK | flags::FIN) == flags::ACK
    }

    /// `true` for a segment carrying none of SYN, ACK or FIN.
    pub fn is_data(&self) -> bool {
        self.flags & (flags::SYN | flags::ACK | flags::FIN) == 0
    }
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(seq: u16, ack: u16, flags: u16, payload: Vec<u8>) -> Self {
        Self {
            header: Header { seq, ack, flags },
            payload,
        }
    }

    /// A segment with no payload.
    pub fn control(seq: u16, ack: u16, flags: u16) -> Self {
        Self::new(seq, ack, flags, Vec::new())
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// The payload length is not checked; callers keep it within
    /// [`MAX_PAYLOAD`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.header.seq.to_be_bytes());
        buf.extend_from_slice(&self.header.ack.to_be_bytes());
        buf.extend_from_slice(&self.header.flags.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Everything after the first [`HEADER_LEN`] bytes is payload.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let field = |off: usize| u16::from_be_bytes([buf[off], buf[off + 1]]);

        Ok(Packet {
            header: Header {
                seq: field(OFF_SEQ),
                ack: field(OFF_ACK),
                flags: field(OFF_FLAGS),
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketError {
    /// Datagram shorter than the fixed header; carries the received length.
    BufferTooShort(usize),
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketError::BufferTooShort(n) => {
                write!(
                    f,
                    "malformed segment: {n} bytes is shorter than the {HEADER_LEN}-byte header"
                )
            }
        }
    }
}

impl std::error::Error for PacketError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::new(42, 7, flags::SYN | flags::ACK, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn full_size_data_segment_roundtrip() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD).map(|i| i as u8).collect();
        let pkt = Packet::new(u16::MAX - 1, 0, 0, payload);
        let bytes = pkt.encode();
        assert_eq!(bytes.len(), MAX_DATAGRAM);
        assert_eq!(Packet::decode(&bytes).unwrap(), pkt);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort(0)));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::BufferTooShort(HEADER_LEN - 1))
        );
    }

    #[test]
    fn header_only_decodes_to_empty_payload() {
        let decoded = Packet::decode(&[0, 1, 0, 0, 0, 4]).unwrap();
        assert_eq!(decoded.header.seq, 1);
        assert_eq!(decoded.header.flags, flags::ACK);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn fields_big_endian_on_wire() {
        let bytes = Packet::control(0x0102, 0x0304, flags::FIN).encode();
        assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04, 0x00, 0x02]);
    }

    #[test]
    fn flag_values_match_wire_layout() {
        assert_eq!(flags::SYN, 0b1000);
        assert_eq!(flags::ACK, 0b0100);
        assert_eq!(flags::FIN, 0b0010);
    }

    #[test]
    fn has_requires_every_bit() {
        let synack = Packet::control(0, 1, flags::SYN | flags::ACK).header;
        assert!(synack.has(flags::SYN | flags::ACK));
        assert!(synack.has(flags::SYN));

        let syn = Packet::control(0, 0, flags::SYN).header;
        assert!(!syn.has(flags::SYN | flags::ACK));
    }

    #[test]
    fn data_segment_has_no_control_bits() {
        assert!(Packet::new(1, 0, 0, b"x".to_vec()).header.is_data());
        assert!(!Packet::control(1, 0, flags::FIN).header.is_data());
    }

    #[test]
    fn pure_ack_excludes_syn_ack_and_fin_ack() {
        assert!(Packet::control(0, 3, flags::ACK).header.is_pure_ack());
        assert!(!Packet::control(0, 1, flags::SYN | flags::ACK).header.is_pure_ack());
        assert!(!Packet::control(0, 4, flags::ACK | flags::FIN).header.is_pure_ack());
        assert!(!Packet::new(1, 0, 0, b"x".to_vec()).header.is_pure_ack());
    }

    #[test]
    fn codec_does_not_validate_flags() {
        let odd = Packet::control(3, 3, 0xffff);
        assert_eq!(Packet::decode(&odd.encode()).unwrap(), odd);
    }
}
