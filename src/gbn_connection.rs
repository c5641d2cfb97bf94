//! Go-Back-N connection: data transfer and teardown on the client side.
//!
//! # Architecture
//!
//! ```text
//!  data source (AsyncRead)
//!      │  994-byte chunks
//!      ▼
//!  GbnConnection::send_all
//!    ├── GbnSender   (window, base, next_seq)
//!    └── Socket      (one peer, fixed response timeout)
//!      │
//!      ▼
//!  GbnConnection::close  ── FIN ──▶  ◀── ACK|FIN ──
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut conn = GbnConnection::connect(socket, peer, 3, TimerConfig::default()).await?;
//! let summary = conn.send_all(&mut file).await?;
//! conn.close().await?;
//! ```
//!
//! Each round of the transfer loop fills the window from the source, then
//! waits once for an inbound segment.  A cumulative ACK slides the window;
//! silence for the whole response timeout resends every in-flight segment.
//! There is no retry ceiling: the loop keeps resending until the peer
//! acknowledges or the process is stopped.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::connection::{await_segment, handshake_ack, ConnError, Connection};
use crate::gbn_sender::GbnSender;
use crate::packet::{flags, Packet, MAX_PAYLOAD};
use crate::socket::Socket;
use crate::state::ConnectionState;
use crate::timer::TimerConfig;

/// Default Go-Back-N window size.
pub const DEFAULT_WINDOW: usize = 3;

// ---------------------------------------------------------------------------
// SendSummary
// ---------------------------------------------------------------------------

/// Sender-side counters for one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSummary {
    /// Distinct data segments sent.
    pub segments_sent: u64,
    /// Payload bytes read from the source.
    pub bytes_sent: u64,
    /// Segments resent after a timeout.
    pub retransmissions: u64,
    /// Timeouts that triggered a window resend.
    pub timeouts: u64,
}

// ---------------------------------------------------------------------------
// GbnConnection
// ---------------------------------------------------------------------------

/// A client connection using Go-Back-N sliding-window flow control.
#[derive(Debug)]
pub struct GbnConnection {
    /// Current FSM state.
    pub state: ConnectionState,

    /// Outbound GBN window.
    pub sender: GbnSender,

    socket: Socket,
    peer: SocketAddr,
    config: TimerConfig,
}

impl GbnConnection {
    /// Build a [`GbnConnection`] from an established [`Connection`].
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn from_connection(conn: Connection, window_size: usize) -> Self {
        let (state, socket, peer, next_seq, config) = conn.into_parts();
        Self {
            state,
            sender: GbnSender::new(next_seq, window_size),
            socket,
            peer,
            config,
        }
    }

    /// Perform an active open and return a GBN-ready connection.
    ///
    /// `window_size` must be at least 1; see [`GbnConnection::from_connection`].
    pub async fn connect(
        socket: Socket,
        peer: SocketAddr,
        window_size: usize,
        config: TimerConfig,
    ) -> Result<Self, ConnError> {
        let conn = Connection::connect(socket, peer, config).await?;
        Ok(Self::from_connection(conn, window_size))
    }

    /// Remote peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Stream `source` to the peer until it is exhausted and every segment
    /// has been acknowledged.
    pub async fn send_all<R>(&mut self, source: &mut R) -> Result<SendSummary, ConnError>
    where
        R: AsyncRead + Unpin,
    {
        if self.state != ConnectionState::Established {
            return Err(ConnError::BadState(self.state));
        }

        let mut summary = SendSummary::default();
        let mut exhausted = false;

        log::info!("[drtp] Data Transfer:");
        while !exhausted || self.sender.has_unacked() {
            // Fill phase.
            while !exhausted && self.sender.can_send() {
                let chunk = read_chunk(source).await?;
                if chunk.is_empty() {
                    exhausted = true;
                    break;
                }
                if self.sender.is_exhausted() {
                    return Err(ConnError::SequenceSpaceExhausted);
                }

                let len = chunk.len();
                let pkt = self.sender.build_data_packet(chunk);
                let seq = pkt.header.seq;
                self.socket.send_to(&pkt, self.peer).await?;
                self.sender.record_sent(pkt);
                summary.segments_sent += 1;
                summary.bytes_sent += len as u64;
                log::info!(
                    "[drtp] packet with seq = {seq} is sent, sliding window = {:?}",
                    self.sender.window_seqs()
                );
            }

            if !self.sender.has_unacked() {
                continue;
            }

            // Acknowledgment phase.
            match self.socket.recv_timeout(self.config.response_timeout).await {
                Ok(Some((pkt, addr))) if addr == self.peer => {
                    let h = pkt.header;
                    if h.is_pure_ack() {
                        let acked = self.sender.on_ack(h.ack);
                        log::info!("[drtp] ACK for packet = {} is received", h.ack);
                        log::debug!(
                            "[drtp] base={} next_seq={} slid={acked}",
                            self.sender.base,
                            self.sender.next_seq
                        );
                    } else if h.has(flags::SYN | flags::ACK) {
                        // The handshake ACK was lost or a SYN was answered twice.
                        log::info!("[drtp] SYN-ACK packet is received again");
                        self.socket.send_to(&handshake_ack(&h), self.peer).await?;
                    } else {
                        log::debug!("[drtp] ignoring segment flags={:#x}", h.flags);
                    }
                }
                Ok(Some((_, addr))) => log::debug!("[drtp] ignoring segment from {addr}"),
                Ok(None) => {
                    summary.timeouts += 1;
                    summary.retransmissions += self.retransmit_window().await? as u64;
                }
                Err(e) if e.is_malformed() => log::warn!("[drtp] discarding datagram: {e}"),
                Err(e) => return Err(e.into()),
            }
        }

        log::debug!("[drtp] transfer complete: {summary:?}");
        Ok(summary)
    }

    /// Send FIN and wait for ACK|FIN, then release the socket.
    ///
    /// Each wait is bounded by `teardown_timeout`; the FIN is resent up to
    /// `teardown_retries` times before giving up.
    pub async fn close(mut self) -> Result<(), ConnError> {
        if self.state != ConnectionState::Established {
            return Err(ConnError::BadState(self.state));
        }

        log::info!("[drtp] Connection Teardown:");
        let fin = Packet::control(self.sender.next_seq, 0, flags::FIN);
        let attempts = self.config.teardown_attempts();

        for attempt in 1..=attempts {
            self.socket.send_to(&fin, self.peer).await?;
            self.state = ConnectionState::FinWait;
            log::info!("[drtp] FIN packet sent (attempt {attempt}/{attempts})");

            let reply = await_segment(&self.socket, self.peer, self.config.teardown_timeout, |h| {
                h.has(flags::ACK | flags::FIN)
            })
            .await?;

            if reply.is_some() {
                self.state = ConnectionState::Closed;
                log::info!("[drtp] FIN ACK packet received");
                log::info!("[drtp] Connection Closes");
                return Ok(());
            }
        }

        self.state = ConnectionState::Closed;
        log::warn!("[drtp] FIN not acknowledged by {}; closing anyway", self.peer);
        Err(ConnError::TeardownTimeout {
            peer: self.peer,
            attempts,
        })
    }

    /// Resend every in-flight segment in ascending order (the Go-Back-N step).
    ///
    /// Returns the number of segments resent.
    async fn retransmit_window(&mut self) -> Result<usize, ConnError> {
        for entry in self.sender.window_entries() {
            let seq = entry.packet.header.seq;
            log::info!("[drtp] Resending packet with seq = {seq}");
            log::debug!("[drtp] seq {seq} transmission #{}", entry.tx_count + 1);
            self.socket.send_to(&entry.packet, self.peer).await?;
        }
        Ok(self.sender.on_retransmit())
    }
}

/// Read the next chunk of up to [`MAX_PAYLOAD`] bytes.
///
/// Short reads are retried so every chunk but the last is full.  An empty
/// chunk means the source is exhausted.
pub async fn read_chunk<R>(source: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = Vec::with_capacity(MAX_PAYLOAD);
    (&mut *source)
        .take(MAX_PAYLOAD as u64)
        .read_to_end(&mut chunk)
        .await?;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_chunk_splits_into_full_segments() {
        let data = vec![7u8; MAX_PAYLOAD * 2 + 10];
        let mut source = data.as_slice();

        assert_eq!(read_chunk(&mut source).await.unwrap().len(), MAX_PAYLOAD);
        assert_eq!(read_chunk(&mut source).await.unwrap().len(), MAX_PAYLOAD);
        assert_eq!(read_chunk(&mut source).await.unwrap().len(), 10);
        assert!(read_chunk(&mut source).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_chunk_fills_across_reader_boundaries() {
        let mut source =
            std::io::Cursor::new(vec![1u8; 100]).chain(std::io::Cursor::new(vec![2u8; 2000]));

        let chunk = read_chunk(&mut source).await.unwrap();
        assert_eq!(chunk.len(), MAX_PAYLOAD);
        assert_eq!(&chunk[..100], &[1u8; 100][..]);
        assert!(chunk[100..].iter().all(|&b| b == 2));
    }

    #[tokio::test]
    async fn send_all_requires_established_state() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer = socket.local_addr;
        let mut conn = GbnConnection {
            state: ConnectionState::Closed,
            sender: GbnSender::new(1, DEFAULT_WINDOW),
            socket,
            peer,
            config: TimerConfig::default(),
        };
        let mut source: &[u8] = b"data";
        assert!(matches!(
            conn.send_all(&mut source).await,
            Err(ConnError::BadState(ConnectionState::Closed))
        ));
    }

    #[tokio::test]
    async fn send_all_refuses_to_wrap_sequence_numbers() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let silent = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut conn = GbnConnection {
            state: ConnectionState::Established,
            sender: GbnSender::new(u16::MAX - 1, DEFAULT_WINDOW),
            socket,
            peer: silent.local_addr,
            config: TimerConfig::default(),
        };

        let data = vec![0u8; MAX_PAYLOAD + 1];
        let mut source = data.as_slice();
        assert!(matches!(
            conn.send_all(&mut source).await,
            Err(ConnError::SequenceSpaceExhausted)
        ));
        assert_eq!(conn.sender.window_seqs(), vec![u16::MAX - 1]);
    }
}
