//! Client-side connection establishment and the crate-wide error type.
//!
//! [`Connection::connect`] runs the active half of the three-way handshake:
//!
//! ```text
//!  client                              server
//!    │ ── SYN      seq=0 ack=0 ───────▶ │
//!    │ ◀─ SYN|ACK  seq=0 ack=1 ──────── │
//!    │ ── ACK      seq=1 ack=1 ───────▶ │
//! ```
//!
//! The result is handed to [`crate::gbn_connection::GbnConnection`] for data
//! transfer and teardown.  The passive half lives in [`crate::server`].

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::packet::{flags, Header, Packet};
use crate::socket::{Socket, SocketError};
use crate::state::ConnectionState;
use crate::timer::TimerConfig;

/// Initial sequence number of the client; data starts at `CLIENT_ISN + 1`.
pub const CLIENT_ISN: u16 = 0;

/// Initial sequence number of the server.  It never sends data.
pub const SERVER_ISN: u16 = 0;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by connection-level operations.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The local address could not be bound.  Nothing was sent.
    #[error("failed to bind {addr}: {source}")]
    BindFailure {
        addr: SocketAddr,
        #[source]
        source: SocketError,
    },

    /// No SYN|ACK arrived for any SYN transmission.
    #[error("handshake with {peer} timed out after {attempts} SYN(s)")]
    HandshakeTimeout { peer: SocketAddr, attempts: u32 },

    /// No ACK|FIN arrived for any FIN transmission.
    #[error("teardown with {peer} timed out after {attempts} FIN(s)")]
    TeardownTimeout { peer: SocketAddr, attempts: u32 },

    /// The data source holds more segments than the 16-bit sequence space.
    #[error("sequence space exhausted: transfer exceeds {max} segments", max = u16::MAX - 1)]
    SequenceSpaceExhausted,

    /// Operation not valid in the connection's current state.
    #[error("operation not valid in state {0}")]
    BadState(ConnectionState),

    /// Socket failure while the connection was open.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Reading the data source or writing the data sink failed.
    #[error("data I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An established client connection, ready for data transfer.
#[derive(Debug)]
pub struct Connection {
    /// Current FSM state.
    pub state: ConnectionState,
    socket: Socket,
    peer: SocketAddr,
    config: TimerConfig,
    /// First data sequence number (`CLIENT_ISN + 1`).
    next_seq: u16,
}

impl Connection {
    /// Perform an active open against `peer`.
    ///
    /// The SYN is resent up to `config.handshake_retries` times, each wait
    /// bounded by `config.response_timeout`.
    pub async fn connect(
        socket: Socket,
        peer: SocketAddr,
        config: TimerConfig,
    ) -> Result<Self, ConnError> {
        let syn = Packet::control(CLIENT_ISN, 0, flags::SYN);
        let attempts = config.handshake_attempts();

        for attempt in 1..=attempts {
            socket.send_to(&syn, peer).await?;
            log::info!("[drtp] SYN packet sent (attempt {attempt}/{attempts})");

            let reply = await_segment(&socket, peer, config.response_timeout, |h| {
                h.has(flags::SYN | flags::ACK)
            })
            .await?;

            if let Some(synack) = reply {
                log::info!("[drtp] SYN-ACK packet is received");
                socket.send_to(&handshake_ack(&synack.header), peer).await?;
                log::info!("[drtp] ACK packet sent");
                log::info!("[drtp] Connection established with {peer}");

                return Ok(Self {
                    state: ConnectionState::Established,
                    socket,
                    peer,
                    config,
                    next_seq: CLIENT_ISN.wrapping_add(1),
                });
            }

            log::warn!(
                "[drtp] no SYN-ACK from {peer} within {:?}",
                config.response_timeout
            );
        }

        Err(ConnError::HandshakeTimeout { peer, attempts })
    }

    /// Remote peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Decompose into `(state, socket, peer, next_seq, config)`.
    pub fn into_parts(self) -> (ConnectionState, Socket, SocketAddr, u16, TimerConfig) {
        (self.state, self.socket, self.peer, self.next_seq, self.config)
    }
}

/// Final handshake segment answering `synack`.
pub(crate) fn handshake_ack(synack: &Header) -> Packet {
    Packet::control(synack.ack, synack.seq.wrapping_add(1), flags::ACK)
}

/// Wait up to `wait` for a segment from `peer` whose header satisfies `want`.
///
/// Other segments, foreign senders and malformed datagrams are skipped
/// without extending the deadline.  `Ok(None)` means the deadline passed.
pub(crate) async fn await_segment<F>(
    socket: &Socket,
    peer: SocketAddr,
    wait: Duration,
    want: F,
) -> Result<Option<Packet>, ConnError>
where
    F: Fn(&Header) -> bool,
{
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        match socket.recv_timeout(remaining).await {
            Ok(None) => return Ok(None),
            Ok(Some((pkt, addr))) if addr == peer && want(&pkt.header) => return Ok(Some(pkt)),
            Ok(Some((pkt, addr))) => {
                log::debug!(
                    "[drtp] ignoring segment from {addr}: seq={} ack={} flags={:#x}",
                    pkt.header.seq,
                    pkt.header.ack,
                    pkt.header.flags
                );
            }
            Err(e) if e.is_malformed() => log::warn!("[drtp] discarding datagram: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
}
