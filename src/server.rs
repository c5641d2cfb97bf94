//! Server role: passive open, in-order reception and teardown.
//!
//! [`Server::serve`] runs one connection to completion.  Every inbound
//! segment is classified by its flags and fed to the FSM:
//!
//! | Segment                | Action                                        |
//! |------------------------|-----------------------------------------------|
//! | `SYN`                  | reply `SYN|ACK`, open the session             |
//! | `FIN`                  | reply `ACK|FIN`, finish                       |
//! | `ACK`, empty payload   | handshake confirmation, no reply              |
//! | anything else          | data: accept and `ACK` if in order, else drop |
//!
//! The receive wait is unbounded; a silent client blocks the server until the
//! process is stopped.

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::connection::{ConnError, SERVER_ISN};
use crate::gbn_receiver::{GbnReceiver, TransferStats};
use crate::packet::{flags, Header, Packet};
use crate::socket::Socket;
use crate::state::ConnectionState;

/// What the dispatch loop should do after one segment.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
}

/// A bound DRTP server handling a single connection.
#[derive(Debug)]
pub struct Server {
    socket: Socket,
    state: ConnectionState,
    receiver: GbnReceiver,
    /// Client that opened the session; segments from anyone else are ignored.
    peer: Option<SocketAddr>,
}

impl Server {
    /// Bind to `addr` and enter `Listen`.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ConnError> {
        let socket = Socket::bind(addr)
            .await
            .map_err(|source| ConnError::BindFailure { addr, source })?;
        log::info!("[drtp] server listening on {}", socket.local_addr);
        Ok(Self {
            socket,
            state: ConnectionState::Listen,
            receiver: GbnReceiver::new(),
            peer: None,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Current FSM state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Receive one connection, writing accepted payload to `sink`.
    ///
    /// Returns once the client's FIN has been answered; the socket is
    /// released when this returns.
    pub async fn serve<W>(mut self, sink: &mut W) -> Result<TransferStats, ConnError>
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let (pkt, addr) = match self.socket.recv_from().await {
                Ok(received) => received,
                Err(e) if e.is_malformed() => {
                    log::warn!("[drtp] discarding datagram: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if self.handle(pkt, addr, sink).await? == Step::Done {
                break;
            }
        }

        sink.flush().await?;
        let stats = self.receiver.finish();
        match stats.throughput_mbps() {
            Some(mbps) => log::info!("[drtp] The throughput is {mbps:.2} Mbps"),
            None => log::info!("[drtp] no data received"),
        }
        log::info!("[drtp] Connection Closes");
        Ok(stats)
    }

    async fn handle<W>(
        &mut self,
        pkt: Packet,
        addr: SocketAddr,
        sink: &mut W,
    ) -> Result<Step, ConnError>
    where
        W: AsyncWrite + Unpin,
    {
        let h = pkt.header;

        if h.has(flags::SYN) {
            self.on_syn(h, addr).await?;
            return Ok(Step::Continue);
        }

        if self.peer != Some(addr) {
            log::debug!(
                "[drtp] {} ignoring segment from {addr}: seq={} flags={:#x}",
                self.state,
                h.seq,
                h.flags
            );
            return Ok(Step::Continue);
        }

        if h.has(flags::FIN) {
            log::info!("[drtp] FIN packet is received");
            let fin_ack =
                Packet::control(SERVER_ISN, h.seq.wrapping_add(1), flags::ACK | flags::FIN);
            self.socket.send_to(&fin_ack, addr).await?;
            log::info!("[drtp] FIN ACK packet is sent");
            self.state = ConnectionState::Closed;
            return Ok(Step::Done);
        }

        if h.has(flags::ACK) && pkt.payload.is_empty() {
            if self.state == ConnectionState::SynReceived {
                self.state = ConnectionState::Established;
                log::info!("[drtp] ACK packet is received");
                log::info!("[drtp] Connection established with {addr}");
            }
            return Ok(Step::Continue);
        }

        self.on_data(h, &pkt.payload, addr, sink).await?;
        Ok(Step::Continue)
    }

    /// Open the session on the first SYN; answer repeats from the same client.
    async fn on_syn(&mut self, h: Header, addr: SocketAddr) -> Result<(), ConnError> {
        match self.peer {
            None => {
                self.peer = Some(addr);
                self.receiver = GbnReceiver::new();
                self.state = ConnectionState::SynReceived;
                log::info!("[drtp] SYN packet is received");
            }
            Some(peer) if peer == addr => log::info!("[drtp] SYN packet is received again"),
            Some(peer) => {
                log::warn!("[drtp] ignoring SYN from {addr}; already serving {peer}");
                return Ok(());
            }
        }

        let synack = Packet::control(SERVER_ISN, h.seq.wrapping_add(1), flags::SYN | flags::ACK);
        self.socket.send_to(&synack, addr).await?;
        log::info!("[drtp] SYN-ACK packet is sent");
        Ok(())
    }

    async fn on_data<W>(
        &mut self,
        h: Header,
        payload: &[u8],
        addr: SocketAddr,
        sink: &mut W,
    ) -> Result<(), ConnError>
    where
        W: AsyncWrite + Unpin,
    {
        if self.state == ConnectionState::SynReceived {
            // The handshake ACK was lost; data proves the client is established.
            self.state = ConnectionState::Established;
            log::info!("[drtp] Connection established with {addr}");
        }

        let expected = self.receiver.expected_seq;
        if !self.receiver.on_segment(h.seq, payload) {
            log::warn!(
                "[drtp] packet {} received out of order, expected {expected}",
                h.seq
            );
            return Ok(());
        }

        log::info!("[drtp] packet {} is received", h.seq);
        sink.write_all(payload).await?;
        let ack = Packet::control(SERVER_ISN, h.seq, flags::ACK);
        self.socket.send_to(&ack, addr).await?;
        log::info!("[drtp] sending ack for the received {}", h.seq);
        Ok(())
    }
}
