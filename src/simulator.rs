//! Fault-injecting UDP relay for exercising loss recovery.
//!
//! A [`Simulator`] sits between one client and one server.  The client is
//! pointed at the relay's address; the relay forwards every datagram to the
//! other side unless a [`DropRule`] claims it.  Every datagram it sees is
//! recorded in a trace so tests can assert on exactly what crossed the
//! "network".
//!
//! ```text
//!  client ──▶ Simulator ──▶ server
//!  client ◀── Simulator ◀── server
//!               │
//!               └── DropRule: drop the 1st data segment with seq=2 ...
//! ```
//!
//! Rules are deterministic, so loss scenarios reproduce exactly.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::packet::{Header, Packet, MAX_DATAGRAM};

/// Which way a datagram travels through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToServer,
    ToClient,
}

/// Selects datagrams to drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRule {
    pub direction: Direction,
    /// Exact flags value to match.
    pub flags: u16,
    /// Sequence number to match, any when `None`.
    pub seq: Option<u16>,
    /// Acknowledgment number to match, any when `None`.
    pub ack: Option<u16>,
    /// How many matching datagrams to drop before the rule goes inert.
    pub count: u32,
}

impl DropRule {
    /// Drop the first data segment carrying `seq` on its way to the server.
    pub fn data(seq: u16) -> Self {
        Self {
            direction: Direction::ToServer,
            flags: 0,
            seq: Some(seq),
            ack: None,
            count: 1,
        }
    }

    /// Drop the first segment with exactly `flags` travelling `direction`.
    pub fn control(direction: Direction, flags: u16) -> Self {
        Self {
            direction,
            flags,
            seq: None,
            ack: None,
            count: 1,
        }
    }

    /// Restrict the rule to one acknowledgment number.
    pub fn with_ack(mut self, ack: u16) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Drop this many matching datagrams instead of one.
    pub fn times(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    fn matches(&self, direction: Direction, h: &Header) -> bool {
        self.count > 0
            && self.direction == direction
            && self.flags == h.flags
            && self.seq.map_or(true, |s| s == h.seq)
            && self.ack.map_or(true, |a| a == h.ack)
    }
}

/// One datagram observed by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub direction: Direction,
    /// `None` for datagrams too short to decode; those are always forwarded.
    pub header: Option<Header>,
    pub payload_len: usize,
    pub dropped: bool,
}

/// A relay bound and ready to run.
#[derive(Debug)]
pub struct Simulator {
    socket: UdpSocket,
    server: SocketAddr,
    rules: Vec<DropRule>,
}

impl Simulator {
    /// Bind the relay on an ephemeral loopback port in front of `server`.
    pub async fn bind(server: SocketAddr, rules: Vec<DropRule>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        Ok(Self {
            socket,
            server,
            rules,
        })
    }

    /// Address clients should connect to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start relaying in a background task.
    pub fn spawn(self) -> SimulatorHandle {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(relay(self, Arc::clone(&trace)));
        SimulatorHandle { trace, task }
    }
}

/// Running relay; stop it to collect the trace.
#[derive(Debug)]
pub struct SimulatorHandle {
    trace: Arc<Mutex<Vec<TraceEvent>>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl SimulatorHandle {
    /// Snapshot of everything seen so far.
    pub async fn trace(&self) -> Vec<TraceEvent> {
        self.trace.lock().await.clone()
    }

    /// Stop relaying and return the full trace.
    pub async fn stop(self) -> Vec<TraceEvent> {
        self.task.abort();
        let _ = self.task.await;
        self.trace.lock().await.clone()
    }
}

async fn relay(mut sim: Simulator, trace: Arc<Mutex<Vec<TraceEvent>>>) -> std::io::Result<()> {
    let mut client: Option<SocketAddr> = None;
    let mut buf = vec![0u8; 2 * MAX_DATAGRAM];

    loop {
        let (n, from) = sim.socket.recv_from(&mut buf).await?;
        let datagram = &buf[..n];

        let (direction, dest) = if from == sim.server {
            match client {
                Some(c) => (Direction::ToClient, c),
                None => continue,
            }
        } else {
            client = Some(from);
            (Direction::ToServer, sim.server)
        };

        let decoded = Packet::decode(datagram).ok();
        let header = decoded.as_ref().map(|p| p.header);

        let mut dropped = false;
        if let Some(h) = &header {
            if let Some(rule) = sim.rules.iter_mut().find(|r| r.matches(direction, h)) {
                rule.count -= 1;
                dropped = true;
            }
        }

        trace.lock().await.push(TraceEvent {
            direction,
            header,
            payload_len: n.saturating_sub(crate::packet::HEADER_LEN),
            dropped,
        });

        if dropped {
            log::debug!("[sim] dropping {direction:?} {header:?}");
            continue;
        }
        sim.socket.send_to(datagram, dest).await?;
    }
}
