//! `drtp` — a reliable, ordered transport (DRTP) over UDP using Go-Back-N.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────────┐   data segments   ┌──────────┐
//!  │ GbnConnection │──────────────────▶│  Server  │
//!  │  (client)     │                   │          │
//!  └──────┬────────┘   cumulative ACKs └────┬─────┘
//!         │◀────────────────────────────────┘
//!         │
//!  ┌──────▼──────────────────────────────┐
//!  │ GbnSender / GbnReceiver             │
//!  │ (window and sequencing state only)  │
//!  └──────┬──────────────────────────────┘
//!         │ raw UDP datagrams
//!  ┌──────▼──────┐
//!  │   Socket    │  (thin async wrapper around tokio UdpSocket)
//!  └─────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]          — wire format (serialise / deserialise)
//! - [`socket`]          — async UDP socket abstraction
//! - [`state`]           — finite-state-machine types
//! - [`timer`]           — timeout and retry parameters
//! - [`connection`]      — client handshake and error type
//! - [`gbn_sender`]      — GBN outbound window state machine
//! - [`gbn_receiver`]    — GBN inbound in-order state machine and statistics
//! - [`gbn_connection`]  — client data transfer and teardown
//! - [`server`]          — server FSM, acknowledgment and teardown
//! - [`simulator`]       — deterministic lossy relay for testing

pub mod connection;
pub mod gbn_connection;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use connection::{ConnError, Connection};
pub use gbn_connection::{GbnConnection, SendSummary};
pub use gbn_receiver::TransferStats;
pub use packet::{Packet, PacketError};
pub use server::Server;
pub use socket::Socket;
pub use timer::TimerConfig;
