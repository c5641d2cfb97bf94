//! Connection finite-state machine (FSM) types.
//!
//! The client walks the active-open path, the server the passive one:
//!
//! ```text
//!  client:  Closed ──SYN sent──▶ SynSent ──SYN|ACK──▶ Established
//!                                                        │ FIN sent
//!                                                        ▼
//!           Closed ◀─────────────ACK|FIN──────────── FinWait
//!
//!  server:  Listen ──SYN──▶ SynReceived ──ACK / data──▶ Established
//!                                                        │ FIN
//!                                                        ▼
//!                                                      Closed
//! ```
//!
//! Transitions live in [`crate::connection`], [`crate::gbn_connection`] and
//! [`crate::server`].

/// All possible states of a DRTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection exists; initial client state and final state of both roles.
    #[default]
    Closed,
    /// Server bound and waiting for a SYN.
    Listen,
    /// SYN has been sent; waiting for SYN|ACK.
    SynSent,
    /// SYN received and SYN|ACK sent; waiting for the final ACK.
    SynReceived,
    /// Handshake complete; data transfer in progress.
    Established,
    /// Local FIN sent; waiting for ACK|FIN.
    FinWait,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
        };
        f.write_str(name)
    }
}
