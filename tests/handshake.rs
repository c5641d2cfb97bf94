//! Integration tests for connection setup and teardown.
//!
//! Each test binds a real server on loopback, runs it in a background task,
//! and drives a client against it (optionally through the lossy relay).

use std::net::SocketAddr;
use std::time::Duration;

use drtp::{
    connection::{ConnError, Connection},
    gbn_connection::GbnConnection,
    packet::{flags, Packet, MAX_PAYLOAD},
    server::Server,
    simulator::{Direction, DropRule, Simulator},
    socket::Socket,
    state::ConnectionState,
    timer::TimerConfig,
    TransferStats,
};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn quick() -> TimerConfig {
    TimerConfig {
        response_timeout: Duration::from_millis(100),
        handshake_retries: 3,
        teardown_timeout: Duration::from_millis(100),
        teardown_retries: 2,
    }
}

async fn ephemeral() -> Socket {
    Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind failed")
}

/// Start a server on an OS-chosen loopback port.
async fn spawn_server() -> (SocketAddr, JoinHandle<(TransferStats, Vec<u8>)>) {
    let server = Server::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind server");
    let addr = server.local_addr();
    let task = tokio::spawn(async move {
        let mut sink = Vec::new();
        let stats = server.serve(&mut sink).await.expect("serve");
        (stats, sink)
    });
    (addr, task)
}

async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("timed out")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_reaches_established() {
    let (server_addr, server) = spawn_server().await;

    let conn = within(Connection::connect(ephemeral().await, server_addr, quick()))
        .await
        .expect("connect");
    assert_eq!(conn.state, ConnectionState::Established);
    assert_eq!(conn.peer(), server_addr);

    let gbn = GbnConnection::from_connection(conn, 3);
    assert_eq!(gbn.sender.base, 1);
    assert_eq!(gbn.sender.next_seq, 1);
    within(gbn.close()).await.expect("close");

    let (stats, sink) = within(server).await.unwrap();
    assert!(sink.is_empty());
    assert_eq!(stats.bytes_accepted, 0);
    assert_eq!(stats.throughput_mbps(), None);
}

#[tokio::test]
async fn handshake_precedes_data_on_the_wire() {
    let (server_addr, server) = spawn_server().await;
    let sim = Simulator::bind(server_addr, vec![]).await.unwrap();
    let relay = sim.local_addr().unwrap();
    let sim = sim.spawn();

    let mut conn = within(GbnConnection::connect(ephemeral().await, relay, 3, quick()))
        .await
        .expect("connect");
    let mut source: &[u8] = b"payload";
    within(conn.send_all(&mut source)).await.expect("send");
    within(conn.close()).await.expect("close");
    within(server).await.unwrap();

    let trace = sim.stop().await;
    let flags_seen: Vec<(Direction, u16)> = trace
        .iter()
        .map(|e| (e.direction, e.header.expect("decodable").flags))
        .collect();
    assert_eq!(
        &flags_seen[..3],
        &[
            (Direction::ToServer, flags::SYN),
            (Direction::ToClient, flags::SYN | flags::ACK),
            (Direction::ToServer, flags::ACK),
        ]
    );
    assert_eq!(flags_seen[3], (Direction::ToServer, 0), "first data after handshake");
}

#[tokio::test]
async fn lost_syn_is_retried() {
    let (server_addr, server) = spawn_server().await;
    let sim = Simulator::bind(
        server_addr,
        vec![DropRule::control(Direction::ToServer, flags::SYN)],
    )
    .await
    .unwrap();
    let relay = sim.local_addr().unwrap();
    let sim = sim.spawn();

    let conn = within(GbnConnection::connect(ephemeral().await, relay, 3, quick()))
        .await
        .expect("connect after retry");
    within(conn.close()).await.expect("close");
    within(server).await.unwrap();

    let syns = sim
        .stop()
        .await
        .iter()
        .filter(|e| e.header.map_or(false, |h| h.flags == flags::SYN))
        .count();
    assert_eq!(syns, 2);
}

#[tokio::test]
async fn connect_to_silent_peer_fails_with_handshake_timeout() {
    // Bound but never answering.
    let silent = ephemeral().await;

    let result = within(Connection::connect(ephemeral().await, silent.local_addr, quick())).await;
    assert!(
        matches!(result, Err(ConnError::HandshakeTimeout { attempts: 4, .. })),
        "expected HandshakeTimeout, got: {result:?}"
    );
}

#[tokio::test]
async fn bind_to_address_in_use_is_bind_failure() {
    let first = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let taken = first.local_addr();

    let second = Server::bind(taken).await;
    assert!(
        matches!(second, Err(ConnError::BindFailure { addr, .. }) if addr == taken),
        "expected BindFailure, got: {second:?}"
    );
}

#[tokio::test]
async fn teardown_is_one_fin_and_one_fin_ack() {
    let (server_addr, server) = spawn_server().await;
    let sim = Simulator::bind(server_addr, vec![]).await.unwrap();
    let relay = sim.local_addr().unwrap();
    let sim = sim.spawn();

    let mut conn = within(GbnConnection::connect(ephemeral().await, relay, 3, quick()))
        .await
        .unwrap();
    let mut source: &[u8] = &[9u8; 3000];
    within(conn.send_all(&mut source)).await.unwrap();
    let fin_seq = conn.sender.next_seq;
    within(conn.close()).await.expect("close");
    within(server).await.unwrap();

    let trace = sim.stop().await;
    let fins: Vec<_> = trace
        .iter()
        .filter_map(|e| e.header.map(|h| (e.direction, h)))
        .filter(|(_, h)| h.flags & flags::FIN != 0)
        .collect();
    assert_eq!(fins.len(), 2, "{fins:?}");
    assert_eq!(fins[0].0, Direction::ToServer);
    assert_eq!(fins[0].1.seq, fin_seq);
    assert_eq!(fins[0].1.flags, flags::FIN);
    assert_eq!(fins[1].0, Direction::ToClient);
    assert_eq!(fins[1].1.flags, flags::ACK | flags::FIN);
    assert_eq!(fins[1].1.ack, fin_seq + 1);
}

#[tokio::test]
async fn lost_fin_ack_ends_in_teardown_timeout() {
    let (server_addr, server) = spawn_server().await;
    let sim = Simulator::bind(
        server_addr,
        vec![DropRule::control(Direction::ToClient, flags::ACK | flags::FIN)],
    )
    .await
    .unwrap();
    let relay = sim.local_addr().unwrap();
    let _sim = sim.spawn();

    let conn = within(GbnConnection::connect(ephemeral().await, relay, 3, quick()))
        .await
        .unwrap();
    let result = within(conn.close()).await;
    assert!(
        matches!(result, Err(ConnError::TeardownTimeout { attempts: 3, .. })),
        "expected TeardownTimeout, got: {result:?}"
    );

    // The server answered its one FIN and shut down regardless.
    within(server).await.unwrap();
}

/// A repeated SYN|ACK arriving mid-transfer carries `ack = 1`.  It must be
/// answered with the handshake ACK again, not treated as acknowledging data
/// segment 1.
#[tokio::test]
async fn duplicate_syn_ack_does_not_acknowledge_data() {
    let peer = ephemeral().await;
    let peer_addr = peer.local_addr;

    let client = tokio::spawn(async move {
        let socket = ephemeral().await;
        let mut conn = GbnConnection::connect(socket, peer_addr, 1, quick()).await?;
        let data = vec![5u8; 2 * MAX_PAYLOAD];
        let mut source = data.as_slice();
        conn.send_all(&mut source).await
    });

    let (syn, client_addr) = within(peer.recv_from()).await.unwrap();
    assert!(syn.header.has(flags::SYN));

    let synack = Packet::control(0, 1, flags::SYN | flags::ACK);
    peer.send_to(&synack, client_addr).await.unwrap();
    peer.send_to(&synack, client_addr).await.unwrap();

    // Never acknowledge anything: segment 1 must come back after a timeout.
    let mut data_seqs = Vec::new();
    let mut handshake_acks = 0;
    while data_seqs.len() < 2 {
        let (pkt, _) = within(peer.recv_from()).await.unwrap();
        if pkt.header.is_data() {
            data_seqs.push(pkt.header.seq);
        } else if pkt.header.is_pure_ack() {
            assert_eq!((pkt.header.seq, pkt.header.ack), (1, 1));
            handshake_acks += 1;
        }
    }
    client.abort();

    assert_eq!(data_seqs, vec![1, 1]);
    assert_eq!(handshake_acks, 2);
}
