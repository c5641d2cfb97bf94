//! Entry point for `drtp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, file handles).

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWrite;

use drtp::gbn_connection::DEFAULT_WINDOW;
use drtp::{GbnConnection, Server, Socket, TimerConfig};

/// Reliable file transfer over UDP (DRTP, Go-Back-N).
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive one file and report the throughput.
    Server {
        /// IPv4 address to bind (e.g. 10.0.1.2).
        #[arg(short, long)]
        ip: Ipv4Addr,
        /// Port to bind, 1025-65535.
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1025..))]
        port: u16,
        /// Where to write the received data; discarded when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Send one file to a server.
    Client {
        /// Server IPv4 address.
        #[arg(short, long)]
        ip: Ipv4Addr,
        /// Server port, 1025-65535.
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1025..))]
        port: u16,
        /// File to send.
        #[arg(short, long)]
        file: PathBuf,
        /// Sliding window size in segments.
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_WINDOW as u16,
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        window: u16,
        /// Retransmission timeout in milliseconds.
        #[arg(short, long, default_value_t = 500)]
        timeout_ms: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity; protocol events are logged at info.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { ip, port, output } => {
            let addr = SocketAddr::from((ip, port));
            log::info!("Starting server on {addr}");
            run_server(addr, output).await
        }
        Mode::Client {
            ip,
            port,
            file,
            window,
            timeout_ms,
        } => {
            let addr = SocketAddr::from((ip, port));
            log::info!("Starting client, sending {} to {addr}", file.display());
            let config = TimerConfig {
                response_timeout: Duration::from_millis(timeout_ms),
                ..TimerConfig::default()
            };
            run_client(addr, file, usize::from(window), config).await
        }
    }
}

async fn run_server(addr: SocketAddr, output: Option<PathBuf>) -> Result<()> {
    let server = Server::bind(addr).await?;

    match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("creating {}", path.display()))?;
            serve(server, &mut file).await
        }
        None => serve(server, &mut tokio::io::sink()).await,
    }
}

async fn serve<W>(server: Server, sink: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let stats = server.serve(sink).await?;
    log::info!(
        "received {} bytes in {} segments ({} discarded)",
        stats.bytes_accepted,
        stats.segments_accepted,
        stats.segments_discarded
    );
    Ok(())
}

async fn run_client(
    server: SocketAddr,
    path: PathBuf,
    window: usize,
    config: TimerConfig,
) -> Result<()> {
    let mut file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    let socket = Socket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    let mut conn = GbnConnection::connect(socket, server, window, config).await?;

    let summary = conn.send_all(&mut file).await?;
    log::info!(
        "sent {} bytes in {} segments ({} retransmitted)",
        summary.bytes_sent,
        summary.segments_sent,
        summary.retransmissions
    );

    conn.close().await?;
    Ok(())
}
