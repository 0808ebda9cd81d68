//! Entry point for `udp-stream`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, stdin/stdout plumbing).

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use udp_stream::config::{
    DEFAULT_ACK_TIMEOUT, DEFAULT_CRITICAL_LAG, DEFAULT_MAX_REORDER_BYTES, DEFAULT_MSS,
    DEFAULT_READ_TIMEOUT, DEFAULT_WINDOW_SEGMENTS,
};
use udp_stream::{Config, Connection, UdpChannel};

/// TCP-like reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Read stdin and deliver it to the peer.
    Send {
        /// Local address to bind (e.g. 0.0.0.0:9001).
        #[arg(short, long, default_value = "0.0.0.0:9001")]
        bind: SocketAddr,
        /// Remote peer address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
        #[command(flatten)]
        tunables: Tunables,
    },
    /// Receive a fixed number of bytes and write them to stdout.
    Recv {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Remote peer address (e.g. 127.0.0.1:9001).
        #[arg(short, long)]
        peer: SocketAddr,
        /// Number of bytes to receive.
        #[arg(short, long)]
        len: usize,
        #[command(flatten)]
        tunables: Tunables,
    },
}

/// Protocol tunables; defaults match [`Config::default`].
#[derive(Args)]
struct Tunables {
    /// Maximum payload bytes per segment.
    #[arg(long, default_value_t = DEFAULT_MSS)]
    mss: usize,
    /// Maximum bytes in flight (defaults to 12 segments).
    #[arg(long)]
    window_size: Option<usize>,
    /// Resend the earliest unacknowledged segment after this many ms.
    #[arg(long, default_value_t = DEFAULT_ACK_TIMEOUT.as_millis() as u64)]
    ack_timeout_ms: u64,
    /// Give up after this many ms without progress.
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT.as_millis() as u64)]
    read_timeout_ms: u64,
    /// Non-advancing ACKs that force a resend.
    #[arg(long, default_value_t = DEFAULT_CRITICAL_LAG)]
    critical_lag: u32,
    /// How far ahead of the stream an out-of-order segment may be buffered.
    #[arg(long, default_value_t = DEFAULT_MAX_REORDER_BYTES)]
    max_reorder_bytes: usize,
}

impl From<Tunables> for Config {
    fn from(t: Tunables) -> Self {
        Config {
            mss: t.mss,
            // Saturate so an absurd --mss reaches `validate` instead of
            // overflowing here.
            window_size: t
                .window_size
                .unwrap_or(t.mss.saturating_mul(DEFAULT_WINDOW_SEGMENTS)),
            ack_timeout: Duration::from_millis(t.ack_timeout_ms),
            read_timeout: Duration::from_millis(t.read_timeout_ms),
            critical_lag: t.critical_lag,
            max_reorder_bytes: t.max_reorder_bytes,
        }
    }
}

/// How long `recv` keeps acknowledging after delivering its bytes, so the
/// sender's last segments get confirmed.
const LINGER: Duration = Duration::from_millis(500);

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.mode {
        Mode::Send {
            bind,
            peer,
            tunables,
        } => run_send(bind, peer, tunables.into()).await,
        Mode::Recv {
            bind,
            peer,
            len,
            tunables,
        } => run_recv(bind, peer, len, tunables.into()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_send(bind: SocketAddr, peer: SocketAddr, config: Config) -> Result<(), BoxError> {
    let mut input = Vec::new();
    tokio::io::stdin().read_to_end(&mut input).await?;

    let channel = UdpChannel::bind(bind, peer).await?;
    log::info!("Sending {} byte(s) from {} to {peer}", input.len(), channel.local_addr());

    let mut conn = Connection::new(channel, config)?;
    conn.send(&input).await?;
    conn.flush().await?;

    let stats = conn.stats();
    log::info!(
        "Delivered {} byte(s) in {} segment(s), {} retransmit(s)",
        conn.confirmed_bytes(),
        stats.segments_sent,
        stats.retransmits()
    );
    Ok(())
}

async fn run_recv(
    bind: SocketAddr,
    peer: SocketAddr,
    len: usize,
    config: Config,
) -> Result<(), BoxError> {
    let channel = UdpChannel::bind(bind, peer).await?;
    log::info!("Receiving {len} byte(s) on {} from {peer}", channel.local_addr());

    let mut conn = Connection::new(channel, config)?;
    let data = conn.recv(len).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&data).await?;
    stdout.flush().await?;

    // Keep answering retransmissions until the sender goes quiet.
    conn.linger(LINGER).await?;
    if conn.buffered() > 0 {
        log::warn!("Ignoring {} trailing byte(s)", conn.buffered());
    }
    Ok(())
}
