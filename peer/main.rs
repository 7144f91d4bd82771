#![forbid(unsafe_code)]

//! `testhost-peer`: scripted stand-in for a test-host peer.
//!
//! Connects back to the session's loopback port and plays one scripted
//! behaviour, so the session engine can be driven end to end without a real
//! test platform installed.

use std::process::Stdio;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::info;
use tracing_subscriber::EnvFilter;

use testhost_session::protocol::message_type::{PROTOCOL_VERSION, SESSION_CONNECTED, SESSION_END};
use testhost_session::protocol::{
    deserialize_message, serialize_payload, serialize_payload_with_version, Message,
    FIRST_VERSIONED_PROTOCOL,
};
use testhost_session::transport::codec::FrameCodec;
use testhost_session::{AppError, Result};

/// Request answered with the pid of the peer's spawned child.
const CHILD_PID_REQUEST: &str = "Peer.Child";

/// How long a peer that never connects stays alive.
const HANG_FOR: Duration = Duration::from_secs(3600);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum Behavior {
    /// Handshake, answer the version check, echo every other message until
    /// the session ends.
    Echo,
    /// Send an `Error` message instead of the handshake.
    WrongHandshake,
    /// Exit with a failure before connecting.
    ExitEarly,
    /// Stay alive without ever connecting.
    Hang,
    /// Connect but never send anything.
    Silent,
    /// Like `echo`, after starting a long-lived child process.
    SpawnChild,
}

#[derive(Debug, Parser)]
#[command(name = "testhost-peer", about = "Scripted test-host peer", long_about = None)]
struct Cli {
    /// Loopback port the session listens on.
    #[arg(long)]
    port: u16,

    /// Session process to watch; the peer exits when it disappears.
    #[arg(long)]
    parent_pid: u32,

    #[arg(long, value_enum, default_value_t = Behavior::Echo)]
    behavior: Behavior,

    /// Highest protocol version this peer accepts.
    #[arg(long, default_value_t = 1)]
    protocol_version: u32,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    info!(port = args.port, parent_pid = args.parent_pid, behavior = ?args.behavior, "peer starting");

    #[cfg(unix)]
    tokio::spawn(watch_parent(args.parent_pid));

    match args.behavior {
        Behavior::ExitEarly => {
            return Err(AppError::Launch("exiting before connecting".into()));
        }
        Behavior::Hang => {
            tokio::time::sleep(HANG_FOR).await;
            return Ok(());
        }
        _ => {}
    }

    // Held for the lifetime of the peer; the child outlives it unless killed.
    let child = match args.behavior {
        Behavior::SpawnChild => Some(spawn_child()?),
        _ => None,
    };
    let child_pid = child.as_ref().and_then(tokio::process::Child::id);

    let stream = TcpStream::connect(("127.0.0.1", args.port))
        .await
        .map_err(|err| AppError::Transport(format!("failed to connect to port {}: {err}", args.port)))?;
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec::new());
    let mut writer = FramedWrite::new(write_half, FrameCodec::new());

    match args.behavior {
        Behavior::Silent => {}
        Behavior::WrongHandshake => {
            writer.send(serialize_payload("Error", "bad version")?.as_str()).await?;
        }
        _ => {
            writer
                .send(serialize_payload(SESSION_CONNECTED, &serde_json::Map::new())?.as_str())
                .await?;
        }
    }

    let mut negotiated = None;
    while let Some(frame) = reader.next().await {
        let message = deserialize_message(&frame?)?;
        if message.message_type() == SESSION_END {
            info!("session end requested, closing");
            return Ok(());
        }
        let reply = respond(&message, args.protocol_version, child_pid, &mut negotiated)?;
        writer.send(reply.as_str()).await?;
    }

    info!("session closed the connection");
    Ok(())
}

fn respond(
    message: &Message,
    accepted_version: u32,
    child_pid: Option<u32>,
    negotiated: &mut Option<u32>,
) -> Result<String> {
    match message.message_type() {
        PROTOCOL_VERSION => {
            let offered: u32 = message.payload_as()?;
            let agreed = offered.min(accepted_version);
            *negotiated = Some(agreed);
            encode(PROTOCOL_VERSION, &agreed, *negotiated)
        }
        CHILD_PID_REQUEST => encode(CHILD_PID_REQUEST, &child_pid, *negotiated),
        other => {
            let payload = message.payload().cloned().unwrap_or_default();
            encode(other, &payload, *negotiated)
        }
    }
}

fn encode<T: Serialize + ?Sized>(
    message_type: &str,
    payload: &T,
    version: Option<u32>,
) -> Result<String> {
    match version {
        Some(version) if version >= FIRST_VERSIONED_PROTOCOL => {
            serialize_payload_with_version(message_type, payload, version)
        }
        _ => serialize_payload(message_type, payload),
    }
}

fn spawn_child() -> Result<tokio::process::Child> {
    let child = tokio::process::Command::new("sleep")
        .arg("600")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| AppError::Launch(format!("failed to spawn child: {err}")))?;
    info!(child_pid = child.id().unwrap_or(0), "child process started");
    Ok(child)
}

#[cfg(unix)]
async fn watch_parent(parent_pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(parent_pid) else {
        return;
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        ticker.tick().await;
        if let Err(Errno::ESRCH) = kill(Pid::from_raw(pid), None::<Signal>) {
            info!(parent_pid, "parent process gone, exiting");
            std::process::exit(0);
        }
    }
}
