#![forbid(unsafe_code)]

//! `testhost-session`: drive a `dotnet vstest` peer from the command line.
//!
//! Loads the session configuration, launches the peer, performs the
//! handshake and version check, optionally exchanges one request, and always
//! disposes the session before exiting.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use testhost_session::hosts::vstest::{VsTestHost, DEFAULT_PROTOCOL_VERSION};
use testhost_session::{AppError, Result, Session, SessionConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "testhost-session", about = "Test-host session driver", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured working directory.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Highest protocol version to offer the peer.
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    protocol_version: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect, verify the protocol version, print the session, and exit.
    Connect,

    /// Connect, send one message, and print the peer's reply.
    Send {
        /// Message type tag (e.g. `TestDiscovery.Start`).
        message_type: String,

        /// JSON payload; an empty object is sent when omitted.
        #[arg(long)]
        payload: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("testhost-session bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = SessionConfig::load_from_path(&args.config)?;
    if let Some(ws) = args.workspace {
        config.set_working_directory(ws)?;
    }
    info!(working_directory = %config.working_directory.display(), "configuration loaded");

    // Reject a bad payload before any process is started.
    let payload = match &args.command {
        Command::Send {
            payload: Some(raw), ..
        } => Some(
            serde_json::from_str::<Value>(raw)
                .map_err(|err| AppError::Config(format!("--payload is not valid JSON: {err}")))?,
        ),
        _ => None,
    };

    let host = VsTestHost::with_protocol_version(args.protocol_version);
    let mut session = Session::new(host, &config)?;

    // ── Cancel in-flight work on ctrl-c / SIGTERM ───────
    let cancel = session.cancellation_token();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    });

    let outcome = drive(&mut session, &args.command, payload.as_ref()).await;
    if let Err(err) = &outcome {
        error!(session_id = session.id(), %err, "session failed");
    }

    session.dispose().await;
    signal_handle.abort();
    info!("testhost-session shut down");

    outcome
}

async fn drive(
    session: &mut Session<VsTestHost>,
    command: &Command,
    payload: Option<&Value>,
) -> Result<()> {
    session.connect().await?;

    match command {
        Command::Connect => {
            println!("{}", serde_json::to_string_pretty(&session.info())?);
        }
        Command::Send { message_type, .. } => {
            match payload {
                Some(payload) => {
                    session
                        .send_message_with_payload(message_type, payload)
                        .await?;
                }
                None => session.send_message(message_type).await?,
            }
            let reply = session.read_message().await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
