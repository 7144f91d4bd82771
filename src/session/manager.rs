//! Session state machine: connect, handshake, version check, teardown.
//!
//! ```text
//! Unconnected → Connecting → AwaitingHandshake → VersionChecking → Ready → Faulted
//!      └────────────┴───────────────┴────────────────┴──────────────┴────────┴──→ Disposed
//! ```
//!
//! Resources are acquired in order (listener, peer process, channel) and
//! each is stored on the session the moment it exists, so [`Session::dispose`]
//! releases exactly what a failed [`Session::connect`] left behind.
//!
//! # Accept bound
//!
//! Waiting for the peer to connect ends at the first of: the peer connecting,
//! the peer process exiting (`AppError::Launch`), the configured connect
//! timeout (`AppError::Timeout`), or the session's cancellation token
//! (`AppError::Cancelled`). A peer that dies before connecting therefore
//! never leaves the caller hanging, even with the timeout disabled.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::SessionConfig;
use crate::process::{PeerLauncher, PeerProcess};
use crate::protocol::message_type::{SESSION_CONNECTED, SESSION_CONNECTED_NAME};
use crate::protocol::Message;
use crate::session::bounded;
use crate::session::channel::MessageChannel;
use crate::session::host::TestHost;
use crate::session::state::SessionState;
use crate::transport::channel::FramedChannel;
use crate::transport::port::{bind_listener, find_free_port};
use crate::{AppError, Result};

/// Point-in-time description of a session, for logs and CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session identifier used in every log line.
    pub id: String,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Loopback port the peer was told to connect to.
    pub port: Option<u16>,
    /// Peer process id, while the peer handle is held.
    pub peer_pid: Option<u32>,
    /// Working directory of the peer.
    pub working_directory: PathBuf,
    /// Protocol version agreed by the version check.
    pub protocol_version: Option<u32>,
    /// When the session was constructed.
    pub started_at: DateTime<Utc>,
    /// When the handshake message arrived.
    pub connected_at: Option<DateTime<Utc>>,
}

/// One test-host interaction: a peer process, its connection, and teardown.
///
/// Not reusable: once disposed, construct a new session for a new run.
#[derive(Debug)]
pub struct Session<H: TestHost> {
    id: String,
    host: H,
    launcher: PeerLauncher,
    working_directory: PathBuf,
    peer_args: Vec<String>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    max_frame_bytes: usize,
    state: SessionState,
    port: Option<u16>,
    listener: Option<TcpListener>,
    process: Option<PeerProcess>,
    channel: Option<MessageChannel>,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
}

impl<H: TestHost> Session<H> {
    /// Create an unconnected session. No resources are acquired.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configured working directory no
    /// longer exists or is not a directory.
    pub fn new(host: H, config: &SessionConfig) -> Result<Self> {
        Self::with_launcher(host, PeerLauncher::from_config(config), config)
    }

    /// Create an unconnected session that starts peers with `launcher`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configured working directory no
    /// longer exists or is not a directory.
    pub fn with_launcher(
        host: H,
        launcher: PeerLauncher,
        config: &SessionConfig,
    ) -> Result<Self> {
        if !config.working_directory.is_dir() {
            return Err(AppError::Config(format!(
                "working directory does not exist: {}",
                config.working_directory.display()
            )));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            host,
            launcher,
            working_directory: config.working_directory.clone(),
            peer_args: config.peer_args.clone(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_frame_bytes: config.max_frame_bytes,
            state: SessionState::Unconnected,
            port: None,
            listener: None,
            process: None,
            channel: None,
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
            connected_at: None,
        })
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Loopback port allocated for the peer, once connecting has started.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Peer process id, while the peer is held by the session.
    #[must_use]
    pub fn peer_pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(PeerProcess::pid)
    }

    /// Working directory the peer runs in.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// The variant this session was built with.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Protocol version agreed by the version check.
    #[must_use]
    pub fn protocol_version(&self) -> Option<u32> {
        self.channel
            .as_ref()
            .and_then(MessageChannel::protocol_version)
    }

    /// Token that aborts an in-flight connect or read when cancelled.
    ///
    /// Cancelling does not release resources; call [`Session::dispose`]
    /// afterwards.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the session for diagnostics.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            state: self.state,
            port: self.port,
            peer_pid: self.peer_pid(),
            working_directory: self.working_directory.clone(),
            protocol_version: self.protocol_version(),
            started_at: self.started_at,
            connected_at: self.connected_at,
        }
    }

    /// Launch the peer and drive the session to `Ready`.
    ///
    /// On error the session keeps whatever it acquired; the caller must
    /// [`dispose`](Session::dispose) it and may retry with a new session.
    ///
    /// # Errors
    ///
    /// - `AppError::Protocol` if called twice, or if the first message is not
    ///   the handshake (the error names both tags).
    /// - `AppError::Io` if the port cannot be allocated or bound.
    /// - `AppError::Launch` if the peer cannot start or exits before connecting.
    /// - `AppError::Timeout` / `AppError::Cancelled` for the accept or read bounds.
    /// - Any error returned by the host's version check.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Unconnected {
            return Err(AppError::Protocol(format!(
                "connect requires an unconnected session, state is {}",
                self.state
            )));
        }

        let span = tracing::info_span!("session_connect", session_id = self.id.as_str());
        let result = self.run_connect().instrument(span).await;

        match &result {
            Ok(()) => info!(
                session_id = self.id.as_str(),
                port = self.port.unwrap_or(0),
                "session ready"
            ),
            Err(err) => warn!(
                session_id = self.id.as_str(),
                state = %self.state,
                %err,
                "session connect failed"
            ),
        }

        result
    }

    /// Send a message with an empty payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` unless the session is ready, or
    /// `AppError::Transport` if the write fails (the session is then faulted).
    pub async fn send_message(&mut self, message_type: &str) -> Result<()> {
        let result = self.ready_channel()?.send_message(message_type).await;
        self.fault_on_broken_channel(result)
    }

    /// Send a message carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` unless the session is ready,
    /// `AppError::Codec` if the payload cannot be serialized, or
    /// `AppError::Transport` if the write fails (the session is then faulted).
    pub async fn send_message_with_payload<T: serde::Serialize + ?Sized>(
        &mut self,
        message_type: &str,
        payload: &T,
    ) -> Result<()> {
        let result = self
            .ready_channel()?
            .send_message_with_payload(message_type, payload)
            .await;
        self.fault_on_broken_channel(result)
    }

    /// Wait for the next message from the peer.
    ///
    /// A read that times out, is cancelled, or loses the connection faults
    /// the session: a late reply could otherwise be taken as the answer to
    /// the next request. Only [`dispose`](Session::dispose) remains.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` unless the session is ready; otherwise
    /// see [`MessageChannel::read_message`].
    pub async fn read_message(&mut self) -> Result<Message> {
        let result = self.ready_channel()?.read_message().await;
        self.fault_on_broken_channel(result)
    }

    /// Release every resource and terminate the peer's process tree.
    ///
    /// Order: cancel in-flight work, kill the peer and its descendants, then
    /// close the channel (reader, writer, socket) and drop the listener.
    /// Idempotent; safe after any failed step of `connect`.
    pub async fn dispose(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        self.cancel.cancel();

        if let Some(mut process) = self.process.take() {
            process.kill_tree().await;
        }

        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }

        if self.listener.take().is_some() {
            debug!(session_id = self.id.as_str(), "listener released");
        }

        let previous = self.state;
        self.state = SessionState::Disposed;
        info!(session_id = self.id.as_str(), from = %previous, "session disposed");
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    async fn run_connect(&mut self) -> Result<()> {
        self.state = SessionState::Connecting;

        let port = find_free_port().await?;
        self.port = Some(port);
        self.listener = Some(bind_listener(port)?);

        let mut args = self.host.launch_arguments(port, std::process::id());
        args.extend(self.peer_args.iter().cloned());
        self.process = Some(self.launcher.launch(&args, &self.working_directory, &self.id)?);

        let (stream, peer_addr) = self.accept_peer().await?;
        // Single client: nothing else may connect once the peer has.
        self.listener = None;
        debug!(session_id = self.id.as_str(), %peer_addr, "peer connected");

        self.state = SessionState::AwaitingHandshake;
        let channel = self.channel.insert(MessageChannel::new(
            self.id.clone(),
            FramedChannel::new(stream, peer_addr, self.max_frame_bytes),
            self.read_timeout,
            self.cancel.clone(),
        ));

        let handshake = channel.read_message().await?;
        if handshake.message_type() != SESSION_CONNECTED {
            return Err(AppError::Protocol(format!(
                "expected {SESSION_CONNECTED_NAME} ({SESSION_CONNECTED}) but was {}",
                handshake.message_type()
            )));
        }
        self.connected_at = Some(Utc::now());

        self.state = SessionState::VersionChecking;
        self.host.version_check(channel).await?;

        self.state = SessionState::Ready;
        Ok(())
    }

    /// Accept the peer's connection, bounded as described in the module docs.
    async fn accept_peer(&mut self) -> Result<(TcpStream, SocketAddr)> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| AppError::Protocol("listener is not bound".into()))?;
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| AppError::Protocol("peer process is not running".into()))?;

        let raced = async {
            tokio::select! {
                // A peer that connected and then exited must still be accepted.
                biased;

                accepted = listener.accept() => accepted
                    .map_err(|err| AppError::Transport(format!("accept failed: {err}"))),

                exit = process.wait_for_exit() => Err(AppError::Launch(format!(
                    "peer exited before connecting: {exit}"
                ))),
            }
        };

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(AppError::Cancelled(format!(
                "connect aborted for session {}",
                self.id
            ))),

            result = bounded(self.connect_timeout, "peer connection", raced) => result,
        }
    }

    /// Move a ready session to `Faulted` when the exchange left the channel
    /// out of step with the peer.
    fn fault_on_broken_channel<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(
            err @ (AppError::Timeout(_) | AppError::Cancelled(_) | AppError::Transport(_)),
        ) = &result
        {
            warn!(session_id = self.id.as_str(), %err, "session faulted");
            self.state = SessionState::Faulted;
        }
        result
    }

    fn ready_channel(&mut self) -> Result<&mut MessageChannel> {
        match (self.state, self.channel.as_mut()) {
            (SessionState::Ready, Some(channel)) => Ok(channel),
            (state, _) => Err(AppError::Protocol(format!(
                "session {} is not ready (state: {state})",
                self.id
            ))),
        }
    }
}

impl<H: TestHost> Drop for Session<H> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            // The peer handle kills its process tree as it drops; sockets
            // close with their owners.
            self.cancel.cancel();
            debug!(
                session_id = self.id.as_str(),
                state = %self.state,
                "session dropped without dispose"
            );
        }
    }
}
