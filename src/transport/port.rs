//! Loopback port allocation and the session listener.
//!
//! [`find_free_port`] binds a throwaway socket to port 0, reads back the port
//! the OS assigned, and releases the socket. The session then binds its real
//! listener to that port with a second socket. Another process may grab the
//! port in between; that window is accepted. A lost race surfaces as an
//! `AppError::Io` from [`bind_listener`] and the caller starts a new session.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::{TcpListener, TcpSocket};
use tracing::debug;

use crate::{AppError, Result};

/// Pending connections the listener will queue; the protocol has one client.
const LISTEN_BACKLOG: u32 = 1;

/// Return a loopback TCP port that was free at the time of the call.
///
/// # Errors
///
/// Returns `AppError::Io` if no ephemeral socket can be bound.
pub async fn find_free_port() -> Result<u16> {
    let ephemeral = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .map_err(|err| AppError::Io(format!("failed to bind ephemeral port: {err}")))?;
    let port = ephemeral
        .local_addr()
        .map_err(|err| AppError::Io(format!("failed to read ephemeral port: {err}")))?
        .port();
    drop(ephemeral);

    debug!(port, "allocated ephemeral loopback port");
    Ok(port)
}

/// Bind a single-client listener on `127.0.0.1:port`.
///
/// # Errors
///
/// Returns `AppError::Io` if the port was taken after allocation or the
/// socket cannot listen.
pub fn bind_listener(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let socket = TcpSocket::new_v4()
        .map_err(|err| AppError::Io(format!("failed to create listener socket: {err}")))?;
    socket
        .bind(addr)
        .map_err(|err| AppError::Io(format!("failed to bind listener on {addr}: {err}")))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|err| AppError::Io(format!("failed to listen on {addr}: {err}")))
}
