//! Test-host session engine.
//!
//! A [`Session`] launches the peer, accepts its single connection, checks the
//! handshake and protocol version, then exposes request/reply messaging until
//! it is disposed.
//!
//! - `state`: lifecycle states.
//! - `host`: the [`TestHost`] trait a variant implements.
//! - `channel`: [`MessageChannel`], typed messaging over the framed channel.
//! - `manager`: the [`Session`] state machine and teardown.

pub mod channel;
pub mod host;
pub mod manager;
pub mod state;

use std::future::Future;
use std::time::Duration;

pub use channel::MessageChannel;
pub use host::{TestHost, VersionCheckFuture};
pub use manager::{Session, SessionInfo};
pub use state::SessionState;

use crate::{AppError, Result};

/// Await `fut`, failing with `AppError::Timeout` if `limit` elapses first.
///
/// `None` waits indefinitely.
pub(crate) async fn bounded<F, T>(limit: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            AppError::Timeout(format!("{what} did not complete within {limit:?}"))
        })?,
        None => fut.await,
    }
}
