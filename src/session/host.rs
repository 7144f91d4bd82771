//! Test-host variant abstraction.
//!
//! A [`TestHost`] supplies the two behaviours that differ between test-host
//! flavours: how the peer is invoked, and how its protocol version is
//! verified once it has connected. The [`Session`](crate::session::Session)
//! engine owns everything else.

use std::future::Future;
use std::pin::Pin;

use crate::session::channel::MessageChannel;
use crate::Result;

/// Boxed future returned by [`TestHost::version_check`].
pub type VersionCheckFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Variant-specific behaviour plugged into a session.
pub trait TestHost: Send + Sync {
    /// Arguments used to launch the peer.
    ///
    /// They must tell the peer which loopback `port` to connect back to and
    /// the `parent_process_id` to watch so it can exit if orphaned.
    fn launch_arguments(&self, port: u16, parent_process_id: u32) -> Vec<String>;

    /// Verify the connected peer speaks a supported protocol version.
    ///
    /// Runs once, right after the handshake, before the session reports
    /// ready. The check may exchange messages over `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Version`](crate::AppError::Version) when the peer's
    /// version is unsupported, or any transport/codec error raised while
    /// talking to it. Either way the session must be disposed.
    fn version_check<'a>(&'a self, channel: &'a mut MessageChannel) -> VersionCheckFuture<'a>;
}
