//! Peer process lifecycle.
//!
//! - `launcher`: spawn the test-host executable and terminate its process tree.

pub mod launcher;

pub use launcher::{ExitSummary, PeerLauncher, PeerProcess};
