//! Concrete test-host variants.
//!
//! - `vstest`: the `dotnet vstest` design-mode host.

pub mod vstest;

pub use vstest::{negotiate_protocol_version, VsTestHost};
