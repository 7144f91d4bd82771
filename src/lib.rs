#![forbid(unsafe_code)]

//! Launch a test-host peer process and exchange framed, type-tagged messages
//! with it over a private loopback connection.

pub mod config;
pub mod errors;
pub mod hosts;
pub mod process;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use errors::{AppError, Result};
pub use session::{Session, SessionState, TestHost};
