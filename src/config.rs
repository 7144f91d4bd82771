//! Session configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::transport::codec::DEFAULT_MAX_FRAME_BYTES;
use crate::{AppError, Result};

fn default_connect_timeout_seconds() -> u64 {
    30
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Configuration for one test-host session, parsed from `testhost.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Test-host executable (e.g., `dotnet`).
    pub peer_executable: PathBuf,
    /// Directory the peer process runs in.
    pub working_directory: PathBuf,
    /// Extra arguments appended after the host variant's own arguments.
    #[serde(default)]
    pub peer_args: Vec<String>,
    /// Extra environment variables injected into the peer process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Upper bound on waiting for the peer to connect back; 0 means no bound.
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Upper bound on waiting for one inbound message; 0 means no bound.
    #[serde(default)]
    pub read_timeout_seconds: u64,
    /// Largest inbound frame accepted before the channel fails.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl SessionConfig {
    /// Build a configuration programmatically with default bounds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `working_directory` is not an existing
    /// directory.
    pub fn new(
        peer_executable: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut config = Self {
            peer_executable: peer_executable.into(),
            working_directory: working_directory.into(),
            peer_args: Vec::new(),
            env: HashMap::new(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            read_timeout_seconds: 0,
            max_frame_bytes: default_max_frame_bytes(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the working directory, re-validating it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `dir` is not an existing directory.
    pub fn set_working_directory(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        self.working_directory = dir.into();
        self.validate()
    }

    /// Connect bound, or `None` when disabled.
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_seconds(self.connect_timeout_seconds)
    }

    /// Per-message read bound, or `None` when disabled.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_seconds(self.read_timeout_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.peer_executable.as_os_str().is_empty() {
            return Err(AppError::Config("peer_executable must not be empty".into()));
        }

        if self.max_frame_bytes == 0 {
            return Err(AppError::Config(
                "max_frame_bytes must be greater than zero".into(),
            ));
        }

        let canonical = self
            .working_directory
            .canonicalize()
            .map_err(|err| AppError::Config(format!("working_directory invalid: {err}")))?;
        if !canonical.is_dir() {
            return Err(AppError::Config(format!(
                "working_directory is not a directory: {}",
                canonical.display()
            )));
        }
        self.working_directory = canonical;

        Ok(())
    }
}

fn non_zero_seconds(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}
