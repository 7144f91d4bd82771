//! Test-host peer process launcher.
//!
//! Spawns the peer executable with:
//! - the caller's working directory and arguments,
//! - extra environment variables from configuration,
//! - `kill_on_drop(true)` so a forgotten handle still stops the direct child,
//! - on Unix, a fresh process group so teardown reaches every descendant.
//!
//! The peer's stdout and stderr are drained into the log at `DEBUG` so a
//! chatty peer never stalls on a full pipe.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::{AppError, Result};

// ── Exit summary ─────────────────────────────────────────────────────────────

/// How the peer process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSummary {
    /// Process exit code; `None` when terminated by a signal or unknown.
    pub code: Option<i32>,
    /// Human-readable description.
    pub description: String,
}

impl ExitSummary {
    fn from_status(status: ExitStatus) -> Self {
        let description = if status.success() {
            "exited normally (code 0)".to_owned()
        } else {
            status.code().map_or_else(
                || "terminated by signal".to_owned(),
                |c| format!("exited with code {c}"),
            )
        };
        Self {
            code: status.code(),
            description,
        }
    }

    fn unknown(reason: impl Display) -> Self {
        Self {
            code: None,
            description: format!("status unknown: {reason}"),
        }
    }
}

impl Display for ExitSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Starts peer processes for one kind of test host.
#[derive(Debug, Clone)]
pub struct PeerLauncher {
    executable: PathBuf,
    env: HashMap<String, String>,
}

impl PeerLauncher {
    /// Launcher for `executable` with no extra environment.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            env: HashMap::new(),
        }
    }

    /// Launcher built from the session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            executable: config.peer_executable.clone(),
            env: config.env.clone(),
        }
    }

    /// Add an environment variable passed to every launched peer.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Executable this launcher starts.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Spawn the peer in `working_dir` with `args`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the executable cannot be started.
    pub fn launch(
        &self,
        args: &[String],
        working_dir: &Path,
        session_id: &str,
    ) -> Result<PeerProcess> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(args)
            .envs(&self.env)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(cmd.as_std_mut(), 0);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Launch(format!(
                "failed to start {}: {err}",
                self.executable.display()
            ))
        })?;

        let pid = child.id();
        info!(
            session_id,
            pid = pid.unwrap_or(0),
            executable = %self.executable.display(),
            ?args,
            "peer process started"
        );

        if let Some(stdout) = child.stdout.take() {
            drain_output(session_id.to_owned(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            drain_output(session_id.to_owned(), "stderr", stderr);
        }

        Ok(PeerProcess {
            session_id: session_id.to_owned(),
            child,
            pid,
            exit: None,
            torn_down: false,
        })
    }
}

// ── Process handle ───────────────────────────────────────────────────────────

/// Handle to a running (or finished) peer process.
///
/// Dropping the handle without [`PeerProcess::kill_tree`] kills the peer's
/// process tree.
#[derive(Debug)]
pub struct PeerProcess {
    session_id: String,
    child: Child,
    pid: Option<u32>,
    exit: Option<ExitSummary>,
    torn_down: bool,
}

impl PeerProcess {
    /// OS process id, if the process was started.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// How the process ended, once observed.
    #[must_use]
    pub fn exit_summary(&self) -> Option<&ExitSummary> {
        self.exit.as_ref()
    }

    /// Whether the process is still running.
    pub fn is_running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(ExitSummary::from_status(status));
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!(
                    session_id = self.session_id.as_str(),
                    %err,
                    "failed to poll peer process status"
                );
                self.exit = Some(ExitSummary::unknown(err));
                false
            }
        }
    }

    /// Wait until the process exits and describe how it ended.
    ///
    /// Cancel-safe: dropping the future leaves the handle usable.
    pub async fn wait_for_exit(&mut self) -> ExitSummary {
        if let Some(exit) = &self.exit {
            return exit.clone();
        }
        let summary = match self.child.wait().await {
            Ok(status) => ExitSummary::from_status(status),
            Err(err) => ExitSummary::unknown(err),
        };
        self.exit = Some(summary.clone());
        summary
    }

    /// Kill the process and all of its descendants, then reap it.
    ///
    /// The process group is signalled even when the peer itself has already
    /// exited, since its children may still be running. Safe to call
    /// repeatedly.
    pub async fn kill_tree(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.signal_group();
        if !self.is_running() {
            debug!(
                session_id = self.session_id.as_str(),
                pid = self.pid.unwrap_or(0),
                "peer already exited, process group signalled"
            );
            return;
        }

        self.kill_leader();
        let summary = self.wait_for_exit().await;
        info!(
            session_id = self.session_id.as_str(),
            pid = self.pid.unwrap_or(0),
            status = %summary,
            "peer process tree terminated"
        );
    }

    /// SIGKILL every process in the peer's group; no-op off Unix.
    fn signal_group(&self) {
        // The peer leads its own process group, so the group id is its pid.
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pgid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
                if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                    debug!(
                        session_id = self.session_id.as_str(),
                        pgid,
                        %err,
                        "killpg found no process group members"
                    );
                }
            }
        }
    }

    fn kill_leader(&mut self) {
        if let Err(err) = self.child.start_kill() {
            debug!(
                session_id = self.session_id.as_str(),
                %err,
                "start_kill on peer failed"
            );
        }
    }
}

impl Drop for PeerProcess {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.signal_group();
        if self.is_running() {
            warn!(
                session_id = self.session_id.as_str(),
                "peer process dropped while running, killing process tree"
            );
            self.kill_leader();
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Forward each line of a peer output stream to the log until EOF.
fn drain_output<R>(session_id: String, stream: &'static str, output: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(output).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(session_id, stream, line, "peer output"),
                Ok(None) => break,
                Err(err) => {
                    debug!(session_id, stream, %err, "peer output stream failed");
                    break;
                }
            }
        }
    });
}
