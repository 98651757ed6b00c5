//! Multiplexed ssh channels and remote processes.
//!
//! Every host gets one ssh ControlMaster connection, addressed by a socket
//! file inside the session directory and kept warm for `control_persist`
//! after the last use. Each query runs as its own short-lived ssh client
//! process that rides on that master connection.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::OwnedRwLockReadGuard;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::session::{ConnectionSession, SessionState};
use super::{validate_host, RemoteTarget};
use crate::error::{EngineError, Result};

/// stderr marker printed by sqlite3 builds without `-json` support.
const UNSUPPORTED_JSON_MARKER: &str = "unknown option: -json";

/// How long to wait for `ssh -O exit` when closing a master connection.
const MASTER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the local ssh client is invoked.
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Program and leading arguments, e.g. `["ssh"]`.
    pub command: Vec<String>,
    /// Idle time the master connection stays up (`ControlPersist`).
    pub control_persist: String,
    /// Extra `-o` options passed on every invocation.
    pub options: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            command: vec!["ssh".to_string()],
            control_persist: "5m".to_string(),
            options: Vec::new(),
        }
    }
}

/// A host bound to its control socket.
///
/// Holding a channel keeps the session pinned; `reset` waits until every
/// channel has been dropped.
#[derive(Debug)]
pub struct Channel {
    host: String,
    socket_path: PathBuf,
    _session: OwnedRwLockReadGuard<SessionState>,
}

impl Channel {
    /// Returns the host this channel talks to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the control-socket path for the host.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// A running remote process.
#[derive(Debug)]
pub struct RemoteProcess {
    child: Child,
    host: String,
}

impl RemoteProcess {
    /// Returns the local process id of the ssh client, if still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Returns the host the process runs on.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Writes the script to stdin from a background task, then closes stdin.
    ///
    /// Writing in the background lets the caller start draining stdout
    /// straight away. A broken pipe only means the process stopped reading;
    /// its exit status reports why.
    pub fn feed(&mut self, script: String) -> JoinHandle<()> {
        let stdin = self.take_stdin();
        tokio::spawn(async move {
            let Some(mut stdin) = stdin else {
                return;
            };
            let result = async {
                stdin.write_all(script.as_bytes()).await?;
                stdin.shutdown().await
            }
            .await;

            match result {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("Remote process closed stdin early");
                }
                Err(e) => warn!("Failed to write script to remote process: {e}"),
            }
        })
    }

    /// Waits for the process to exit.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kills the process and reaps it.
    ///
    /// A process that already exited cannot be killed; that error is
    /// swallowed.
    pub async fn terminate(&mut self) {
        if let Some(pid) = self.id() {
            debug!("Terminating remote process {pid} for {}", self.host);
        }
        if let Err(e) = self.child.start_kill() {
            debug!("Kill skipped, process already gone: {e}");
        }
        if let Err(e) = self.child.wait().await {
            debug!("Failed to reap remote process: {e}");
        }
    }

    /// Returns true once the process has exited and been reaped.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Waits for the process and collects whatever it wrote.
    pub async fn finish(self) -> io::Result<Output> {
        self.child.wait_with_output().await
    }
}

/// Hands out channels and spawns remote processes over them.
#[derive(Debug, Clone)]
pub struct ChannelManager {
    session: ConnectionSession,
    ssh: SshSettings,
}

impl ChannelManager {
    /// Creates a manager with a fresh session.
    pub fn new(ssh: SshSettings) -> Result<Self> {
        if ssh.command.is_empty() {
            return Err(EngineError::configuration("ssh command must not be empty"));
        }
        Ok(Self {
            session: ConnectionSession::create()?,
            ssh,
        })
    }

    /// Returns the session this manager draws sockets from.
    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Binds a host to its control socket, pinning the session.
    pub async fn acquire(&self, host: &str) -> Result<Channel> {
        validate_host(host)?;
        let session = self.session.pin().await;
        let socket_path = session.socket_path(host)?;

        Ok(Channel {
            host: host.to_string(),
            socket_path,
            _session: session,
        })
    }

    /// Starts `remote_command` on the channel's host over its master connection.
    pub fn spawn(&self, channel: &Channel, remote_command: &str) -> Result<RemoteProcess> {
        debug!("Spawning on {}: {}", channel.host(), remote_command);

        let child = self
            .ssh_command(channel.host(), channel.socket_path())
            .arg(remote_command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        Ok(RemoteProcess {
            child,
            host: channel.host().to_string(),
        })
    }

    /// Checks that the remote binary runs and understands `-json`.
    ///
    /// Returns the version line the binary printed.
    pub async fn probe(&self, host: &str, binary: &str) -> Result<String> {
        let channel = self.acquire(host).await?;
        let command = format!("{} -json -version", shell_quote(binary));
        let mut process = self.spawn(&channel, &command)?;
        drop(process.take_stdin());

        let output = process
            .finish()
            .await
            .map_err(|e| EngineError::connectivity(format!("ssh to {host} failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            return Ok(stdout.trim().to_string());
        }

        if stderr.contains(UNSUPPORTED_JSON_MARKER) {
            return Err(EngineError::configuration(format!(
                "The remote SQLite binary '{binary}' doesn't support the -json flag. \
                 Install a version of the SQLite CLI which supports it."
            )));
        }

        warn!("Probe of {binary} on {host} failed: {}", stderr.trim());
        Err(EngineError::connectivity(format!(
            "Unexpected failure validating '{binary}' on {host} ({}): {}",
            output.status,
            stderr.trim()
        )))
    }

    /// Closes all master connections and starts over with a fresh directory.
    ///
    /// Waits for in-flight queries to finish first.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.session.lock_exclusive().await;
        self.close_masters(&guard).await;
        ConnectionSession::reset_locked(&mut guard)
    }

    /// Closes all master connections and removes the socket directory.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.session.lock_exclusive().await;
        self.close_masters(&guard).await;
        ConnectionSession::shutdown_locked(&mut guard)
    }

    async fn close_masters(&self, state: &SessionState) {
        for host in state.hosts() {
            let Ok(socket_path) = state.socket_path(&host) else {
                continue;
            };
            if !socket_path.exists() {
                continue;
            }

            let mut command = self.ssh_command(&host, &socket_path);
            command
                .args(["-O", "exit"])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            match tokio::time::timeout(MASTER_EXIT_TIMEOUT, command.status()).await {
                Ok(Ok(status)) => debug!("Closed master connection to {host}: {status}"),
                Ok(Err(e)) => debug!("Could not close master connection to {host}: {e}"),
                Err(_) => warn!("Timed out closing master connection to {host}"),
            }
        }
    }

    fn ssh_command(&self, host: &str, socket_path: &Path) -> Command {
        let mut parts = self.ssh.command.iter();
        let program = parts.next().map(String::as_str).unwrap_or("ssh");

        let mut command = Command::new(program);
        command
            .args(parts)
            .arg("-o")
            .arg(format!("ControlPersist={}", self.ssh.control_persist))
            .arg("-o")
            .arg("ControlMaster=auto")
            .arg("-o")
            .arg(format!("ControlPath={}", socket_path.display()));
        for option in &self.ssh.options {
            command.arg("-o").arg(option);
        }
        command.arg(host);
        command
    }

    fn spawn_error(&self, e: io::Error) -> EngineError {
        if e.kind() == io::ErrorKind::NotFound {
            EngineError::configuration(format!(
                "ssh program '{}' not found",
                self.ssh.command.first().map(String::as_str).unwrap_or("ssh")
            ))
        } else {
            EngineError::connectivity(format!("Failed to start ssh: {e}"))
        }
    }
}

/// Builds the remote shell command that opens the database in JSON mode.
///
/// The database is opened through a `file:` URI with `mode=ro` unless the
/// request may write.
pub fn remote_command(target: &RemoteTarget, write: bool) -> String {
    let path = encode_uri_path(target.database());
    let mut uri = if path.starts_with('/') {
        format!("file://{path}")
    } else {
        format!("file:{path}")
    };
    if !write {
        uri.push_str("?mode=ro");
    }

    format!("{} -json {}", shell_quote(target.binary()), shell_quote(&uri))
}

/// Percent-encodes the characters that carry meaning in a `file:` URI.
fn encode_uri_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => out.push_str("%25"),
            '?' => out.push_str("%3F"),
            '#' => out.push_str("%23"),
            other => out.push(other),
        }
    }
    out
}

/// Quotes a word for a POSIX shell.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
