//! Remote access layer for litexplore.
//!
//! Owns the ssh side of the engine: which host and database to talk to,
//! the control-socket session, and the processes spawned per query.

mod channel;
mod session;

pub use channel::{remote_command, shell_quote, Channel, ChannelManager, RemoteProcess, SshSettings};
pub use session::{ConnectionSession, SessionState};

use serde::Serialize;

use crate::error::{EngineError, Result};

/// Default name of the sqlite3 CLI on the remote host.
pub const DEFAULT_BINARY: &str = "sqlite3";

/// Where the database lives: host, remote sqlite3 binary, remote file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteTarget {
    host: String,
    database: String,
    binary: String,
}

impl RemoteTarget {
    /// Creates a target, validating the host.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        binary: impl Into<String>,
    ) -> Result<Self> {
        let host = host.into();
        validate_host(&host)?;

        let database = database.into();
        if database.is_empty() {
            return Err(EngineError::validation("Remote database path is required"));
        }

        let binary = binary.into();
        if binary.is_empty() {
            return Err(EngineError::validation("Remote sqlite3 binary is required"));
        }

        Ok(Self {
            host,
            database,
            binary,
        })
    }

    /// Returns the ssh host (anything `ssh` accepts, including config aliases).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the database path on the remote host.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the sqlite3 binary on the remote host.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Returns a display string for logs and UI.
    pub fn display_string(&self) -> String {
        format!("{} @ {}", self.database, self.host)
    }
}

/// Checks that a host can be passed to ssh and used as a socket file name.
pub(crate) fn validate_host(host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(EngineError::validation("Host is required"));
    }
    if host.starts_with('-') {
        return Err(EngineError::validation(format!(
            "Invalid host '{host}': must not start with '-'"
        )));
    }
    if host.contains('/') || host.chars().any(char::is_whitespace) {
        return Err(EngineError::validation(format!(
            "Invalid host '{host}': must not contain '/' or whitespace"
        )));
    }
    Ok(())
}
