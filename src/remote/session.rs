//! Control-socket session state.
//!
//! One temporary directory holds one ssh control socket per host. Queries
//! pin the directory with a read guard for as long as their remote process
//! runs; `reset` and `shutdown` take the write guard, so they wait for
//! in-flight queries instead of pulling the sockets out from under them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::sync::{OwnedRwLockReadGuard, RwLock, RwLockWriteGuard};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

const DIR_PREFIX: &str = "ltx";
const DIR_SUFFIX: &str = "tmp-confs";

/// The mutable part of a session, behind the session lock.
#[derive(Debug)]
pub struct SessionState {
    dir: Option<TempDir>,
    hosts: Mutex<BTreeSet<String>>,
}

impl SessionState {
    fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(DIR_PREFIX)
            .suffix(DIR_SUFFIX)
            .tempdir()
            .map_err(|e| {
                EngineError::configuration(format!("Could not create socket directory: {e}"))
            })?;
        debug!("Created socket directory {}", dir.path().display());

        Ok(Self {
            dir: Some(dir),
            hosts: Mutex::new(BTreeSet::new()),
        })
    }

    /// Returns the socket directory, or `None` once the session is shut down.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Returns the control-socket path for a host and remembers the host.
    pub fn socket_path(&self, host: &str) -> Result<PathBuf> {
        let dir = self
            .dir()
            .ok_or_else(|| EngineError::configuration("Session has been shut down"))?;

        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.insert(host.to_string());
        }

        Ok(dir.join(format!("{host}.socket")))
    }

    /// Returns every host a socket path was handed out for.
    pub fn hosts(&self) -> Vec<String> {
        self.hosts
            .lock()
            .map(|hosts| hosts.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn teardown(&mut self) -> Result<()> {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.clear();
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close().map_err(|e| {
                EngineError::internal(format!(
                    "Could not remove socket directory {}: {e}",
                    path.display()
                ))
            })?;
            debug!("Removed socket directory {}", path.display());
        }
        Ok(())
    }
}

/// Process-wide registry of control sockets, owned by the executor.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    state: Arc<RwLock<SessionState>>,
}

/// Exclusive access to the session, held while tearing it down.
pub type SessionWriteGuard<'a> = RwLockWriteGuard<'a, SessionState>;

impl ConnectionSession {
    /// Creates a session with a fresh socket directory.
    pub fn create() -> Result<Self> {
        let state = SessionState::create()?;
        info!("Connection session started");
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Pins the session for the duration of a query.
    pub async fn pin(&self) -> OwnedRwLockReadGuard<SessionState> {
        self.state.clone().read_owned().await
    }

    /// Waits for in-flight queries and returns exclusive access.
    pub async fn lock_exclusive(&self) -> SessionWriteGuard<'_> {
        self.state.write().await
    }

    /// Returns the current socket directory.
    pub async fn dir(&self) -> Option<PathBuf> {
        self.state.read().await.dir().map(Path::to_path_buf)
    }

    /// Replaces the socket directory under an already held write guard.
    pub fn reset_locked(guard: &mut SessionWriteGuard<'_>) -> Result<()> {
        guard.teardown()?;
        **guard = SessionState::create()?;
        info!("Connection session reset");
        Ok(())
    }

    /// Removes the socket directory under an already held write guard.
    pub fn shutdown_locked(guard: &mut SessionWriteGuard<'_>) -> Result<()> {
        guard.teardown()?;
        info!("Connection session shut down");
        Ok(())
    }

    /// Destroys the socket directory and creates a fresh one.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.lock_exclusive().await;
        Self::reset_locked(&mut guard)
    }

    /// Destroys the socket directory for good.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.lock_exclusive().await;
        Self::shutdown_locked(&mut guard)
    }
}
