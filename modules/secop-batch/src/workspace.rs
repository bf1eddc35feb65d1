//! Accumulating workspace store.
//!
//! A workspace is a persisted artifact that several sequential runs append
//! to before a final close hands it off for delivery. The store maps an
//! opaque token to the artifact path and its bookkeeping; expiry is an
//! explicit sweep the caller invokes before lookups, against an injected
//! clock, so nothing here depends on ambient time or a running process.
//! Single-writer discipline per workspace is the caller's responsibility.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};

/// Workspaces older than this are reclaimed by [`WorkspaceStore::sweep`].
pub const MAX_WORKSPACE_AGE: Duration = Duration::hours(6);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceEntry {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub ok_count: usize,
}

pub struct WorkspaceStore {
    entries: HashMap<String, WorkspaceEntry>,
    clock: Box<dyn Clock>,
}

impl WorkspaceStore {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
        }
    }

    /// Register an artifact path and hand back its opaque token.
    pub fn create(&mut self, path: &Path) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(22)
            .map(char::from)
            .collect();
        self.entries.insert(
            token.clone(),
            WorkspaceEntry {
                path: path.to_path_buf(),
                created_at: self.clock.now(),
                ok_count: 0,
            },
        );
        token
    }

    pub fn get(&self, token: &str) -> Option<&WorkspaceEntry> {
        self.entries.get(token)
    }

    /// Add a run's successes to the workspace bookkeeping.
    pub fn record_successes(&mut self, token: &str, count: usize) {
        if let Some(entry) = self.entries.get_mut(token) {
            entry.ok_count += count;
        }
    }

    /// Close a workspace: the entry is removed and the artifact path is
    /// handed over for delivery (the file stays).
    pub fn finalize(&mut self, token: &str) -> Option<WorkspaceEntry> {
        self.entries.remove(token)
    }

    /// Discard a workspace and delete its artifact.
    pub fn reset(&mut self, token: &str) {
        if let Some(entry) = self.entries.remove(token) {
            if entry.path.exists() {
                if let Err(e) = std::fs::remove_file(&entry.path) {
                    warn!(path = %entry.path.display(), error = %e, "Failed to delete workspace artifact");
                } else {
                    info!(path = %entry.path.display(), "Workspace artifact deleted");
                }
            }
        }
    }

    /// Reclaim entries older than `max_age`, deleting their artifacts.
    /// Returns how many were removed. Callers invoke this before lookups.
    pub fn sweep(&mut self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now - e.created_at > max_age)
            .map(|(t, _)| t.clone())
            .collect();
        let count = expired.len();
        for token in expired {
            self.reset(&token);
        }
        if count > 0 {
            info!(count, "Expired workspaces reclaimed");
        }
        count
    }
}
