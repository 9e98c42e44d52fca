//! Mount table.
//!
//! Mounts are kept newest-first. Lookups are exact on the mount point;
//! longest-prefix routing is done by the resolver, which walks a path back
//! one component at a time and probes this table.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::env::EnvId;
use crate::error::{VfsError, VfsResult};
use crate::handler::HandlerRef;

/// One registered mount.
#[derive(Clone)]
pub struct MountEntry {
    /// The mount point, verbatim for volumes, normalized otherwise.
    pub prefix: String,
    /// Whether the mount point is also a volume root.
    pub is_volume: bool,
    pub handler: HandlerRef,
}

impl fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountEntry")
            .field("prefix", &self.prefix)
            .field("is_volume", &self.is_volume)
            .field("owner", &self.handler.owner())
            .finish()
    }
}

/// Registered mounts, most recent first.
pub struct MountTable {
    mounts: Mutex<VecDeque<MountEntry>>,
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &self.list())
            .finish()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self {
            mounts: Mutex::new(VecDeque::new()),
        }
    }

    /// Add a mount at the head of the table.
    ///
    /// A mount point may only be registered once.
    pub fn insert(&self, entry: MountEntry) -> VfsResult<()> {
        let mut mounts = self.mounts.lock();
        if mounts.iter().any(|m| m.prefix == entry.prefix) {
            return Err(VfsError::MountExists(entry.prefix));
        }
        mounts.push_front(entry);
        Ok(())
    }

    /// Remove the first mount owned by `owner`, matching `prefix` if given.
    pub fn remove(&self, prefix: Option<&str>, owner: EnvId) -> Option<MountEntry> {
        let mut mounts = self.mounts.lock();
        let idx = mounts
            .iter()
            .position(|m| m.handler.owner() == owner && prefix.is_none_or(|p| m.prefix == p))?;
        mounts.remove(idx)
    }

    /// Handler mounted exactly at `prefix`.
    pub fn find(&self, prefix: &str) -> Option<HandlerRef> {
        self.mounts
            .lock()
            .iter()
            .find(|m| m.prefix == prefix)
            .map(|m| m.handler.clone())
    }

    /// Mount points, newest first.
    pub fn list(&self) -> Vec<String> {
        self.mounts.lock().iter().map(|m| m.prefix.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.mounts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.lock().is_empty()
    }
}
