//! The process-wide VFS registry.
//!
//! [`Vfs`] owns the mount table and volume list, tracks which
//! environments have registered for VFS use, and stamps every mount
//! change with a new epoch so cached path resolutions go stale.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashSet;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::env::{EnvId, Environment};
use crate::error::{VfsError, VfsResult};
use crate::handler::HandlerRef;
use crate::mount::{MountEntry, MountTable};
use crate::path::{self, FsPath};
use crate::volume::VolumeList;

/// Mounts, volumes and registered environments.
#[derive(Debug, Default)]
pub struct Vfs {
    pub(crate) mounts: MountTable,
    volumes: VolumeList,
    environments: DashSet<EnvId>,
    /// Held across each mount or unmount so the table and the volume list
    /// change together with the registration check.
    changes: Mutex<()>,
    epoch: AtomicU64,
    exiting: AtomicBool,
}

/// Shared handle to the registry.
pub type SharedVfs = Arc<Vfs>;

/// Create a new shared registry.
pub fn shared_vfs() -> SharedVfs {
    Arc::new(Vfs::new())
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `env` to own mounts.
    pub fn register_environment(&self, env: &dyn Environment) {
        if self.environments.insert(env.id()) {
            debug!(env = %env.id(), "environment registered");
        }
    }

    pub fn is_registered(&self, id: EnvId) -> bool {
        self.environments.contains(&id)
    }

    /// Forget the environment and remove every mount it owns.
    ///
    /// The environment is forgotten first, so a mount racing with the
    /// teardown is either drained here or refused. Returns the number of
    /// mounts removed.
    pub fn unregister_environment(&self, id: EnvId) -> usize {
        self.environments.remove(&id);
        let mut removed = 0;
        while self.remove_mount(None, id).is_ok() {
            removed += 1;
        }
        debug!(env = %id, removed, "environment unregistered");
        removed
    }

    /// Register a mount.
    ///
    /// `prefix` must already be in its final form: verbatim for volumes,
    /// normalized otherwise.
    pub fn add_mount(&self, prefix: &str, is_volume: bool, handler: HandlerRef) -> VfsResult<()> {
        let owner = handler.owner();
        if prefix.is_empty() {
            return Err(VfsError::invalid_argument("mount point must not be empty"));
        }

        let _changes = self.changes.lock();
        if !self.is_registered(owner) {
            return Err(VfsError::NotRegistered(owner.as_u64()));
        }
        self.mounts.insert(MountEntry {
            prefix: prefix.to_string(),
            is_volume,
            handler,
        })?;
        if is_volume {
            self.volumes.add(prefix);
        }
        self.mounts_changed();
        info!(prefix, is_volume, owner = %owner, "mounted");
        Ok(())
    }

    /// Remove a mount owned by `owner`.
    ///
    /// With no prefix, the most recent mount of that owner is removed. The
    /// removed entry is handed back to the caller.
    pub fn remove_mount(&self, prefix: Option<&str>, owner: EnvId) -> VfsResult<MountEntry> {
        let _changes = self.changes.lock();
        let entry = self
            .mounts
            .remove(prefix, owner)
            .ok_or_else(|| VfsError::no_such_mount(prefix.unwrap_or_default()))?;
        if entry.is_volume {
            self.volumes.remove(&entry.prefix);
        }
        self.mounts_changed();
        info!(prefix = %entry.prefix, owner = %owner, "unmounted");
        Ok(entry)
    }

    /// Handler mounted exactly at `prefix`.
    pub fn find_mount(&self, prefix: &str) -> Option<HandlerRef> {
        self.mounts.find(prefix)
    }

    /// Mount points, newest first.
    pub fn list_mounts(&self) -> Vec<String> {
        self.mounts.list()
    }

    /// Current volume roots, or None when there are none.
    pub fn list_volumes(&self) -> Option<Arc<Vec<String>>> {
        self.volumes.snapshot()
    }

    /// Invalidate every cached path resolution.
    pub fn mounts_changed(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Enter process exit: no path is claimed from now on.
    pub fn begin_exit(&self) {
        self.exiting.store(true, Ordering::Release);
        self.volumes.clear();
        self.mounts_changed();
        info!("vfs exiting");
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Normalize `raw` against `cwd` and the current volumes.
    pub fn normalize(&self, raw: &str, cwd: &str) -> String {
        let volumes = self.volumes.snapshot();
        path::normalize(raw, cwd, volumes.as_ref().map(|v| v.as_slice()).unwrap_or_default())
    }

    /// Build a path object for `raw`.
    pub fn make_path(&self, raw: &str, cwd: &str) -> FsPath {
        FsPath::new(raw, self.normalize(raw, cwd))
    }
}
