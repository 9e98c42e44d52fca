//! Volume list.
//!
//! Readers take a snapshot (an `Arc` clone) and never see a list change
//! under them. Writers copy the list when a snapshot is outstanding.

use std::sync::Arc;

use parking_lot::Mutex;

/// Copy-on-write list of volume mount points.
#[derive(Debug, Default)]
pub struct VolumeList {
    volumes: Mutex<Option<Arc<Vec<String>>>>,
}

impl VolumeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, volume: &str) {
        let mut guard = self.volumes.lock();
        let list = guard.get_or_insert_with(Default::default);
        Arc::make_mut(list).push(volume.to_string());
    }

    /// Remove one occurrence of `volume`. Returns false if absent.
    pub fn remove(&self, volume: &str) -> bool {
        let mut guard = self.volumes.lock();
        let Some(list) = guard.as_mut() else {
            return false;
        };
        let Some(idx) = list.iter().position(|v| v == volume) else {
            return false;
        };
        if list.len() == 1 {
            *guard = None;
        } else {
            Arc::make_mut(list).remove(idx);
        }
        true
    }

    /// Current list, or None when there are no volumes.
    pub fn snapshot(&self) -> Option<Arc<Vec<String>>> {
        self.volumes.lock().clone()
    }

    pub fn clear(&self) {
        *self.volumes.lock() = None;
    }
}
