//! Path normalization and path objects.
//!
//! A normalized path is absolute, uses `/` as the only separator, has no
//! `.`/`..`/empty components, and no trailing separator except for the
//! root. Paths that start with a registered volume keep the volume prefix
//! verbatim, so `ftp://host/a` stays `ftp://host/a`.

use std::fmt;

use parking_lot::Mutex;

use crate::handler::HandlerRef;

/// The only separator used by mounted filesystems.
pub const SEPARATOR: char = '/';

/// Normalize `raw` against `cwd`.
pub fn normalize(raw: &str, cwd: &str, volumes: &[String]) -> String {
    let volume = volumes
        .iter()
        .filter(|v| !v.is_empty() && raw.starts_with(v.as_str()))
        .max_by_key(|v| v.len());

    if let Some(volume) = volume {
        let rest = collapse(&raw[volume.len()..]);
        return if rest.is_empty() {
            volume.clone()
        } else if volume.ends_with(SEPARATOR) {
            format!("{volume}{rest}")
        } else {
            format!("{volume}{SEPARATOR}{rest}")
        };
    }

    if !raw.starts_with(SEPARATOR) {
        let cwd = if cwd.is_empty() { "/" } else { cwd };
        return normalize(&format!("{cwd}{SEPARATOR}{raw}"), "/", volumes);
    }

    format!("{SEPARATOR}{}", collapse(raw))
}

fn collapse(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split(SEPARATOR) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Where a path's owning mount ends, and who owns it.
#[derive(Clone)]
pub struct NativeRep {
    split: usize,
    handler: HandlerRef,
}

impl NativeRep {
    pub(crate) fn new(split: usize, handler: HandlerRef) -> Self {
        Self { split, handler }
    }

    /// Byte offset in the normalized path where the mount point ends.
    pub fn split(&self) -> usize {
        self.split
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }
}

impl fmt::Debug for NativeRep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRep")
            .field("split", &self.split)
            .field("owner", &self.handler.owner())
            .finish()
    }
}

/// Split a normalized path at a mount boundary.
///
/// Returns the mount root and the path relative to it. A mount point that
/// ends in a separator (`ftp://`) keeps it in the root and the relative
/// part starts right after.
pub fn split_at_mount(normalized: &str, split: usize) -> (&str, &str) {
    if split >= normalized.len() {
        return (normalized, "");
    }
    let root = &normalized[..split];
    let mut start = split;
    if normalized.as_bytes()[split] != b'/' && split > 0 {
        start -= 1;
    }
    (root, &normalized[start + 1..])
}

#[derive(Clone)]
struct CachedRep {
    epoch: u64,
    rep: Option<NativeRep>,
}

/// A path as given by a caller, with its normalized form and a cached
/// resolution.
///
/// The cached resolution is tagged with the mount epoch it was computed
/// at and is ignored once the mount table changes.
pub struct FsPath {
    raw: String,
    normalized: String,
    rep: Mutex<Option<CachedRep>>,
}

impl FsPath {
    pub fn new(raw: impl Into<String>, normalized: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            normalized: normalized.into(),
            rep: Mutex::new(None),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The cached resolution, regardless of its epoch.
    pub fn native_rep(&self) -> Option<NativeRep> {
        self.rep.lock().as_ref().and_then(|c| c.rep.clone())
    }

    /// Cached resolution computed at `epoch`, if there is one.
    pub(crate) fn cached(&self, epoch: u64) -> Option<Option<NativeRep>> {
        self.rep
            .lock()
            .as_ref()
            .filter(|c| c.epoch == epoch)
            .map(|c| c.rep.clone())
    }

    pub(crate) fn store(&self, epoch: u64, rep: Option<NativeRep>) {
        *self.rep.lock() = Some(CachedRep { epoch, rep });
    }

    /// Forget the cached resolution.
    pub fn invalidate(&self) {
        *self.rep.lock() = None;
    }
}

impl Clone for FsPath {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            normalized: self.normalized.clone(),
            rep: Mutex::new(self.rep.lock().clone()),
        }
    }
}

impl fmt::Debug for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsPath")
            .field("raw", &self.raw)
            .field("normalized", &self.normalized)
            .finish()
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
