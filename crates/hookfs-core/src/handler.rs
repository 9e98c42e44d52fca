//! Mount handler trait.
//!
//! A handler services every operation under one mount point. The
//! dispatcher resolves a path to its handler, splits the path at the
//! mount boundary, and calls exactly one method per operation. Calls are
//! synchronous and never retried.

use std::fmt;
use std::sync::Arc;

use crate::channel::{Channel, CloseHook};
use crate::env::EnvId;
use crate::error::HandlerResult;
use crate::types::{AccessMode, GlobTypes, Stat};
use crate::value::Value;

/// Arguments common to every handler call.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Normalized path up to the split position (the mount point).
    pub root: &'a str,
    /// Normalized path after the mount point, without leading separator.
    pub relative: &'a str,
    /// The path as the caller gave it.
    pub path: &'a str,
    /// Environment that issued the operation, if known.
    pub caller: Option<EnvId>,
}

/// A successfully opened file.
pub struct Opened {
    pub channel: Channel,
    /// Cleanup to run when the channel closes.
    pub on_close: Option<CloseHook>,
}

impl Opened {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            on_close: None,
        }
    }

    pub fn with_close_hook(mut self, hook: CloseHook) -> Self {
        self.on_close = Some(hook);
        self
    }
}

impl fmt::Debug for Opened {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opened")
            .field("channel", &self.channel)
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Services filesystem operations for a mount.
pub trait VfsHandler: Send + Sync {
    /// Environment that owns this handler's mounts.
    fn owner(&self) -> EnvId;

    /// False once the owning environment is gone.
    fn is_alive(&self) -> bool;

    /// Callback prefix, reported by path-type and `info` queries.
    fn describe(&self) -> Vec<String>;

    fn stat(&self, req: &Request<'_>) -> HandlerResult<Stat>;

    /// Ok means access is granted.
    fn access(&self, req: &Request<'_>, mode: AccessMode) -> HandlerResult<()>;

    fn open(&self, req: &Request<'_>, mode: &str, permissions: u32) -> HandlerResult<Opened>;

    /// Entries of the directory at `req` matching `pattern`.
    fn match_in_directory(
        &self,
        req: &Request<'_>,
        pattern: &str,
        types: GlobTypes,
    ) -> HandlerResult<Vec<String>>;

    fn delete_file(&self, req: &Request<'_>) -> HandlerResult<()>;

    fn create_directory(&self, req: &Request<'_>) -> HandlerResult<()>;

    fn remove_directory(&self, req: &Request<'_>, recursive: bool) -> HandlerResult<()>;

    /// Names of the attributes this mount supports, in index order.
    fn attribute_names(&self, req: &Request<'_>) -> HandlerResult<Vec<String>>;

    fn attribute_get(&self, req: &Request<'_>, index: usize) -> HandlerResult<Value>;

    fn attribute_set(&self, req: &Request<'_>, index: usize, value: &Value) -> HandlerResult<()>;

    /// Set access and modification times (seconds since the epoch).
    fn utime(&self, req: &Request<'_>, atime: i64, mtime: i64) -> HandlerResult<()>;
}

/// Shared handler reference held by mounts and cached path representations.
pub type HandlerRef = Arc<dyn VfsHandler>;
