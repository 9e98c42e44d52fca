//! Filesystem operations routed to mount handlers.
//!
//! Each operation resolves the path, splits it at the mount boundary,
//! makes exactly one handler call, and maps handler failures to the error
//! the host layer expects for that operation.

use tracing::{debug, warn};

use crate::channel::Channel;
use crate::env::EnvId;
use crate::error::{HandlerError, VfsError, VfsResult};
use crate::handler::{HandlerRef, Request};
use crate::path::{FsPath, split_at_mount};
use crate::registry::Vfs;
use crate::types::{AccessMode, GlobTypes, Stat};
use crate::value::Value;

impl Vfs {
    fn route<'p>(
        &self,
        path: &'p FsPath,
        caller: Option<EnvId>,
    ) -> VfsResult<(HandlerRef, Request<'p>)> {
        let rep = self
            .path_in_filesystem(path)
            .ok_or_else(|| VfsError::not_owned(path.raw()))?;
        if !rep.handler().is_alive() {
            warn!(path = %path.raw(), "mount owner is gone");
            return Err(VfsError::not_owned(path.raw()));
        }
        let (root, relative) = split_at_mount(path.normalized(), rep.split());
        let request = Request {
            root,
            relative,
            path: path.raw(),
            caller,
        };
        Ok((rep.handler().clone(), request))
    }

    pub fn stat(&self, path: &FsPath) -> VfsResult<Stat> {
        let (handler, req) = self.route(path, None)?;
        handler.stat(&req).map_err(|e| {
            debug!(path = %path.raw(), error = %e, "stat failed");
            VfsError::not_found(path.raw())
        })
    }

    /// Ok means access is granted.
    pub fn access(&self, path: &FsPath, mode: AccessMode) -> VfsResult<()> {
        let (handler, req) = self.route(path, None)?;
        handler.access(&req, mode).map_err(|e| {
            debug!(path = %path.raw(), error = %e, "access denied");
            VfsError::not_found(path.raw())
        })
    }

    /// Open a file. The returned channel is owned by the caller; any close
    /// callback the handler supplied is already attached.
    pub fn open(
        &self,
        path: &FsPath,
        mode: &str,
        permissions: u32,
        caller: Option<EnvId>,
    ) -> VfsResult<Channel> {
        let (handler, req) = self.route(path, caller)?;
        match handler.open(&req, mode, permissions) {
            Ok(opened) => {
                if let Some(hook) = opened.on_close {
                    opened.channel.on_close(hook);
                }
                debug!(path = %path.raw(), channel = %opened.channel.name(), "opened");
                Ok(opened.channel)
            }
            Err(HandlerError::Raised(value)) => Err(match value
                .as_int()
                .and_then(|code| i32::try_from(code).ok())
            {
                Some(code) => VfsError::Posix {
                    path: path.raw().to_string(),
                    code,
                },
                None => VfsError::Handler {
                    path: path.raw().to_string(),
                    message: value.to_string(),
                },
            }),
            Err(other) => Err(other.into_vfs(path.raw())),
        }
    }

    /// Append the entries of `dir` matching `pattern` to `matches`.
    ///
    /// On failure `matches` is left untouched.
    pub fn match_in_directory(
        &self,
        dir: &FsPath,
        pattern: &str,
        types: GlobTypes,
        matches: &mut Vec<String>,
        caller: Option<EnvId>,
    ) -> VfsResult<()> {
        let (handler, req) = self.route(dir, caller)?;
        let found = handler
            .match_in_directory(&req, pattern, types)
            .map_err(|e| e.into_vfs(dir.raw()))?;
        matches.extend(found);
        Ok(())
    }

    pub fn delete_file(&self, path: &FsPath) -> VfsResult<()> {
        let (handler, req) = self.route(path, None)?;
        handler.delete_file(&req).map_err(|e| e.into_vfs(path.raw()))
    }

    pub fn create_directory(&self, path: &FsPath) -> VfsResult<()> {
        let (handler, req) = self.route(path, None)?;
        handler
            .create_directory(&req)
            .map_err(|e| e.into_vfs(path.raw()))
    }

    /// Remove a directory. Any failure names the directory itself.
    pub fn remove_directory(&self, path: &FsPath, recursive: bool) -> VfsResult<()> {
        let (handler, req) = self.route(path, None)?;
        handler.remove_directory(&req, recursive).map_err(|e| {
            debug!(path = %path.raw(), error = %e, "removedirectory failed");
            VfsError::DirectoryNotEmpty(path.raw().to_string())
        })
    }

    /// Attribute names supported for `path`, in index order.
    pub fn file_attribute_names(&self, path: &FsPath) -> VfsResult<Vec<String>> {
        let (handler, req) = self.route(path, None)?;
        handler
            .attribute_names(&req)
            .map_err(|e| e.into_vfs(path.raw()))
    }

    pub fn file_attribute_get(
        &self,
        path: &FsPath,
        index: usize,
        caller: Option<EnvId>,
    ) -> VfsResult<Value> {
        let (handler, req) = self.route(path, caller)?;
        handler
            .attribute_get(&req, index)
            .map_err(|e| e.into_vfs(path.raw()))
    }

    pub fn file_attribute_set(
        &self,
        path: &FsPath,
        index: usize,
        value: &Value,
        caller: Option<EnvId>,
    ) -> VfsResult<()> {
        let (handler, req) = self.route(path, caller)?;
        handler
            .attribute_set(&req, index, value)
            .map_err(|e| e.into_vfs(path.raw()))
    }

    pub fn utime(&self, path: &FsPath, atime: i64, mtime: i64) -> VfsResult<()> {
        let (handler, req) = self.route(path, None)?;
        handler
            .utime(&req, atime, mtime)
            .map_err(|e| e.into_vfs(path.raw()))
    }
}
