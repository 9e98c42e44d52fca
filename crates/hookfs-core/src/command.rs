//! The `vfs_filesystem` management command.
//!
//! ```text
//! vfs_filesystem mount ?-volume? path callback
//! vfs_filesystem info ?path?
//! vfs_filesystem unmount path
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::env::Environment;
use crate::error::{VfsError, VfsResult};
use crate::registry::Vfs;
use crate::script::ScriptHandler;
use crate::value::Value;

pub const COMMAND_NAME: &str = "vfs_filesystem";

const USAGE: &str = "vfs_filesystem option ?arg ...?";
const USAGE_MOUNT: &str = "vfs_filesystem mount ?-volume? path cmd";
const USAGE_INFO: &str = "vfs_filesystem info ?path?";
const USAGE_UNMOUNT: &str = "vfs_filesystem unmount path";

/// A parsed `vfs_filesystem` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesystemCommand {
    Mount {
        volume: bool,
        path: String,
        callback: Vec<String>,
    },
    Info {
        path: Option<String>,
    },
    Unmount {
        path: String,
    },
}

impl FilesystemCommand {
    pub fn parse(args: &[Value]) -> VfsResult<Self> {
        let Some((sub, rest)) = args.split_first() else {
            return Err(VfsError::usage(USAGE));
        };

        match sub.to_string().as_str() {
            "mount" => match rest {
                [path, callback] => Ok(Self::Mount {
                    volume: false,
                    path: path.to_string(),
                    callback: callback_words(callback)?,
                }),
                [flag, path, callback] => {
                    let flag = flag.to_string();
                    if flag != "-volume" {
                        return Err(VfsError::BadOption {
                            given: flag,
                            expected: "-volume".to_string(),
                        });
                    }
                    Ok(Self::Mount {
                        volume: true,
                        path: path.to_string(),
                        callback: callback_words(callback)?,
                    })
                }
                _ => Err(VfsError::usage(USAGE_MOUNT)),
            },
            "info" => match rest {
                [] => Ok(Self::Info { path: None }),
                [path] => Ok(Self::Info {
                    path: Some(path.to_string()),
                }),
                _ => Err(VfsError::usage(USAGE_INFO)),
            },
            "unmount" => match rest {
                [path] => Ok(Self::Unmount {
                    path: path.to_string(),
                }),
                _ => Err(VfsError::usage(USAGE_UNMOUNT)),
            },
            other => Err(VfsError::BadOption {
                given: other.to_string(),
                expected: "info, mount, or unmount".to_string(),
            }),
        }
    }
}

/// A callback is a command prefix: a list, or a string split on whitespace.
fn callback_words(callback: &Value) -> VfsResult<Vec<String>> {
    let words = match callback {
        Value::Str(s) => s.split_whitespace().map(str::to_string).collect(),
        other => other
            .clone()
            .into_string_list()
            .map_err(|v| VfsError::invalid_argument(format!("callback must be a list, got {v}")))?,
    };
    if words.is_empty() {
        return Err(VfsError::invalid_argument("callback must not be empty"));
    }
    Ok(words)
}

/// Run a parsed command on behalf of `env`.
pub fn execute(
    vfs: &Vfs,
    env: &Arc<dyn Environment>,
    command: FilesystemCommand,
) -> VfsResult<Value> {
    debug!(env = %env.id(), ?command, "vfs_filesystem");
    match command {
        FilesystemCommand::Mount {
            volume,
            path,
            callback,
        } => {
            let point = if volume {
                path
            } else {
                vfs.normalize(&path, &env.cwd())
            };
            let handler = Arc::new(ScriptHandler::new(env, callback));
            vfs.add_mount(&point, volume, handler)?;
            Ok(Value::empty())
        }
        FilesystemCommand::Info { path: None } => Ok(Value::list(vfs.list_mounts())),
        FilesystemCommand::Info { path: Some(path) } => {
            let normalized = vfs.normalize(&path, &env.cwd());
            let handler = vfs
                .find_mount(&path)
                .or_else(|| vfs.find_mount(&normalized))
                .or_else(|| vfs.resolve(&normalized).map(|rep| rep.handler().clone()))
                .ok_or_else(|| VfsError::no_such_mount(&path))?;
            Ok(Value::list(handler.describe()))
        }
        FilesystemCommand::Unmount { path } => {
            let owner = env.id();
            vfs.remove_mount(Some(&path), owner)
                .or_else(|_| {
                    let normalized = vfs.normalize(&path, &env.cwd());
                    vfs.remove_mount(Some(&normalized), owner)
                })
                .map_err(|_| VfsError::no_such_mount(&path))?;
            Ok(Value::empty())
        }
    }
}

/// Parse and run `vfs_filesystem` with `args` (excluding the command name).
pub fn filesystem(vfs: &Vfs, env: &Arc<dyn Environment>, args: &[Value]) -> VfsResult<Value> {
    execute(vfs, env, FilesystemCommand::parse(args)?)
}
