//! Script-implemented virtual filesystems.
//!
//! A mount binds a path prefix to a handler. Filesystem operations on any
//! path under that prefix are routed to the handler, which for scripted
//! mounts means evaluating a callback command in the environment that
//! created the mount.
//!
//! ```text
//! Vfs (registry)
//!  ├── MountTable      newest-first mount entries
//!  ├── VolumeList      copy-on-write volume roots
//!  └── resolve/dispatch
//!          └── VfsHandler  (ScriptHandler → Environment::eval)
//! ```

pub mod channel;
pub mod command;
mod dispatch;
pub mod env;
pub mod error;
pub mod handler;
pub mod mount;
pub mod path;
pub mod registry;
mod resolve;
pub mod script;
pub mod types;
pub mod value;
pub mod volume;

pub use channel::{Channel, ChannelTable, CloseHook, DEFAULT_CHANNEL_LIMIT};
pub use command::{COMMAND_NAME, FilesystemCommand, execute, filesystem};
pub use env::{EnvId, Environment, EvalResult, ResultGuard, SavedResult};
pub use error::{EEXIST, ENOENT, HandlerError, HandlerResult, VfsError, VfsResult};
pub use handler::{HandlerRef, Opened, Request, VfsHandler};
pub use mount::{MountEntry, MountTable};
pub use path::{FsPath, NativeRep, SEPARATOR, normalize, split_at_mount};
pub use registry::{SharedVfs, Vfs, shared_vfs};
pub use script::ScriptHandler;
pub use types::{AccessMode, FileType, GlobTypes, S_IFDIR, S_IFMT, S_IFREG, Stat, Verb};
pub use value::{NativeValue, Value};
pub use volume::VolumeList;
