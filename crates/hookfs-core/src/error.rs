//! VFS error types.

use std::io;
use thiserror::Error;

use crate::value::Value;

/// No such file or directory.
pub const ENOENT: i32 = 2;
/// File exists (also reported for non-empty directories).
pub const EEXIST: i32 = 17;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No mount owns the path (or its environment is gone).
    #[error("no such file or directory: {0}")]
    NotOwned(String),

    /// The handler reported that the entry does not exist.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The handler refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Error text raised by a handler, forwarded verbatim.
    #[error("{message}")]
    Handler { path: String, message: String },

    /// A numeric error code raised by an open callback.
    #[error("couldn't open \"{path}\": {}", posix_message(.code))]
    Posix { path: String, code: i32 },

    /// The handler returned something that could not be decoded.
    #[error("malformed result from handler for {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// Directory removal failed; the path is the offending entry.
    #[error("error deleting \"{0}\": directory not empty")]
    DirectoryNotEmpty(String),

    /// No mount registered at the given point.
    #[error("no such mount \"{0}\"")]
    NoSuchMount(String),

    /// A mount with the same prefix is already registered.
    #[error("mount point already exists \"{0}\"")]
    MountExists(String),

    /// The environment was never registered for VFS use.
    #[error("environment {0} is not registered for vfs use")]
    NotRegistered(u64),

    /// Wrong argument count for a command.
    #[error("wrong # args: should be \"{0}\"")]
    Usage(String),

    /// Unknown option or subcommand.
    #[error("bad option \"{given}\": must be {expected}")]
    BadOption { given: String, expected: String },

    /// Malformed command argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Channel name is not registered in the environment.
    #[error("can not find channel named \"{0}\"")]
    UnknownChannel(String),

    /// Channel has already been closed.
    #[error("channel \"{0}\" is closed")]
    ChannelClosed(String),

    /// A write would grow a channel past its size limit.
    #[error("channel \"{name}\" would exceed {limit} bytes")]
    ChannelLimit { name: String, limit: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn posix_message(code: &i32) -> String {
    let text = io::Error::from_raw_os_error(*code).to_string();
    // Strip the " (os error N)" suffix std appends.
    match text.rfind(" (os error") {
        Some(idx) => text[..idx].to_lowercase(),
        None => text.to_lowercase(),
    }
}

impl VfsError {
    /// Create a NotOwned error.
    pub fn not_owned(path: impl Into<String>) -> Self {
        Self::NotOwned(path.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a Malformed error.
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a NoSuchMount error.
    pub fn no_such_mount(path: impl Into<String>) -> Self {
        Self::NoSuchMount(path.into())
    }

    /// Create a Usage error.
    pub fn usage(usage: impl Into<String>) -> Self {
        Self::Usage(usage.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// The system error code a host should set alongside this error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::NotOwned(_) | Self::NotFound(_) => Some(ENOENT),
            Self::DirectoryNotEmpty(_) => Some(EEXIST),
            Self::Posix { code, .. } => Some(*code),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotOwned(msg) | VfsError::NotFound(msg) => {
                io::Error::new(io::ErrorKind::NotFound, msg)
            }
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::Posix { code, .. } => io::Error::from_raw_os_error(code),
            invalid @ (VfsError::Usage(_)
            | VfsError::BadOption { .. }
            | VfsError::InvalidArgument(_)) => {
                io::Error::new(io::ErrorKind::InvalidInput, invalid.to_string())
            }
            VfsError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

/// Failure at the handler boundary, before verb-specific mapping.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The handler raised an error; carries the raised value.
    #[error("{0}")]
    Raised(Value),

    /// The handler completed but its result has the wrong shape.
    #[error("{0}")]
    Malformed(String),

    /// The handler's evaluation environment has been torn down.
    #[error("evaluation environment has been deleted")]
    DeadEnvironment,
}

impl HandlerError {
    /// Create a Malformed error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    /// Map to the generic VfsError for `path`, forwarding raised text.
    pub fn into_vfs(self, path: &str) -> VfsError {
        match self {
            Self::Raised(value) => VfsError::Handler {
                path: path.to_string(),
                message: value.to_string(),
            },
            Self::Malformed(reason) => VfsError::malformed(path, reason),
            Self::DeadEnvironment => VfsError::not_owned(path),
        }
    }
}

/// Handler result type.
pub type HandlerResult<T> = Result<T, HandlerError>;
