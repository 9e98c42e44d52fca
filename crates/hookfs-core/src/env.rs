//! Evaluation environments.
//!
//! An [`Environment`] is the host's script interpreter as seen from the
//! VFS: something that can evaluate a command, holds a current result,
//! and owns a table of named channels. Mount handlers are evaluated in
//! the environment that registered them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::channel::ChannelTable;
use crate::value::Value;

static NEXT_ENV: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(u64);

impl EnvId {
    /// Allocate a fresh process-unique id.
    pub fn next() -> Self {
        EnvId(NEXT_ENV.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env{}", self.0)
    }
}

/// Outcome of an evaluation: a value, or a raised error value.
pub type EvalResult = Result<Value, Value>;

/// A result slot captured by [`Environment::save_result`].
#[derive(Debug, Clone)]
pub struct SavedResult(pub EvalResult);

/// The host interpreter contract.
pub trait Environment: Send + Sync {
    /// Identity used to match mounts to their owner.
    fn id(&self) -> EnvId;

    /// True once teardown has started.
    fn is_deleted(&self) -> bool;

    /// Evaluate a script value.
    ///
    /// A `List` is a command whose first word names the routine and whose
    /// remaining words are its arguments. A `Str` is script source. A
    /// `Native` is a host callable invoked with no arguments. The outcome
    /// also becomes the current result.
    fn eval(&self, script: &Value) -> EvalResult;

    /// Current result.
    fn result(&self) -> EvalResult;

    /// Replace the current result.
    fn set_result(&self, result: EvalResult);

    /// Working directory for relative paths.
    fn cwd(&self) -> String {
        "/".to_string()
    }

    /// Channels addressable by name in this environment.
    fn channels(&self) -> &ChannelTable;

    /// Capture the current result and reset it to empty.
    fn save_result(&self) -> SavedResult {
        let saved = SavedResult(self.result());
        self.set_result(Ok(Value::empty()));
        saved
    }

    /// Put back a result captured by `save_result`.
    fn restore_result(&self, saved: SavedResult) {
        self.set_result(saved.0);
    }
}

/// Saves an environment's result and restores it on drop.
pub struct ResultGuard<'a> {
    env: &'a dyn Environment,
    saved: Option<SavedResult>,
}

impl<'a> ResultGuard<'a> {
    pub fn new(env: &'a dyn Environment) -> Self {
        let saved = env.save_result();
        Self {
            env,
            saved: Some(saved),
        }
    }

    /// Drop the saved result so whatever is current stays live.
    pub fn discard(mut self) {
        self.saved = None;
    }
}

impl Drop for ResultGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.env.restore_result(saved);
        }
    }
}
