//! Handlers implemented by script callbacks.
//!
//! A [`ScriptHandler`] is an (environment, callback prefix) pair. Every
//! operation becomes one command evaluated in that environment:
//!
//! ```text
//! <prefix...> <verb> <mount root> <relative path> <verb args...> <path>
//! ```
//!
//! The environment's current result is saved around the call and put back
//! afterwards. The exception is a failing call whose error should reach
//! the caller when the caller is the handler's own environment: then the
//! failure is left as the current result.

use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::channel::{Channel, CloseHook};
use crate::env::{EnvId, Environment, ResultGuard};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{Opened, Request, VfsHandler};
use crate::types::{AccessMode, GlobTypes, Stat, Verb};
use crate::value::Value;

/// Mount handler that evaluates a callback prefix in an environment.
pub struct ScriptHandler {
    env: Weak<dyn Environment>,
    owner: EnvId,
    prefix: Vec<String>,
}

impl std::fmt::Debug for ScriptHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHandler")
            .field("owner", &self.owner)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ScriptHandler {
    pub fn new(env: &Arc<dyn Environment>, prefix: Vec<String>) -> Self {
        Self {
            env: Arc::downgrade(env),
            owner: env.id(),
            prefix,
        }
    }

    fn env(&self) -> HandlerResult<Arc<dyn Environment>> {
        match self.env.upgrade() {
            Some(env) if !env.is_deleted() => Ok(env),
            _ => Err(HandlerError::DeadEnvironment),
        }
    }

    /// Build the command for one operation.
    fn command(&self, verb: Verb, req: &Request<'_>, args: Vec<Value>) -> Value {
        let mut words: Vec<Value> = Vec::with_capacity(self.prefix.len() + args.len() + 4);
        words.extend(self.prefix.iter().map(Value::from));
        words.push(Value::from(verb.as_ref()));
        words.push(Value::from(req.root));
        words.push(Value::from(req.relative));
        words.extend(args);
        words.push(Value::from(req.path));
        Value::List(words)
    }

    /// Evaluate one operation.
    ///
    /// `forward` marks verbs whose errors are reported back to the caller.
    fn call(
        &self,
        verb: Verb,
        req: &Request<'_>,
        args: Vec<Value>,
        forward: bool,
    ) -> HandlerResult<Value> {
        let env = self.env()?;
        let command = self.command(verb, req, args);
        debug!(verb = %verb, root = req.root, relative = req.relative, "vfs callback");

        let guard = ResultGuard::new(env.as_ref());
        match env.eval(&command) {
            Ok(value) => Ok(value),
            Err(error) => {
                if forward && req.caller == Some(self.owner) {
                    guard.discard();
                }
                Err(HandlerError::Raised(error))
            }
        }
    }

    fn close_hook(&self, env: &Arc<dyn Environment>, callback: Value) -> CloseHook {
        let record = CleanupRecord {
            env: Arc::downgrade(env),
            callback,
        };
        Box::new(move |channel: &Channel| record.run(channel))
    }
}

/// What a close callback needs at close time.
struct CleanupRecord {
    env: Weak<dyn Environment>,
    callback: Value,
}

impl CleanupRecord {
    /// Expose the channel by name, run the callback, then hide it again.
    fn run(self, channel: &Channel) {
        let Some(env) = self.env.upgrade().filter(|env| !env.is_deleted()) else {
            warn!(channel = %channel.name(), "close callback skipped: environment deleted");
            return;
        };

        let _guard = ResultGuard::new(env.as_ref());
        env.channels().register(channel);
        if let Err(error) = env.eval(&self.callback) {
            warn!(channel = %channel.name(), %error, "close callback failed");
        }
        env.channels().detach(channel.name());
    }
}

fn list(value: Value, what: &str) -> HandlerResult<Vec<Value>> {
    value
        .into_list()
        .map_err(|v| HandlerError::malformed(format!("{what} result is not a list: {v}")))
}

impl VfsHandler for ScriptHandler {
    fn owner(&self) -> EnvId {
        self.owner
    }

    fn is_alive(&self) -> bool {
        self.env().is_ok()
    }

    fn describe(&self) -> Vec<String> {
        self.prefix.clone()
    }

    fn stat(&self, req: &Request<'_>) -> HandlerResult<Stat> {
        let fields = list(self.call(Verb::Stat, req, Vec::new(), false)?, "stat")?;
        Stat::from_fields(fields).map_err(HandlerError::Malformed)
    }

    fn access(&self, req: &Request<'_>, mode: AccessMode) -> HandlerResult<()> {
        let result = self.call(Verb::Access, req, vec![Value::from(mode.bits())], false)?;
        match result.as_int() {
            Some(code) if code != 0 => Err(HandlerError::Raised(result)),
            _ => Ok(()),
        }
    }

    fn open(&self, req: &Request<'_>, mode: &str, permissions: u32) -> HandlerResult<Opened> {
        let result = self.call(
            Verb::Open,
            req,
            vec![Value::from(mode), Value::from(permissions)],
            true,
        )?;
        let env = self.env()?;
        let items = list(result, "open")?;

        if items.is_empty() || items.len() > 2 {
            // Reclaim a channel the callback created before handing back
            // a bad result.
            let orphan = items
                .first()
                .and_then(|n| env.channels().detach(&n.to_string()));
            if let Some(orphan) = orphan {
                warn!(channel = %orphan.name(), "closing channel from malformed open result");
                let _ = orphan.close();
            }
            return Err(HandlerError::malformed(format!(
                "open must return a channel and an optional close callback, got {} elements",
                items.len()
            )));
        }

        let name = items[0].to_string();
        let channel = env.channels().detach(&name).ok_or_else(|| {
            HandlerError::malformed(format!("can not find channel named \"{name}\""))
        })?;

        let opened = Opened::new(channel);
        Ok(match items.get(1) {
            Some(callback) if !callback.is_empty() => {
                let hook = self.close_hook(&env, callback.clone());
                opened.with_close_hook(hook)
            }
            _ => opened,
        })
    }

    fn match_in_directory(
        &self,
        req: &Request<'_>,
        pattern: &str,
        types: GlobTypes,
    ) -> HandlerResult<Vec<String>> {
        let result = self.call(
            Verb::MatchInDirectory,
            req,
            vec![Value::from(pattern), Value::from(types.bits())],
            true,
        )?;
        Ok(list(result, "matchindirectory")?
            .iter()
            .map(Value::to_string)
            .collect())
    }

    fn delete_file(&self, req: &Request<'_>) -> HandlerResult<()> {
        self.call(Verb::DeleteFile, req, Vec::new(), false).map(drop)
    }

    fn create_directory(&self, req: &Request<'_>) -> HandlerResult<()> {
        self.call(Verb::CreateDirectory, req, Vec::new(), false).map(drop)
    }

    fn remove_directory(&self, req: &Request<'_>, recursive: bool) -> HandlerResult<()> {
        let flag = Value::Int(i64::from(recursive));
        self.call(Verb::RemoveDirectory, req, vec![flag], false).map(drop)
    }

    fn attribute_names(&self, req: &Request<'_>) -> HandlerResult<Vec<String>> {
        let result = self.call(Verb::FileAttributes, req, Vec::new(), false)?;
        Ok(list(result, "fileattributes")?
            .iter()
            .map(Value::to_string)
            .collect())
    }

    fn attribute_get(&self, req: &Request<'_>, index: usize) -> HandlerResult<Value> {
        self.call(Verb::FileAttributes, req, vec![Value::from(index)], true)
    }

    fn attribute_set(&self, req: &Request<'_>, index: usize, value: &Value) -> HandlerResult<()> {
        self.call(
            Verb::FileAttributes,
            req,
            vec![Value::from(index), value.clone()],
            true,
        )
        .map(drop)
    }

    fn utime(&self, req: &Request<'_>, atime: i64, mtime: i64) -> HandlerResult<()> {
        self.call(
            Verb::Utime,
            req,
            vec![Value::Int(atime), Value::Int(mtime)],
            false,
        )
        .map(drop)
    }
}
