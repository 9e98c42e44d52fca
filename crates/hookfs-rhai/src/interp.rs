//! Rhai evaluation environment.
//!
//! A [`RhaiInterp`] is one script interpreter: an engine with the host
//! commands registered, the functions scripts have defined so far, a
//! top-level scope, a result slot, named channels and global variables.
//! It is registered with a [`Vfs`] on creation and drains its mounts and
//! channels when deleted or dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hookfs_core::{
    ChannelTable, DEFAULT_CHANNEL_LIMIT, EnvId, Environment, EvalResult, SharedVfs, Value,
};
use parking_lot::{Mutex, RwLock};
use rhai::{AST, Dynamic, Engine, FnPtr, Scope};
use tracing::{debug, info, warn};

use crate::commands;
use crate::config::EngineLimits;
use crate::convert::{error_value, to_dynamic, to_value};

/// A Rhai interpreter usable as a VFS environment.
pub struct RhaiInterp {
    id: EnvId,
    vfs: SharedVfs,
    engine: Engine,
    /// Functions defined by every script evaluated so far.
    lib: RwLock<AST>,
    /// Top-level variables, persisted across `run` calls.
    scope: Mutex<Scope<'static>>,
    result: Mutex<EvalResult>,
    channels: ChannelTable,
    /// Size cap for channels this interpreter creates.
    channel_limit: usize,
    globals: RwLock<BTreeMap<String, Dynamic>>,
    cwd: RwLock<String>,
    closing: AtomicBool,
    deleted: AtomicBool,
}

impl std::fmt::Debug for RhaiInterp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiInterp")
            .field("id", &self.id)
            .field("cwd", &*self.cwd.read())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

impl RhaiInterp {
    /// Create an interpreter registered with `vfs`.
    pub fn new(vfs: SharedVfs, limits: &EngineLimits) -> Arc<Self> {
        let interp = Arc::new_cyclic(|weak| {
            let mut engine = Engine::new();
            limits.apply(&mut engine);
            commands::register(&mut engine, weak.clone());
            RhaiInterp {
                id: EnvId::next(),
                vfs: vfs.clone(),
                engine,
                lib: RwLock::new(AST::empty()),
                scope: Mutex::new(Scope::new()),
                result: Mutex::new(Ok(Value::empty())),
                channels: ChannelTable::new(),
                channel_limit: match limits.max_string_size {
                    0 => DEFAULT_CHANNEL_LIMIT,
                    n => n,
                },
                globals: RwLock::new(BTreeMap::new()),
                cwd: RwLock::new("/".to_string()),
                closing: AtomicBool::new(false),
                deleted: AtomicBool::new(false),
            }
        });
        vfs.register_environment(interp.as_ref());
        debug!(env = %interp.id, "interpreter created");
        interp
    }

    pub fn vfs(&self) -> &SharedVfs {
        &self.vfs
    }

    pub fn channel_limit(&self) -> usize {
        self.channel_limit
    }

    /// Set the working directory, normalized against the current one.
    pub fn set_cwd(&self, dir: &str) {
        let normalized = self.vfs.normalize(dir, &self.cwd());
        *self.cwd.write() = normalized;
    }

    /// Evaluate a script at top level.
    ///
    /// Top-level variables persist between calls and functions the script
    /// defines become callable from mount callbacks.
    pub fn run(&self, script: &str) -> EvalResult {
        if self.is_deleted() {
            return Err(Value::from("interpreter has been deleted"));
        }
        let mut scope = std::mem::take(&mut *self.scope.lock());
        let outcome = self.eval_source(script, &mut scope);
        *self.scope.lock() = scope;
        self.set_result(outcome.clone());
        outcome
    }

    fn eval_source(&self, source: &str, scope: &mut Scope<'static>) -> EvalResult {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| Value::from(e.to_string()))?;
        self.lib.write().combine(ast.clone_functions_only());
        let program = self.lib.read().merge(&ast);
        self.engine
            .eval_ast_with_scope::<Dynamic>(scope, &program)
            .map(to_value)
            .map_err(error_value)
    }

    /// Call a function (script-defined or host) by name.
    fn call_command(&self, words: &[Value]) -> EvalResult {
        let Some((name, args)) = words.split_first() else {
            return Ok(Value::empty());
        };
        let f = FnPtr::new(name.to_string()).map_err(error_value)?;
        let args: Vec<Dynamic> = args.iter().map(to_dynamic).collect();
        self.call_fn_ptr(&f, args)
    }

    fn call_fn_ptr(&self, f: &FnPtr, args: Vec<Dynamic>) -> EvalResult {
        let lib = self.lib.read().clone();
        f.call::<Dynamic>(&self.engine, &lib, args)
            .map(to_value)
            .map_err(error_value)
    }

    pub fn global_get(&self, name: &str) -> Option<Dynamic> {
        self.globals.read().get(name).cloned()
    }

    pub fn global_set(&self, name: &str, value: Dynamic) {
        self.globals.write().insert(name.to_string(), value);
    }

    pub fn global_unset(&self, name: &str) -> bool {
        self.globals.write().remove(name).is_some()
    }

    /// Global names starting with `prefix`, sorted.
    pub fn global_names(&self, prefix: &str) -> Vec<String> {
        self.globals
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Tear down: close channels, then drop every mount this interpreter
    /// owns. Idempotent.
    pub fn delete(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        for channel in self.channels.drain() {
            if let Err(e) = channel.close() {
                warn!(channel = %channel.name(), error = %e, "close during teardown failed");
            }
        }
        self.deleted.store(true, Ordering::Release);
        let removed = self.vfs.unregister_environment(self.id);
        info!(env = %self.id, removed, "interpreter deleted");
    }
}

impl Drop for RhaiInterp {
    fn drop(&mut self) {
        self.delete();
    }
}

impl Environment for RhaiInterp {
    fn id(&self) -> EnvId {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn eval(&self, script: &Value) -> EvalResult {
        if self.is_deleted() {
            return Err(Value::from("interpreter has been deleted"));
        }
        let outcome = match script {
            Value::List(words) => self.call_command(words),
            Value::Native(native) => match native.downcast_ref::<FnPtr>() {
                Some(f) => self.call_fn_ptr(f, Vec::new()),
                None => Err(Value::from(format!(
                    "cannot evaluate native value of type {}",
                    native.type_name()
                ))),
            },
            other => self.eval_source(&other.to_string(), &mut Scope::new()),
        };
        self.set_result(outcome.clone());
        outcome
    }

    fn result(&self) -> EvalResult {
        self.result.lock().clone()
    }

    fn set_result(&self, result: EvalResult) {
        *self.result.lock() = result;
    }

    fn cwd(&self) -> String {
        self.cwd.read().clone()
    }

    fn channels(&self) -> &ChannelTable {
        &self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookfs_core::{Channel, shared_vfs};

    fn interp() -> Arc<RhaiInterp> {
        RhaiInterp::new(shared_vfs(), &EngineLimits::default())
    }

    #[test]
    fn test_basic_execution() {
        let interp = interp();
        assert_eq!(interp.run("40 + 2").unwrap(), Value::Int(42));
        assert_eq!(interp.result().unwrap(), Value::Int(42));
    }

    #[test]
    fn test_scope_persists() {
        let interp = interp();
        interp.run("let x = 40;").unwrap();
        assert_eq!(interp.run("x + 2").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_functions_callable_as_commands() {
        let interp = interp();
        interp.run(r#"fn greet(who) { "hello " + who }"#).unwrap();
        let out = interp.eval(&Value::list(["greet", "vfs"])).unwrap();
        assert_eq!(out, Value::from("hello vfs"));
        // Host functions resolve too.
        let out = interp.eval(&Value::list(["file_separator", "/x"])).unwrap();
        assert_eq!(out, Value::from("/"));
    }

    #[test]
    fn test_thrown_value_preserved() {
        let interp = interp();
        interp.run("fn fail(code) { throw code; }").unwrap();
        let err = interp
            .eval(&Value::list([Value::from("fail"), Value::Int(13)]))
            .unwrap_err();
        assert_eq!(err.as_int(), Some(13));
        assert_eq!(interp.result().unwrap_err().as_int(), Some(13));
    }

    #[test]
    fn test_closure_eval() {
        let interp = interp();
        let f = interp.run("let n = 5; || n * 3").unwrap();
        assert!(matches!(f, Value::Native(_)));
        assert_eq!(interp.eval(&f).unwrap(), Value::Int(15));
    }

    #[test]
    fn test_safety_limits() {
        let interp = interp();
        let err = interp.run("let x = 0; loop { x += 1; }").unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("operations") || msg.contains("limit") || msg.contains("exceeded"),
            "Expected resource limit error, got: {msg}"
        );
    }

    #[test]
    fn test_channel_writes_capped_by_string_limit() {
        let limits = EngineLimits {
            max_string_size: 16,
            ..Default::default()
        };
        let interp = RhaiInterp::new(shared_vfs(), &limits);
        assert_eq!(interp.channel_limit(), 16);
        let err = interp
            .run(
                r#"
                let c = chan_memory();
                chan_seek(c, 9223372036854775807);
                chan_write(c, "x")
                "#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("would exceed 16 bytes"), "{err}");

        let written = interp
            .run(r#"let d = chan_memory(); chan_write(d, "ok")"#)
            .unwrap();
        assert_eq!(written, Value::Int(2));
    }

    #[test]
    fn test_globals() {
        let interp = interp();
        interp.global_set("mf:a", Dynamic::from(1_i64));
        interp.global_set("mf:b", Dynamic::from(2_i64));
        interp.global_set("other", Dynamic::from(3_i64));
        assert_eq!(interp.global_names("mf:"), vec!["mf:a", "mf:b"]);
        assert!(interp.global_unset("mf:a"));
        assert!(interp.global_get("mf:a").is_none());
    }

    #[test]
    fn test_delete_closes_channels_and_unregisters() {
        let vfs = shared_vfs();
        let interp = RhaiInterp::new(vfs.clone(), &EngineLimits::default());
        let chan = Channel::memory("x");
        interp.channels().register(&chan);
        assert!(vfs.is_registered(interp.id()));

        interp.delete();
        assert!(chan.is_closed());
        assert!(interp.is_deleted());
        assert!(!vfs.is_registered(interp.id()));
        assert!(interp.run("1").is_err());
        interp.delete();
    }

    #[test]
    fn test_cwd() {
        let interp = interp();
        interp.set_cwd("/tmp/work");
        interp.set_cwd("../other");
        assert_eq!(interp.cwd(), "/tmp/other");
    }
}
