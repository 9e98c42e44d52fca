//! Path-to-mount resolution.
//!
//! A normalized path is owned by the longest mount point that is a whole
//! component prefix of it. The search starts with the full path and walks
//! back one separator at a time. At every separator it also tries the
//! prefix that keeps the separator, which is how a volume such as
//! `ftp://` claims `ftp://host/x`. The walk stops at the first byte, so a
//! mount at `/` only owns `/` itself.

use tracing::trace;

use crate::path::{FsPath, NativeRep, SEPARATOR};
use crate::registry::Vfs;

impl Vfs {
    /// Find the mount owning `normalized`, ignoring any cache.
    pub fn resolve(&self, normalized: &str) -> Option<NativeRep> {
        let mut split = normalized.len();
        loop {
            if split == 0 {
                return None;
            }
            if let Some(handler) = self.mounts.find(&normalized[..split]) {
                return Some(NativeRep::new(split, handler));
            }

            split = normalized[..split].rfind(SEPARATOR)?;
            if split == 0 {
                return None;
            }
            if let Some(handler) = self.mounts.find(&normalized[..split + 1]) {
                return Some(NativeRep::new(split + 1, handler));
            }
        }
    }

    /// Resolve `path`, reusing its cached resolution when still current.
    ///
    /// Nothing is claimed once exit has begun.
    pub fn path_in_filesystem(&self, path: &FsPath) -> Option<NativeRep> {
        if self.is_exiting() {
            return None;
        }

        let epoch = self.epoch();
        if let Some(cached) = path.cached(epoch) {
            return cached;
        }

        let rep = self.resolve(path.normalized());
        trace!(path = %path.normalized(), owned = rep.is_some(), "resolved");
        path.store(epoch, rep.clone());
        rep
    }

    /// Description of the handler owning `path`.
    pub fn path_type(&self, path: &FsPath) -> Option<Vec<String>> {
        self.path_in_filesystem(path)
            .map(|rep| rep.handler().describe())
    }

    /// Separator used inside mounted filesystems.
    pub fn separator(&self, _path: &FsPath) -> char {
        SEPARATOR
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use crate::env::Environment;
    use crate::env::testing::MockEnv;
    use crate::handler::HandlerRef;
    use crate::registry::Vfs;
    use crate::script::ScriptHandler;

    fn handler(env: &Arc<MockEnv>, tag: &str) -> HandlerRef {
        let env: Arc<dyn Environment> = env.clone();
        Arc::new(ScriptHandler::new(&env, vec![tag.to_string()]))
    }

    fn setup(mounts: &[&str]) -> (Vfs, Arc<MockEnv>) {
        let vfs = Vfs::new();
        let env = MockEnv::new();
        vfs.register_environment(env.as_ref());
        for m in mounts {
            vfs.add_mount(m, m.ends_with(':') || m.ends_with("//"), handler(&env, m))
                .unwrap();
        }
        (vfs, env)
    }

    fn owner(vfs: &Vfs, path: &str) -> Option<(String, usize)> {
        vfs.resolve(path)
            .map(|rep| (rep.handler().describe()[0].clone(), rep.split()))
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (vfs, _env) = setup(&["/a", "/a/b"]);
        assert_eq!(owner(&vfs, "/a/b/c"), Some(("/a/b".into(), 4)));
        assert_eq!(owner(&vfs, "/a/x"), Some(("/a".into(), 2)));
        assert_eq!(owner(&vfs, "/a/b"), Some(("/a/b".into(), 4)));
        assert_eq!(owner(&vfs, "/ab"), None);
        assert_eq!(owner(&vfs, "/other"), None);
    }

    #[test]
    fn test_volume_with_trailing_separator() {
        let (vfs, _env) = setup(&["ftp://"]);
        assert_eq!(owner(&vfs, "ftp://host/x"), Some(("ftp://".into(), 6)));
        assert_eq!(owner(&vfs, "ftp://"), Some(("ftp://".into(), 6)));
    }

    #[test]
    fn test_root_mount_only_owns_root() {
        let (vfs, _env) = setup(&["/"]);
        assert!(owner(&vfs, "/").is_some());
        assert!(owner(&vfs, "/x").is_none());
    }

    #[test]
    fn test_cached_rep_goes_stale_on_mount_change() {
        let (vfs, env) = setup(&["/a"]);
        let path = vfs.make_path("/a/b/c", "/");
        assert_eq!(vfs.path_in_filesystem(&path).unwrap().split(), 2);

        vfs.add_mount("/a/b", false, handler(&env, "/a/b")).unwrap();
        assert_eq!(vfs.path_in_filesystem(&path).unwrap().split(), 4);

        vfs.remove_mount(Some("/a/b"), env.id()).unwrap();
        vfs.remove_mount(Some("/a"), env.id()).unwrap();
        assert!(vfs.path_in_filesystem(&path).is_none());
        // The cache now records the path as unowned.
        assert!(path.native_rep().is_none());
    }

    #[test]
    fn test_dup_and_free_of_cached_rep() {
        let vfs = Vfs::new();
        let env = MockEnv::new();
        vfs.register_environment(env.as_ref());
        let h = handler(&env, "m");
        vfs.add_mount("/m", false, h.clone()).unwrap();

        let path = vfs.make_path("/m/f", "/");
        vfs.path_in_filesystem(&path).unwrap();
        let base = Arc::strong_count(&h);

        let dup = path.clone();
        assert_eq!(Arc::strong_count(&h), base + 1);
        drop(dup);
        assert_eq!(Arc::strong_count(&h), base);
        drop(path);
        assert_eq!(Arc::strong_count(&h), base - 1);
    }

    #[test]
    fn test_nothing_claimed_during_exit() {
        let (vfs, _env) = setup(&["/m"]);
        let path = vfs.make_path("/m/f", "/");
        assert!(vfs.path_in_filesystem(&path).is_some());
        vfs.begin_exit();
        assert!(vfs.path_in_filesystem(&path).is_none());
        assert!(vfs.path_type(&path).is_none());
    }

    #[test]
    fn test_concurrent_resolution_is_consistent() {
        let (vfs, env) = setup(&["/a"]);
        let vfs = Arc::new(vfs);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let vfs = vfs.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let path = vfs.make_path("/a/b/c", "/");
                        let split = vfs.path_in_filesystem(&path).map(|r| r.split());
                        // Either mount may own the path, never anything else.
                        assert!(matches!(split, Some(2) | Some(4)), "{split:?}");
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            vfs.add_mount("/a/b", false, handler(&env, "/a/b")).unwrap();
            vfs.remove_mount(Some("/a/b"), env.id()).unwrap();
        }
        for r in readers {
            r.join().unwrap();
        }
    }
}
