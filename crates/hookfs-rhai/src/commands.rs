//! Host functions registered on every interpreter.
//!
//! `file_*` functions route through the VFS dispatcher exactly as a host
//! filesystem layer would; channels they open are registered by name in
//! the calling interpreter. `chan_*` functions operate on those names.
//! `global_*` functions give scripts process-lifetime variables, which
//! mount callbacks need because Rhai functions cannot see outer scope.

use std::sync::{Arc, Weak};

use hookfs_core::{
    AccessMode, COMMAND_NAME, Channel, Environment, FileType, FsPath, GlobTypes, Stat, Value,
    VfsError,
};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map};
use tracing::{debug, info, warn};

use crate::convert::{to_dynamic, to_value};
use crate::pattern::glob_match;
use crate::interp::RhaiInterp;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Default permissions for newly created files.
const DEFAULT_PERMISSIONS: i64 = 0o666;

fn vfs_err(e: VfsError) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// Weak handle to the interpreter the functions are registered on.
#[derive(Clone)]
struct Host(Weak<RhaiInterp>);

impl Host {
    fn interp(&self) -> RhaiResult<Arc<RhaiInterp>> {
        self.0
            .upgrade()
            .filter(|interp| !interp.is_deleted())
            .ok_or_else(|| "interpreter has been deleted".into())
    }
}

fn make_path(interp: &RhaiInterp, raw: &str) -> FsPath {
    interp.vfs().make_path(raw, &interp.cwd())
}

fn channel(interp: &RhaiInterp, name: &str) -> RhaiResult<Channel> {
    interp
        .channels()
        .get(name)
        .ok_or_else(|| vfs_err(VfsError::UnknownChannel(name.to_string())))
}

fn to_u32(what: &str, n: i64) -> RhaiResult<u32> {
    u32::try_from(n).map_err(|_| format!("invalid {what} {n}").into())
}

pub fn register(engine: &mut Engine, interp: Weak<RhaiInterp>) {
    let host = Host(interp);
    register_filesystem(engine, &host);
    register_file_functions(engine, &host);
    register_channel_functions(engine, &host);
    register_global_functions(engine, &host);
    register_utility_functions(engine);
}

// ============================================================================
// vfs_filesystem
// ============================================================================

fn filesystem(interp: &Arc<RhaiInterp>, args: &[Dynamic]) -> RhaiResult<Dynamic> {
    let env: Arc<dyn Environment> = interp.clone();
    let args: Vec<Value> = args.iter().cloned().map(to_value).collect();
    hookfs_core::filesystem(interp.vfs(), &env, &args)
        .map(|v| to_dynamic(&v))
        .map_err(vfs_err)
}

fn register_filesystem(engine: &mut Engine, host: &Host) {
    let h1 = host.clone();
    let h2 = host.clone();
    let h3 = host.clone();
    let h4 = host.clone();

    engine.register_fn(COMMAND_NAME, move |a: Dynamic| -> RhaiResult<Dynamic> {
        filesystem(&h1.interp()?, &[a])
    });
    engine.register_fn(
        COMMAND_NAME,
        move |a: Dynamic, b: Dynamic| -> RhaiResult<Dynamic> {
            filesystem(&h2.interp()?, &[a, b])
        },
    );
    engine.register_fn(
        COMMAND_NAME,
        move |a: Dynamic, b: Dynamic, c: Dynamic| -> RhaiResult<Dynamic> {
            filesystem(&h3.interp()?, &[a, b, c])
        },
    );
    engine.register_fn(
        COMMAND_NAME,
        move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| -> RhaiResult<Dynamic> {
            filesystem(&h4.interp()?, &[a, b, c, d])
        },
    );
}

// ============================================================================
// file_*
// ============================================================================

fn stat_map(stat: &Stat) -> Map {
    let mut map = Map::new();
    map.insert("dev".into(), Dynamic::from(stat.dev as i64));
    map.insert("ino".into(), Dynamic::from(stat.ino as i64));
    map.insert("mode".into(), Dynamic::from(i64::from(stat.mode)));
    map.insert("nlink".into(), Dynamic::from(stat.nlink as i64));
    map.insert("uid".into(), Dynamic::from(i64::from(stat.uid)));
    map.insert("gid".into(), Dynamic::from(i64::from(stat.gid)));
    map.insert("size".into(), Dynamic::from(stat.size as i64));
    map.insert("atime".into(), Dynamic::from(stat.atime));
    map.insert("mtime".into(), Dynamic::from(stat.mtime));
    map.insert("ctime".into(), Dynamic::from(stat.ctime));
    let kind = match stat.file_type() {
        Some(FileType::Directory) => "directory",
        Some(FileType::File) => "file",
        None => "unknown",
    };
    map.insert("type".into(), Dynamic::from(kind.to_string()));
    map
}

fn open(interp: &RhaiInterp, raw: &str, mode: &str, permissions: i64) -> RhaiResult<String> {
    let path = make_path(interp, raw);
    let permissions = to_u32("permissions", permissions)?;
    let chan = interp
        .vfs()
        .open(&path, mode, permissions, Some(interp.id()))
        .map_err(vfs_err)?;
    interp.channels().register(&chan);
    debug!(path = raw, channel = %chan.name(), "file_open");
    Ok(chan.name().to_string())
}

fn glob(interp: &RhaiInterp, dir: &str, pattern: &str, types: i64) -> RhaiResult<Array> {
    let path = make_path(interp, dir);
    let types = GlobTypes::from_bits_truncate(to_u32("types", types)?);
    let mut matches = Vec::new();
    interp
        .vfs()
        .match_in_directory(&path, pattern, types, &mut matches, Some(interp.id()))
        .map_err(vfs_err)?;
    Ok(matches.into_iter().map(Dynamic::from).collect())
}

fn delete(interp: &RhaiInterp, raw: &str, force: bool) -> RhaiResult<()> {
    let path = make_path(interp, raw);
    let vfs = interp.vfs();
    let result = match vfs.stat(&path) {
        Ok(stat) if stat.is_dir() => vfs.remove_directory(&path, force),
        _ => vfs.delete_file(&path),
    };
    result.map_err(vfs_err)
}

fn mkdir(interp: &RhaiInterp, raw: &str, parents: bool) -> RhaiResult<()> {
    let vfs = interp.vfs();
    let path = make_path(interp, raw);
    if !parents {
        return vfs.create_directory(&path).map_err(vfs_err);
    }

    let normalized = path.normalized();
    let mut ends: Vec<usize> = normalized
        .match_indices('/')
        .map(|(i, _)| i)
        .filter(|&i| i > 0)
        .collect();
    ends.push(normalized.len());

    for end in ends {
        let ancestor = FsPath::new(&normalized[..end], &normalized[..end]);
        if vfs.path_in_filesystem(&ancestor).is_none() {
            continue;
        }
        match vfs.stat(&ancestor) {
            Ok(stat) if stat.is_dir() => {}
            Ok(_) => {
                return Err(format!(
                    "can't create directory \"{}\": file already exists",
                    ancestor.raw()
                )
                .into());
            }
            Err(_) => vfs.create_directory(&ancestor).map_err(vfs_err)?,
        }
    }
    Ok(())
}

fn attribute_index(names: &[String], name: &str) -> RhaiResult<usize> {
    names.iter().position(|n| n == name).ok_or_else(|| {
        let expected = match names {
            [] => "none".to_string(),
            [only] => only.clone(),
            [init @ .., last] => format!("{}, or {last}", init.join(", ")),
        };
        vfs_err(VfsError::BadOption {
            given: name.to_string(),
            expected,
        })
    })
}

fn attributes(interp: &RhaiInterp, raw: &str) -> RhaiResult<Map> {
    let path = make_path(interp, raw);
    let vfs = interp.vfs();
    let names = vfs.file_attribute_names(&path).map_err(vfs_err)?;
    let mut map = Map::new();
    for (index, name) in names.iter().enumerate() {
        let value = vfs
            .file_attribute_get(&path, index, Some(interp.id()))
            .map_err(vfs_err)?;
        map.insert(name.as_str().into(), to_dynamic(&value));
    }
    Ok(map)
}

fn attribute_get(interp: &RhaiInterp, raw: &str, name: &str) -> RhaiResult<Dynamic> {
    let path = make_path(interp, raw);
    let vfs = interp.vfs();
    let names = vfs.file_attribute_names(&path).map_err(vfs_err)?;
    let index = attribute_index(&names, name)?;
    vfs.file_attribute_get(&path, index, Some(interp.id()))
        .map(|v| to_dynamic(&v))
        .map_err(vfs_err)
}

fn attribute_set(interp: &RhaiInterp, raw: &str, name: &str, value: Dynamic) -> RhaiResult<()> {
    let path = make_path(interp, raw);
    let vfs = interp.vfs();
    let names = vfs.file_attribute_names(&path).map_err(vfs_err)?;
    let index = attribute_index(&names, name)?;
    vfs.file_attribute_set(&path, index, &to_value(value), Some(interp.id()))
        .map_err(vfs_err)
}

fn register_file_functions(engine: &mut Engine, host: &Host) {
    let h_stat = host.clone();
    let h_exists = host.clone();
    let h_access = host.clone();
    let h_isdir = host.clone();
    let h_isfile = host.clone();
    let h_open2 = host.clone();
    let h_open3 = host.clone();
    let h_glob2 = host.clone();
    let h_glob3 = host.clone();
    let h_delete1 = host.clone();
    let h_delete2 = host.clone();
    let h_mkdir1 = host.clone();
    let h_mkdir2 = host.clone();
    let h_rmdir1 = host.clone();
    let h_rmdir2 = host.clone();
    let h_attrs = host.clone();
    let h_attr_get = host.clone();
    let h_attr_set = host.clone();
    let h_utime = host.clone();
    let h_volumes = host.clone();
    let h_system = host.clone();
    let h_separator = host.clone();
    let h_normalize = host.clone();

    // file_stat(path) -> Map
    engine.register_fn("file_stat", move |path: &str| -> RhaiResult<Map> {
        let interp = h_stat.interp()?;
        let stat = interp
            .vfs()
            .stat(&make_path(&interp, path))
            .map_err(vfs_err)?;
        Ok(stat_map(&stat))
    });

    // file_exists(path) -> bool
    engine.register_fn("file_exists", move |path: &str| -> RhaiResult<bool> {
        let interp = h_exists.interp()?;
        Ok(interp
            .vfs()
            .access(&make_path(&interp, path), AccessMode::empty())
            .is_ok())
    });

    // file_access(path, mode) -> bool
    engine.register_fn(
        "file_access",
        move |path: &str, mode: i64| -> RhaiResult<bool> {
            let interp = h_access.interp()?;
            let mode = AccessMode::from_bits_truncate(to_u32("access mode", mode)?);
            Ok(interp
                .vfs()
                .access(&make_path(&interp, path), mode)
                .is_ok())
        },
    );

    // file_isdir(path) -> bool
    engine.register_fn("file_isdir", move |path: &str| -> RhaiResult<bool> {
        let interp = h_isdir.interp()?;
        Ok(interp
            .vfs()
            .stat(&make_path(&interp, path))
            .is_ok_and(|s| s.is_dir()))
    });

    // file_isfile(path) -> bool
    engine.register_fn("file_isfile", move |path: &str| -> RhaiResult<bool> {
        let interp = h_isfile.interp()?;
        Ok(interp
            .vfs()
            .stat(&make_path(&interp, path))
            .is_ok_and(|s| s.is_file()))
    });

    // file_open(path, mode [, permissions]) -> channel name
    engine.register_fn(
        "file_open",
        move |path: &str, mode: &str| -> RhaiResult<String> {
            open(&*h_open2.interp()?, path, mode, DEFAULT_PERMISSIONS)
        },
    );
    engine.register_fn(
        "file_open",
        move |path: &str, mode: &str, permissions: i64| -> RhaiResult<String> {
            open(&*h_open3.interp()?, path, mode, permissions)
        },
    );

    // glob(dir, pattern [, types]) -> Array
    engine.register_fn("glob", move |dir: &str, pattern: &str| -> RhaiResult<Array> {
        glob(&*h_glob2.interp()?, dir, pattern, 0)
    });
    engine.register_fn(
        "glob",
        move |dir: &str, pattern: &str, types: i64| -> RhaiResult<Array> {
            glob(&*h_glob3.interp()?, dir, pattern, types)
        },
    );

    // file_delete(path [, force])
    engine.register_fn("file_delete", move |path: &str| -> RhaiResult<()> {
        delete(&*h_delete1.interp()?, path, false)
    });
    engine.register_fn(
        "file_delete",
        move |path: &str, force: bool| -> RhaiResult<()> {
            delete(&*h_delete2.interp()?, path, force)
        },
    );

    // file_mkdir(path [, parents])
    engine.register_fn("file_mkdir", move |path: &str| -> RhaiResult<()> {
        mkdir(&*h_mkdir1.interp()?, path, false)
    });
    engine.register_fn(
        "file_mkdir",
        move |path: &str, parents: bool| -> RhaiResult<()> {
            mkdir(&*h_mkdir2.interp()?, path, parents)
        },
    );

    // file_rmdir(path [, recursive])
    engine.register_fn("file_rmdir", move |path: &str| -> RhaiResult<()> {
        let interp = h_rmdir1.interp()?;
        interp
            .vfs()
            .remove_directory(&make_path(&interp, path), false)
            .map_err(vfs_err)
    });
    engine.register_fn(
        "file_rmdir",
        move |path: &str, recursive: bool| -> RhaiResult<()> {
            let interp = h_rmdir2.interp()?;
            interp
                .vfs()
                .remove_directory(&make_path(&interp, path), recursive)
                .map_err(vfs_err)
        },
    );

    // file_attributes(path) -> Map of every attribute
    engine.register_fn("file_attributes", move |path: &str| -> RhaiResult<Map> {
        attributes(&*h_attrs.interp()?, path)
    });

    // file_attr(path, name) / file_attr(path, name, value)
    engine.register_fn(
        "file_attr",
        move |path: &str, name: &str| -> RhaiResult<Dynamic> {
            attribute_get(&*h_attr_get.interp()?, path, name)
        },
    );
    engine.register_fn(
        "file_attr",
        move |path: &str, name: &str, value: Dynamic| -> RhaiResult<()> {
            attribute_set(&*h_attr_set.interp()?, path, name, value)
        },
    );

    // file_utime(path, atime, mtime)
    engine.register_fn(
        "file_utime",
        move |path: &str, atime: i64, mtime: i64| -> RhaiResult<()> {
            let interp = h_utime.interp()?;
            interp
                .vfs()
                .utime(&make_path(&interp, path), atime, mtime)
                .map_err(vfs_err)
        },
    );

    // file_volumes() -> Array
    engine.register_fn("file_volumes", move || -> RhaiResult<Array> {
        let interp = h_volumes.interp()?;
        Ok(interp
            .vfs()
            .list_volumes()
            .map(|v| v.iter().cloned().map(Dynamic::from).collect())
            .unwrap_or_default())
    });

    // file_system(path) -> Array (mount callback, or ["native"])
    engine.register_fn("file_system", move |path: &str| -> RhaiResult<Array> {
        let interp = h_system.interp()?;
        let words = interp
            .vfs()
            .path_type(&make_path(&interp, path))
            .unwrap_or_else(|| vec!["native".to_string()]);
        Ok(words.into_iter().map(Dynamic::from).collect())
    });

    // file_separator(path) -> String
    engine.register_fn("file_separator", move |path: &str| -> RhaiResult<String> {
        let interp = h_separator.interp()?;
        let path = make_path(&interp, path);
        Ok(interp.vfs().separator(&path).to_string())
    });

    // file_normalize(path) -> String
    engine.register_fn("file_normalize", move |path: &str| -> RhaiResult<String> {
        let interp = h_normalize.interp()?;
        Ok(interp.vfs().normalize(path, &interp.cwd()))
    });
}

// ============================================================================
// chan_*
// ============================================================================

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

fn register_channel_functions(engine: &mut Engine, host: &Host) {
    let h_memory0 = host.clone();
    let h_memory1 = host.clone();
    let h_read1 = host.clone();
    let h_read2 = host.clone();
    let h_write = host.clone();
    let h_seek = host.clone();
    let h_contents = host.clone();
    let h_close = host.clone();
    let h_names = host.clone();

    // chan_memory([data]) -> channel name
    engine.register_fn("chan_memory", move || -> RhaiResult<String> {
        let interp = h_memory0.interp()?;
        let chan = Channel::memory_with_limit(Vec::<u8>::new(), interp.channel_limit());
        interp.channels().register(&chan);
        Ok(chan.name().to_string())
    });
    engine.register_fn("chan_memory", move |data: &str| -> RhaiResult<String> {
        let interp = h_memory1.interp()?;
        let chan = Channel::memory_with_limit(data.as_bytes(), interp.channel_limit());
        interp.channels().register(&chan);
        Ok(chan.name().to_string())
    });

    // chan_read(name [, max]) -> String
    engine.register_fn("chan_read", move |name: &str| -> RhaiResult<String> {
        let interp = h_read1.interp()?;
        let bytes = channel(&interp, name)?.read_to_end().map_err(vfs_err)?;
        Ok(text(bytes))
    });
    engine.register_fn(
        "chan_read",
        move |name: &str, max: i64| -> RhaiResult<String> {
            let interp = h_read2.interp()?;
            let max = usize::try_from(max).map_err(|_| format!("invalid count {max}"))?;
            let bytes = channel(&interp, name)?.read(max).map_err(vfs_err)?;
            Ok(text(bytes))
        },
    );

    // chan_write(name, data) -> bytes written
    engine.register_fn(
        "chan_write",
        move |name: &str, data: &str| -> RhaiResult<i64> {
            let interp = h_write.interp()?;
            let n = channel(&interp, name)?
                .write(data.as_bytes())
                .map_err(vfs_err)?;
            Ok(n as i64)
        },
    );

    // chan_seek(name, pos)
    engine.register_fn("chan_seek", move |name: &str, pos: i64| -> RhaiResult<()> {
        let interp = h_seek.interp()?;
        let pos = usize::try_from(pos).map_err(|_| format!("invalid offset {pos}"))?;
        channel(&interp, name)?.seek(pos).map_err(vfs_err)
    });

    // chan_contents(name) -> String, regardless of position
    engine.register_fn("chan_contents", move |name: &str| -> RhaiResult<String> {
        let interp = h_contents.interp()?;
        let bytes = channel(&interp, name)?.contents().map_err(vfs_err)?;
        Ok(text(bytes))
    });

    // chan_close(name)
    engine.register_fn("chan_close", move |name: &str| -> RhaiResult<()> {
        let interp = h_close.interp()?;
        let chan = interp
            .channels()
            .detach(name)
            .ok_or_else(|| vfs_err(VfsError::UnknownChannel(name.to_string())))?;
        chan.close().map_err(vfs_err)
    });

    // chan_names() -> Array
    engine.register_fn("chan_names", move || -> RhaiResult<Array> {
        let interp = h_names.interp()?;
        Ok(interp
            .channels()
            .names()
            .into_iter()
            .map(Dynamic::from)
            .collect())
    });
}

// ============================================================================
// global_*
// ============================================================================

fn register_global_functions(engine: &mut Engine, host: &Host) {
    let h_get = host.clone();
    let h_set = host.clone();
    let h_unset = host.clone();
    let h_exists = host.clone();
    let h_names = host.clone();

    // global_get(name) -> value, or () when unset
    engine.register_fn("global_get", move |name: &str| -> RhaiResult<Dynamic> {
        Ok(h_get.interp()?.global_get(name).unwrap_or(Dynamic::UNIT))
    });

    engine.register_fn(
        "global_set",
        move |name: &str, value: Dynamic| -> RhaiResult<()> {
            h_set.interp()?.global_set(name, value);
            Ok(())
        },
    );

    engine.register_fn("global_unset", move |name: &str| -> RhaiResult<bool> {
        Ok(h_unset.interp()?.global_unset(name))
    });

    engine.register_fn("global_exists", move |name: &str| -> RhaiResult<bool> {
        Ok(h_exists.interp()?.global_get(name).is_some())
    });

    // global_names(prefix) -> sorted Array
    engine.register_fn("global_names", move |prefix: &str| -> RhaiResult<Array> {
        Ok(h_names
            .interp()?
            .global_names(prefix)
            .into_iter()
            .map(Dynamic::from)
            .collect())
    });
}

// ============================================================================
// Utilities
// ============================================================================

fn register_utility_functions(engine: &mut Engine) {
    // glob_match(pattern, name) -> bool
    engine.register_fn(
        "glob_match",
        |pattern: &str, name: &str| -> RhaiResult<bool> {
            glob_match(pattern, name)
                .map_err(|e| format!("bad glob pattern \"{pattern}\": {e}").into())
        },
    );

    // println(msg: &str) - avoid conflict with Rhai's built-in 'print'
    engine.register_fn("println", |msg: &str| {
        info!("[rhai] {}", msg);
    });

    // log(level: &str, msg: &str)
    engine.register_fn("log", |level: &str, msg: &str| match level {
        "debug" => debug!("[rhai] {}", msg),
        "info" => info!("[rhai] {}", msg),
        "warn" => warn!("[rhai] {}", msg),
        "error" => tracing::error!("[rhai] {}", msg),
        _ => info!("[rhai] {}", msg),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_index_message() {
        let names = vec!["-owner".to_string(), "-group".to_string(), "-mode".to_string()];
        assert_eq!(attribute_index(&names, "-mode").unwrap(), 2);
        let err = attribute_index(&names, "-size").unwrap_err();
        assert!(
            err.to_string()
                .contains("bad option \"-size\": must be -owner, -group, or -mode")
        );
    }

    #[test]
    fn test_stat_map() {
        let stat = Stat {
            size: 42,
            mode: hookfs_core::S_IFREG | 0o644,
            ..Default::default()
        };
        let map = stat_map(&stat);
        assert_eq!(map["size"].as_int().unwrap(), 42);
        assert_eq!(map["type"].clone().into_string().unwrap(), "file");
    }
}
