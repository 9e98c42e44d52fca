//! End-to-end tests: the demo in-memory filesystem mounted in a Rhai
//! interpreter and driven through the host `file_*` functions.

use std::sync::Arc;

use hookfs_core::{Environment, SharedVfs, Value, shared_vfs};
use hookfs_rhai::{EngineLimits, RhaiInterp};

const MEMFS: &str = include_str!("../../../demos/memfs.rhai");

fn interp_with_memfs(vfs: &SharedVfs) -> Arc<RhaiInterp> {
    let interp = RhaiInterp::new(vfs.clone(), &EngineLimits::default());
    interp.run(MEMFS).expect("memfs loads");
    interp
        .run(r#"vfs_filesystem("mount", "/mem", "memfs s1")"#)
        .expect("mount");
    interp
}

fn run(interp: &RhaiInterp, script: &str) -> Value {
    interp
        .run(script)
        .unwrap_or_else(|e| panic!("script failed: {e}\n{script}"))
}

fn run_err(interp: &RhaiInterp, script: &str) -> String {
    interp
        .run(script)
        .expect_err("script should fail")
        .to_string()
}

#[test]
fn test_write_then_read_back() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);

    let out = run(
        &interp,
        r#"
        let c = file_open("/mem/a.txt", "w");
        chan_write(c, "hello");
        chan_close(c);

        let r = file_open("/mem/a.txt", "r");
        let text = chan_read(r);
        chan_close(r);
        text
    "#,
    );
    assert_eq!(out, Value::from("hello"));
    // The handler channel is not left behind in either table.
    assert!(interp.channels().names().is_empty());
}

#[test]
fn test_append_mode() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    let out = run(
        &interp,
        r#"
        let c = file_open("/mem/log", "w");
        chan_write(c, "one ");
        chan_close(c);
        let c = file_open("/mem/log", "a");
        chan_write(c, "two");
        chan_close(c);
        file_stat("/mem/log").size
    "#,
    );
    assert_eq!(out, Value::Int(7));
}

#[test]
fn test_stat_and_predicates() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    run(
        &interp,
        r#"
        file_mkdir("/mem/docs");
        let c = file_open("/mem/docs/x.txt", "w");
        chan_write(c, "12345");
        chan_close(c);
        file_utime("/mem/docs/x.txt", 5, 1000);
    "#,
    );

    assert_eq!(run(&interp, r#"file_stat("/mem/docs/x.txt")["type"]"#), Value::from("file"));
    assert_eq!(run(&interp, r#"file_stat("/mem/docs/x.txt").size"#), Value::Int(5));
    assert_eq!(run(&interp, r#"file_stat("/mem/docs/x.txt").mtime"#), Value::Int(1000));
    assert_eq!(run(&interp, r#"file_isdir("/mem/docs")"#), Value::Bool(true));
    assert_eq!(run(&interp, r#"file_isfile("/mem/docs")"#), Value::Bool(false));
    assert_eq!(run(&interp, r#"file_exists("/mem/docs/nope")"#), Value::Bool(false));
    assert_eq!(run(&interp, r#"file_exists("/mem")"#), Value::Bool(true));

    let err = run_err(&interp, r#"file_stat("/mem/nope")"#);
    assert!(err.contains("no such file or directory"), "{err}");
}

#[test]
fn test_open_missing_file_reports_errno() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    let err = run_err(&interp, r#"file_open("/mem/missing", "r")"#);
    assert_eq!(err, "couldn't open \"/mem/missing\": no such file or directory");
}

#[test]
fn test_glob() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    run(
        &interp,
        r#"
        for name in ["a.txt", "b.txt", "c.log"] {
            let c = file_open("/mem/" + name, "w");
            chan_close(c);
        }
        file_mkdir("/mem/sub");
    "#,
    );

    assert_eq!(
        run(&interp, r#"glob("/mem", "*.txt")"#),
        Value::list(["/mem/a.txt", "/mem/b.txt"])
    );
    // Directories only.
    assert_eq!(run(&interp, r#"glob("/mem", "*", 4)"#), Value::list(["/mem/sub"]));
}

#[test]
fn test_mkdir_parents_and_rmdir() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    run(
        &interp,
        r#"
        file_mkdir("/mem/a/b/c", true);
        let f = file_open("/mem/a/b/c/file", "w");
        chan_close(f);
    "#,
    );
    assert_eq!(run(&interp, r#"file_isdir("/mem/a/b/c")"#), Value::Bool(true));

    let err = run_err(&interp, r#"file_rmdir("/mem/a")"#);
    assert_eq!(err, "error deleting \"/mem/a\": directory not empty");

    run(&interp, r#"file_rmdir("/mem/a", true)"#);
    assert_eq!(run(&interp, r#"file_exists("/mem/a/b/c/file")"#), Value::Bool(false));
}

#[test]
fn test_delete_file() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    run(
        &interp,
        r#"
        let f = file_open("/mem/gone", "w");
        chan_close(f);
        file_delete("/mem/gone");
    "#,
    );
    assert_eq!(run(&interp, r#"file_exists("/mem/gone")"#), Value::Bool(false));
    let err = run_err(&interp, r#"file_delete("/mem/gone")"#);
    assert!(err.contains("no such file"), "{err}");
}

#[test]
fn test_attributes() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    run(
        &interp,
        r#"
        let f = file_open("/mem/f", "w");
        chan_close(f);
        file_attr("/mem/f", "-owner", "alice");
    "#,
    );
    assert_eq!(run(&interp, r#"file_attr("/mem/f", "-owner")"#), Value::from("alice"));
    assert_eq!(
        run(&interp, r#"file_attributes("/mem/f")["-permissions"]"#),
        Value::from("")
    );
    let err = run_err(&interp, r#"file_attr("/mem/f", "-size")"#);
    assert!(
        err.contains("bad option \"-size\": must be -owner, or -permissions"),
        "{err}"
    );
}

#[test]
fn test_filesystem_info_and_unmount() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);

    assert_eq!(run(&interp, r#"vfs_filesystem("info")"#), Value::list(["/mem"]));
    assert_eq!(
        run(&interp, r#"vfs_filesystem("info", "/mem")"#),
        Value::list(["memfs", "s1"])
    );
    assert_eq!(run(&interp, r#"file_system("/mem/x")"#), Value::list(["memfs", "s1"]));
    assert_eq!(run(&interp, r#"file_system("/elsewhere")"#), Value::list(["native"]));

    run(&interp, r#"vfs_filesystem("unmount", "/mem")"#);
    assert_eq!(run(&interp, r#"file_exists("/mem")"#), Value::Bool(false));

    let err = run_err(&interp, r#"vfs_filesystem("unmount", "/mem")"#);
    assert_eq!(err, "no such mount \"/mem\"");
    let err = run_err(&interp, r#"vfs_filesystem("mount", "/x")"#);
    assert_eq!(
        err,
        "wrong # args: should be \"vfs_filesystem mount ?-volume? path cmd\""
    );
}

#[test]
fn test_volume_mount() {
    let vfs = shared_vfs();
    let interp = RhaiInterp::new(vfs.clone(), &EngineLimits::default());
    run(&interp, MEMFS);
    run(&interp, r#"vfs_filesystem("mount", "-volume", "mem://", "memfs vol")"#);

    assert_eq!(run(&interp, "file_volumes()"), Value::list(["mem://"]));
    assert_eq!(
        run(&interp, r#"file_normalize("mem://dir/../a.txt")"#),
        Value::from("mem://a.txt")
    );
    let out = run(
        &interp,
        r#"
        let c = file_open("mem://a.txt", "w");
        chan_write(c, "vol");
        chan_close(c);
        file_stat("mem://a.txt").size
    "#,
    );
    assert_eq!(out, Value::Int(3));

    run(&interp, r#"vfs_filesystem("unmount", "mem://")"#);
    assert_eq!(run(&interp, "file_volumes()"), Value::list(Vec::<Value>::new()));
}

#[test]
fn test_relative_paths_use_cwd() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    interp.set_cwd("/mem");
    run(
        &interp,
        r#"
        let c = file_open("rel.txt", "w");
        chan_close(c);
    "#,
    );
    assert_eq!(run(&interp, r#"file_exists("/mem/rel.txt")"#), Value::Bool(true));
}

#[test]
fn test_cross_interpreter_access() {
    let vfs = shared_vfs();
    let owner = interp_with_memfs(&vfs);
    let client = RhaiInterp::new(vfs.clone(), &EngineLimits::default());

    let out = run(
        &client,
        r#"
        let c = file_open("/mem/shared", "w");
        chan_write(c, "from client");
        chan_close(c);
        let r = file_open("/mem/shared", "r");
        chan_read(r)
    "#,
    );
    assert_eq!(out, Value::from("from client"));
    // The data lives in the owner's store.
    assert!(owner.global_get("memfs:s1:f:shared").is_some());
    // The owner's result slot is untouched by callbacks run on the client's behalf.
    assert!(owner.result().is_ok());
}

#[test]
fn test_teardown_drains_mounts() {
    let vfs = shared_vfs();
    let owner = interp_with_memfs(&vfs);
    let client = RhaiInterp::new(vfs.clone(), &EngineLimits::default());
    assert_eq!(vfs.list_mounts(), vec!["/mem"]);

    owner.delete();
    assert!(vfs.list_mounts().is_empty());
    assert_eq!(run(&client, r#"file_exists("/mem")"#), Value::Bool(false));

    drop(client);
    assert!(vfs.list_mounts().is_empty());
}

#[test]
fn test_dropping_interp_unregisters() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    let id = interp.id();
    drop(interp);
    assert!(!vfs.is_registered(id));
    assert!(vfs.list_mounts().is_empty());
}

#[test]
fn test_exit_hook_stops_resolution() {
    let vfs = shared_vfs();
    let interp = interp_with_memfs(&vfs);
    assert_eq!(run(&interp, r#"file_exists("/mem")"#), Value::Bool(true));
    run(&interp, r#"vfs_filesystem("mount", "-volume", "mem://", "memfs vol")"#);
    assert_eq!(run(&interp, "file_volumes()"), Value::list(["mem://"]));

    vfs.begin_exit();
    assert_eq!(run(&interp, r#"file_exists("/mem")"#), Value::Bool(false));
    assert_eq!(run(&interp, r#"file_exists("mem://")"#), Value::Bool(false));
    assert_eq!(run(&interp, "file_volumes()"), Value::list(Vec::<Value>::new()));
    assert!(vfs.list_volumes().is_none());
}
