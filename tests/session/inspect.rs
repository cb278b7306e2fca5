use debugcat::debugger::location::FileLocation;
use debugcat::debugger::threads::{StackFrame, Task};
use debugcat::debugger::variables::{decode, RawValue};
use debugcat::{DebugError, Mode, Status, VarLoadParams};
use regex::Regex;

use super::fake::{primitive, unloaded_pointer, Stop};
use super::Harness;

#[tokio::test]
async fn test_attach_and_list_globals() {
    let mut h = Harness::started(Mode::Attach, |s| {
        s.pid = 4242;
        s.globals = ["config", "configPath", "cfg"]
            .iter()
            .map(|n| decode(&primitive(n, "string", "x")))
            .collect();
    })
    .await;
    assert_eq!(h.dbg.pid(), 4242);

    let globals = h.dbg.list_globals("^config$").await.unwrap();
    let re = Regex::new("^config$").unwrap();
    assert_eq!(globals.len(), 1);
    assert!(globals.iter().all(|v| re.is_match(&v.name)));
    assert_eq!(h.dbg.snapshot().await.globals, globals);

    h.dbg.stop().await.unwrap();
    assert_eq!(h.fake.script().detached, Some(false));
    assert_eq!(h.status.drain(), vec![Status::Finished]);
}

#[tokio::test]
async fn test_pointer_followed_once() {
    let h = Harness::started(Mode::Exec, |s| {
        s.values.insert("p".to_string(), unloaded_pointer("p", 0xc000010000));
    })
    .await;

    let mut var = h.dbg.show_var("p").await.unwrap();
    assert_eq!(h.fake.script().pointee_reads, vec!["*p".to_string()]);
    assert_eq!(var.children.len(), 1);
    assert_eq!(var.children[0].name, "*p");
    assert!(var.children[0].value.contains("Port: 8080"));

    h.dbg.follow_ptr(&mut var).await.unwrap();
    assert_eq!(h.fake.script().pointee_reads.len(), 1);
}

#[tokio::test]
async fn test_pointer_placeholder_before_follow() {
    let h = Harness::started(Mode::Exec, |s| {
        s.values.insert("p".to_string(), unloaded_pointer("p", 0xc000010000));
    })
    .await;

    let rendered = h.dbg.var_value("p").await.unwrap();
    assert!(h.fake.script().pointee_reads.is_empty());
    assert!(!rendered.contains("Port"));
}

#[tokio::test]
async fn test_long_string_value_is_cut_at_load_limit() {
    let limit = VarLoadParams::get_defaults().max_string_len as usize;
    let h = Harness::started(Mode::Exec, |s| {
        let long = "x".repeat(limit + 150);
        s.values.insert("long".to_string(), RawValue {
            len: long.len() as i64,
            ..primitive("long", "string", &long)
        });
        let loaded = "y".repeat(limit);
        s.values.insert("partial".to_string(), RawValue {
            len: 5000,
            ..primitive("partial", "string", &loaded)
        });
        s.values.insert("short".to_string(), RawValue {
            len: 2,
            ..primitive("short", "string", "ok")
        });
    })
    .await;

    let long = h.dbg.var_value("long").await.unwrap();
    assert_eq!(long.chars().count(), limit + 1);
    assert!(long.ends_with('…'));
    let partial = h.dbg.var_value("partial").await.unwrap();
    assert_eq!(partial, format!("{}…", "y".repeat(limit)));
    assert_eq!(h.dbg.var_value("short").await.unwrap(), "ok");
}

#[tokio::test]
async fn test_unknown_expression() {
    let h = Harness::started(Mode::Exec, |_| {}).await;
    let err = h.dbg.var_value("nope").await.unwrap_err();
    assert!(matches!(err, DebugError::InvalidExpr { ref expr, .. } if expr == "nope"));
}

#[tokio::test]
async fn test_find_frames_by_short_name() {
    let frame = |task: i64, path: &str, line: u32| StackFrame::new(0, task, 0, FileLocation::new(path, line), "main.work");
    let h = Harness::started(Mode::Exec, |s| {
        s.tasks = (1..=4)
            .map(|id| Task {
                id,
                func_name: "main.work".to_string(),
                ..Default::default()
            })
            .collect();
        s.stacks.insert(1, vec![frame(1, "/long/a/b/foo.go", 10)]);
        s.stacks.insert(2, vec![frame(2, "/long/c/foo.go", 28)]);
        s.stacks.insert(3, vec![frame(3, "/long/c/bar.go", 30)]);
        s.stacks.insert(
            4,
            vec![frame(4, "/long/c/util.go", 2), StackFrame::new(1, 4, 0, FileLocation::new("/long/c/foo.go", 55), "main.run")],
        );
    })
    .await;

    let found = h.dbg.find_frames("foo.go", 30).await.unwrap();
    let owners: Vec<i64> = found.iter().map(|f| f.thread_or_task_id).collect();
    assert_eq!(owners, vec![2, 1, 4]);
    assert_eq!(found[2].loc.line, 55);

    assert!(h.dbg.find_frames("missing.go", 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_frame_selection_stays_in_stack() {
    let mut h = Harness::started(Mode::Exec, |s| s.runs.push_back(Stop::at("/p/main.go", 20, None))).await;
    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    h.status.drain();

    h.dbg.set_frame(1).await.unwrap();
    let snap = h.dbg.snapshot().await;
    assert_eq!(snap.current_frame_index, 1);
    assert_eq!(snap.current_loc(), Some(&snap.stack[1].loc));

    let err = h.dbg.set_frame(5).await.unwrap_err();
    assert!(matches!(err, DebugError::FrameOutOfRange(5)));
    let snap = h.dbg.snapshot().await;
    assert_eq!(snap.current_frame_index, 1);
    assert!(snap.current_frame_index < snap.stack.len());
}

#[tokio::test]
async fn test_set_var_updates_local() {
    let mut h = Harness::started(Mode::Exec, |s| {
        s.runs.push_back(Stop::at("/p/main.go", 20, None));
        s.values.insert("n".to_string(), primitive("n", "int", "1"));
        s.locals = vec![decode(&primitive("n", "int", "1"))];
    })
    .await;
    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    h.status.drain();

    h.dbg.set_var("n", "5").await.unwrap();
    let snap = h.dbg.snapshot().await;
    assert_eq!(snap.locals[0].value, "5");
}
