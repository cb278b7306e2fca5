use std::collections::BTreeSet;

use debugcat::debugger::breakpoint::{Breakpoint, BreakpointManager};
use debugcat::ui::console::{execute, parse_command};
use debugcat::{DebugError, Mode, OutputSink};

use super::fake::FakeBackend;
use super::Harness;

fn active_fake(existing: Vec<Breakpoint>) -> FakeBackend {
    let fake = FakeBackend::new();
    {
        let mut script = fake.script();
        script.active = true;
        script.next_id = existing.iter().map(|b| b.id).max().unwrap_or(0) + 1;
        script.breaks = existing;
    }
    fake
}

fn keys(breaks: &[Breakpoint]) -> BTreeSet<(String, u32)> {
    breaks.iter().map(|b| (b.loc.path.clone(), b.loc.line)).collect()
}

#[tokio::test]
async fn test_existing_breakpoint_is_adopted_not_created() {
    let fake = active_fake(vec![Breakpoint {
        id: 7,
        ..Breakpoint::new("f.go", 5)
    }]);
    let out = OutputSink::discard();
    let mut manager = BreakpointManager::new();
    manager.add_break("f.go", 5);

    manager.sync(&fake, &out).await.unwrap();
    assert_eq!(manager.desired()[0].id, 7);
    assert_eq!(fake.script().creates, 0);

    manager.sync(&fake, &out).await.unwrap();
    assert_eq!(manager.desired().len(), 1);
    assert_eq!(fake.script().creates, 0);
    assert_eq!(fake.script().breaks.len(), 1);
}

#[tokio::test]
async fn test_sync_converges_with_external_breakpoints() {
    let fake = active_fake(vec![Breakpoint {
        id: 4,
        ..Breakpoint::new("/p/c.go", 3)
    }]);
    let out = OutputSink::discard();
    let mut manager = BreakpointManager::new();
    manager.add_break("/p/a.go", 1);
    manager.add_break("/p/b.go", 2);

    let passes = manager.sync(&fake, &out).await.unwrap();
    assert!(passes <= 2);
    assert_eq!(keys(manager.desired()), keys(&fake.script().breaks));
    assert!(manager.desired().iter().all(|b| b.id > 0));

    // nothing changes on an unchanged backend
    assert_eq!(manager.sync(&fake, &out).await.unwrap(), 1);
    assert_eq!(fake.script().creates, 2);
}

#[tokio::test]
async fn test_deleted_breakpoint_is_cleared_on_backend() {
    let fake = active_fake(vec![]);
    let out = OutputSink::discard();
    let mut manager = BreakpointManager::new();
    manager.add_break("/p/a.go", 1);
    manager.add_break("/p/a.go", 9);
    manager.sync(&fake, &out).await.unwrap();
    assert_eq!(fake.script().breaks.len(), 2);

    manager.delete_break("/p/a.go", 1);
    manager.sync(&fake, &out).await.unwrap();
    assert_eq!(keys(&fake.script().breaks), keys(manager.desired()));
    assert_eq!(manager.desired().len(), 1);
}

#[tokio::test]
async fn test_disabled_breakpoint_stays_desired() {
    let fake = active_fake(vec![]);
    let out = OutputSink::discard();
    let mut manager = BreakpointManager::new();
    manager.add_break("/p/a.go", 4);
    manager.sync(&fake, &out).await.unwrap();

    manager.set_enabled("/p/a.go", 4, false).unwrap();
    manager.sync(&fake, &out).await.unwrap();
    assert!(fake.script().breaks.is_empty());
    assert_eq!(manager.desired().len(), 1);
    assert_eq!(manager.desired()[0].id, 0);
    assert!(!manager.desired()[0].enabled);
}

#[tokio::test]
async fn test_amended_condition_reaches_backend() {
    let mut h = Harness::started(Mode::Exec, |_| {}).await;
    h.dbg.set_break("/p/main.go", 12, None, false).await.unwrap();
    // the run ends at once, syncing the breakpoint on the way
    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    assert_eq!(h.fake.script().breaks.len(), 1);

    h.dbg.restart().await.unwrap();
    h.dbg
        .amend_break("/p/main.go", 12, true, Some("n == 0".to_string()), false)
        .await
        .unwrap();
    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    assert_eq!(h.fake.script().breaks[0].condition.as_deref(), Some("n == 0"));
    h.status.drain();
}

#[tokio::test]
async fn test_clear_unknown_breakpoint() {
    let h = Harness::started(Mode::Exec, |_| {}).await;
    let err = h.dbg.clear_break("/p/main.go", 3).await.unwrap_err();
    assert!(matches!(err, DebugError::NoBreakpoint(ref path, 3) if path == "/p/main.go"));
}

#[tokio::test]
async fn test_relative_breakpoint_converges_on_resolved_path() {
    let fake = active_fake(vec![]);
    fake.script().source_root = Some("/proj".to_string());
    let (out, mut rx) = OutputSink::channel();
    let mut manager = BreakpointManager::new();
    manager.add_break("main.go", 12);

    manager.sync(&fake, &out).await.unwrap();
    assert_eq!(manager.sync(&fake, &out).await.unwrap(), 1);
    assert_eq!(manager.desired().len(), 1);
    assert_eq!(manager.desired()[0].id, 1);
    assert_eq!(manager.desired()[0].loc.path, "/proj/main.go");
    assert_eq!(fake.script().creates, 1);
    assert!(rx.drain().is_empty());

    // clearing by the short name still reaches the backend copy
    assert!(manager.delete_break("main.go", 12).is_some());
    manager.sync(&fake, &out).await.unwrap();
    assert!(fake.script().breaks.is_empty());
    assert!(manager.desired().is_empty());
}

#[tokio::test]
async fn test_repeated_break_keeps_condition_and_trace() {
    let h = Harness::started(Mode::Exec, |_| {}).await;
    for line in ["b /p/main.go:12", "cond /p/main.go:12 n > 3", "trace /p/main.go:12"] {
        execute(&h.dbg, parse_command(line)).await.unwrap();
    }

    let reply = execute(&h.dbg, parse_command("b /p/main.go:12")).await.unwrap();
    assert_eq!(reply, vec!["Breakpoint already set at /p/main.go:12".to_string()]);
    let breaks = h.dbg.breakpoints().await;
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].condition.as_deref(), Some("n > 3"));
    assert!(breaks[0].trace_only);
}
