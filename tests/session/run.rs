use debugcat::{DebugError, Mode, Status};

use super::fake::Stop;
use super::Harness;

#[tokio::test]
async fn test_breakpoint_hit_then_step_over() {
    let mut h = Harness::started(Mode::Exec, |s| {
        s.runs.push_back(Stop::at("/p/main.go", 42, Some(1)));
        s.steps.push_back(Stop::at("/p/main.go", 43, None));
    })
    .await;
    h.dbg.set_break("/p/main.go", 42, None, false).await.unwrap();

    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    assert_eq!(h.status.drain(), vec![Status::Running, Status::Breakpoint]);
    let snap = h.dbg.snapshot().await;
    assert_eq!(snap.current_break_id, 1);
    assert_eq!(snap.stack[0].loc.line, 42);

    assert_eq!(h.dbg.step_over().await.unwrap(), Status::Stopped);
    let snap = h.dbg.snapshot().await;
    assert_eq!(snap.current_frame_index, 0);
    assert_eq!(snap.stack[0].loc.line, 43);
    assert_eq!(snap.current_break_id, 0);
    assert_eq!(h.status.drain(), vec![Status::Running, Status::Stopped]);
}

#[tokio::test]
async fn test_trace_hits_are_logged_not_surfaced() {
    let mut h = Harness::started(Mode::Exec, |s| {
        s.runs.push_back(Stop::at("/p/f.go", 10, Some(1)));
        s.runs.push_back(Stop::at("/p/f.go", 10, Some(1)));
        s.runs.push_back(Stop::at("/p/f.go", 20, Some(2)));
    })
    .await;
    h.dbg.set_break("/p/f.go", 10, None, true).await.unwrap();
    h.dbg.set_break("/p/f.go", 20, None, false).await.unwrap();

    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;

    let traces: Vec<String> = h.lines().into_iter().filter(|l| l.starts_with("Trace: ")).collect();
    assert_eq!(traces, vec!["Trace: 1 /p/f.go:10", "Trace: 1 /p/f.go:10"]);
    assert_eq!(h.status.drain(), vec![Status::Running, Status::Breakpoint]);
    let snap = h.dbg.snapshot().await;
    assert_eq!(snap.stack[0].loc.line, 20);
    assert_eq!(snap.current_break_id, 2);
}

#[tokio::test]
async fn test_program_exit_finishes_run() {
    let mut h = Harness::started(Mode::Exec, |s| s.runs.push_back(Stop::exited(3))).await;

    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    assert_eq!(h.status.drain(), vec![Status::Running, Status::Finished]);
    let snap = h.dbg.snapshot().await;
    assert!(snap.exec.exited);
    assert_eq!(snap.exec.exit_code, 3);
    assert!(snap.stack.is_empty());

    let err = h.dbg.continue_exec().await.unwrap_err();
    assert!(matches!(err, DebugError::InvalidState { status: Status::Finished, .. }));
}

#[tokio::test]
async fn test_run_without_stop_finishes() {
    let mut h = Harness::started(Mode::Exec, |_| {}).await;

    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    assert_eq!(h.status.drain(), vec![Status::Running, Status::Finished]);
}

#[tokio::test]
async fn test_step_needs_a_stop() {
    let h = Harness::started(Mode::Exec, |s| s.steps.push_back(Stop::at("/p/main.go", 5, None))).await;

    let err = h.dbg.step_into().await.unwrap_err();
    assert!(matches!(err, DebugError::InvalidState { status: Status::Ready, .. }));
    assert_eq!(h.fake.script().steps.len(), 1);
}

#[tokio::test]
async fn test_failed_step_reloads_state() {
    let mut h = Harness::started(Mode::Exec, |s| s.runs.push_back(Stop::at("/p/main.go", 7, None))).await;
    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;
    h.status.drain();

    // nothing scripted for the step, the backend rejects it
    assert!(h.dbg.step_out().await.is_err());
    assert_eq!(h.status.drain(), vec![Status::Running, Status::Stopped]);
    assert_eq!(h.dbg.snapshot().await.stack[0].loc.line, 7);
}

#[tokio::test]
async fn test_halt_from_ready_stops() {
    let mut h = Harness::started(Mode::Exec, |s| s.loc = debugcat::debugger::location::FileLocation::new("/p/main.go", 9)).await;

    h.dbg.halt().await.unwrap();
    assert_eq!(h.status.drain(), vec![Status::Stopped]);
    assert_eq!(h.dbg.snapshot().await.current_loc().map(|l| l.line), Some(9));
}

#[tokio::test]
async fn test_restart_keeps_breakpoints() {
    let mut h = Harness::started(Mode::Exec, |s| s.runs.push_back(Stop::at("/p/main.go", 42, Some(1)))).await;
    h.dbg.set_break("/p/main.go", 42, Some("i > 3".to_string()), false).await.unwrap();
    h.dbg.continue_exec().await.unwrap();
    h.dbg.wait_run().await;

    h.dbg.restart().await.unwrap();
    assert_eq!(h.dbg.status(), Status::Ready);
    let breaks = h.dbg.breakpoints().await;
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].condition.as_deref(), Some("i > 3"));
    assert!(h.dbg.snapshot().await.stack.is_empty());
    assert_eq!(h.status.drain().last(), Some(&Status::Ready));
}

#[tokio::test]
async fn test_start_is_reentrant_after_detach() {
    let mut h = Harness::started(Mode::Exec, |_| {}).await;
    h.dbg.stop().await.unwrap();
    assert_eq!(h.fake.script().detached, Some(true));
    assert_eq!(h.status.drain(), vec![Status::Finished]);

    h.dbg.start(std::path::Path::new("/p/main.go")).await.unwrap();
    assert_eq!(h.status.drain(), vec![Status::Building, Status::Ready]);
}
