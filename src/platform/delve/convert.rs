//! Conversion between Delve wire types and the core model

use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::location::FileLocation;
use crate::debugger::state::{BreakHit, ExecState};
use crate::debugger::threads::{StackFrame, Task, Thread};
use crate::debugger::variables::{RawValue, VarKind};
use crate::platform::delve::api::{self, kind, FLAG_ARGUMENT, FLAG_ESCAPED};

/// Map a `reflect.Kind` onto a variable kind
pub fn var_kind(k: u32) -> VarKind {
    match k {
        kind::BOOL..=kind::COMPLEX128 | kind::STRING | kind::UNSAFE_POINTER => VarKind::Primitive,
        kind::ARRAY | kind::SLICE => VarKind::List,
        kind::CHAN => VarKind::Channel,
        kind::FUNC => VarKind::Function,
        kind::INTERFACE => VarKind::Interface,
        kind::MAP => VarKind::Map,
        kind::PTR => VarKind::Pointer,
        kind::STRUCT => VarKind::Struct,
        _ => VarKind::Other,
    }
}

pub fn raw_value(v: &api::Variable) -> RawValue {
    RawValue {
        name: v.name.clone(),
        type_name: v.type_name.clone(),
        kind: var_kind(v.kind),
        value: v.value.clone(),
        len: v.len,
        cap: v.cap,
        addr: v.addr,
        on_heap: v.flags & FLAG_ESCAPED != 0,
        is_arg: v.flags & FLAG_ARGUMENT != 0,
        decl_line: u32::try_from(v.decl_line).unwrap_or(0),
        children: v.children.iter().map(raw_value).collect(),
        unreadable: if v.unreadable.is_empty() {
            None
        } else {
            Some(v.unreadable.clone())
        },
    }
}

fn location(loc: &api::Location) -> FileLocation {
    let mut result = FileLocation::new(loc.file.clone(), loc.line);
    if let Some(f) = &loc.function {
        result = result.with_symbol(f.name.clone());
    }
    result
}

pub fn breakpoint(bp: &api::Breakpoint) -> Breakpoint {
    let mut loc = FileLocation::new(bp.file.clone(), bp.line);
    if !bp.function_name.is_empty() {
        loc = loc.with_symbol(bp.function_name.clone());
    }
    Breakpoint {
        id: bp.id,
        enabled: !bp.disabled,
        loc,
        func_name: bp.function_name.clone(),
        pc: bp.addr,
        condition: if bp.cond.is_empty() { None } else { Some(bp.cond.clone()) },
        trace_only: bp.tracepoint,
        hit_count: bp.total_hit_count,
    }
}

/// Wire breakpoint to create or amend `bp`
pub fn wire_breakpoint(bp: &Breakpoint) -> api::Breakpoint {
    api::Breakpoint {
        id: bp.id,
        file: bp.loc.path.clone(),
        line: bp.loc.line,
        cond: bp.condition.clone().unwrap_or_default(),
        tracepoint: bp.trace_only,
        disabled: !bp.enabled,
        ..Default::default()
    }
}

pub fn thread(t: &api::Thread) -> Thread {
    let func_name = t.function.as_ref().map(|f| f.name.clone()).unwrap_or_default();
    let mut loc = FileLocation::new(t.file.clone(), t.line);
    if !func_name.is_empty() {
        loc = loc.with_symbol(func_name.clone());
    }
    Thread {
        id: t.id,
        pc: t.pc,
        loc,
        func_name,
        current_task_id: t.goroutine_id,
    }
}

pub fn task(g: &api::Goroutine) -> Task {
    // prefer the innermost frame in user code over runtime internals
    let current = if g.user_current_loc.file.is_empty() {
        &g.current_loc
    } else {
        &g.user_current_loc
    };
    Task {
        id: g.id,
        pc: current.pc,
        loc: location(current),
        func_name: current.function_name().to_string(),
        host_thread_id: g.thread_id,
        start_loc: location(&g.start_loc),
        launch_loc: location(&g.go_statement_loc),
    }
}

pub fn stack_frames(owner: i64, frames: &[api::Stackframe]) -> Vec<StackFrame> {
    frames
        .iter()
        .enumerate()
        .map(|(depth, f)| {
            StackFrame::new(
                depth,
                owner,
                f.location.pc,
                location(&f.location),
                f.location.function_name(),
            )
        })
        .collect()
}

/// Execution state of a Delve debugger state
pub fn exec_state(s: &api::DebuggerState) -> ExecState {
    let current_thread_id = s.current_thread.as_ref().map(|t| t.id).unwrap_or(0);
    let current_task_id = s
        .current_goroutine
        .as_ref()
        .map(|g| g.id)
        .or_else(|| s.current_thread.as_ref().map(|t| t.goroutine_id))
        .unwrap_or(0);

    let threads: Vec<&api::Thread> = match &s.threads {
        Some(threads) if !threads.is_empty() => threads.iter().collect(),
        _ => s.current_thread.iter().collect(),
    };
    let hits = threads
        .iter()
        .filter_map(|t| {
            t.breakpoint.as_ref().filter(|bp| bp.id > 0).map(|bp| BreakHit {
                id: bp.id,
                thread_id: t.id,
                loc: FileLocation::new(t.file.clone(), t.line),
                trace_only: bp.tracepoint || bp.trace_return,
            })
        })
        .collect();

    ExecState {
        running: s.running,
        next_in_progress: s.next_in_progress,
        exited: s.exited,
        exit_code: s.exit_status,
        err: None,
        current_thread_id,
        current_task_id,
        hits,
    }
}

/// Check if a continue must be repeated because only tracepoints were hit
pub fn only_tracepoints_hit(s: &api::DebuggerState) -> bool {
    let threads = s.threads.as_deref().unwrap_or_default();
    let mut hit = false;
    for bp in threads.iter().filter_map(|t| t.breakpoint.as_ref()) {
        hit = true;
        if !(bp.tracepoint || bp.trace_return) {
            return false;
        }
    }
    hit
}

/// Exit status in a "Process N has exited with status M" error
pub fn exited_status(message: &str) -> Option<i32> {
    let (_, rest) = message.split_once("has exited with status ")?;
    rest.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_thread(id: i64, bp: Option<api::Breakpoint>) -> api::Thread {
        api::Thread {
            id,
            file: "/p/f.go".to_string(),
            line: 10,
            goroutine_id: id * 10,
            breakpoint: bp,
            ..Default::default()
        }
    }

    fn tracepoint(id: i64) -> api::Breakpoint {
        api::Breakpoint {
            id,
            tracepoint: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_var_kinds() {
        assert_eq!(var_kind(kind::BOOL), VarKind::Primitive);
        assert_eq!(var_kind(2), VarKind::Primitive);
        assert_eq!(var_kind(kind::STRING), VarKind::Primitive);
        assert_eq!(var_kind(kind::SLICE), VarKind::List);
        assert_eq!(var_kind(kind::PTR), VarKind::Pointer);
        assert_eq!(var_kind(kind::INVALID), VarKind::Other);
    }

    #[test]
    fn test_variable_flags() {
        let raw = raw_value(&api::Variable {
            name: "n".to_string(),
            kind: 2,
            flags: FLAG_ESCAPED | FLAG_ARGUMENT,
            decl_line: 12,
            ..Default::default()
        });
        assert!(raw.on_heap);
        assert!(raw.is_arg);
        assert_eq!(raw.decl_line, 12);
        assert_eq!(raw.unreadable, None);
    }

    #[test]
    fn test_breakpoint_round_trip_fields() {
        let mut bp = Breakpoint::new("/p/a.go", 4);
        bp.condition = Some("i == 2".to_string());
        bp.trace_only = true;
        let wire = wire_breakpoint(&bp);
        assert_eq!(wire.cond, "i == 2");
        assert!(wire.tracepoint);
        let back = breakpoint(&api::Breakpoint { id: 3, ..wire });
        assert_eq!(back.id, 3);
        assert!(back.enabled);
        assert_eq!(back.condition.as_deref(), Some("i == 2"));
    }

    #[test]
    fn test_tracepoint_detection() {
        let only_trace = api::DebuggerState {
            threads: Some(vec![wire_thread(1, Some(tracepoint(1))), wire_thread(2, None)]),
            ..Default::default()
        };
        assert!(only_tracepoints_hit(&only_trace));
        let exec = exec_state(&only_trace);
        assert!(exec.is_trace_only());
        assert_eq!(exec.hits.len(), 1);

        let mixed = api::DebuggerState {
            threads: Some(vec![
                wire_thread(1, Some(tracepoint(1))),
                wire_thread(2, Some(api::Breakpoint { id: 2, ..Default::default() })),
            ]),
            ..Default::default()
        };
        assert!(!only_tracepoints_hit(&mixed));
        assert!(!only_tracepoints_hit(&api::DebuggerState::default()));
    }

    #[test]
    fn test_exited_status() {
        assert_eq!(exited_status("Process 4242 has exited with status 3"), Some(3));
        assert_eq!(exited_status("could not find symbol"), None);
    }
}
