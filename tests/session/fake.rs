//! Scripted in-memory backend
//!
//! Stops are queued up front and handed out one by one by the continue
//! stream and the step calls. The location of the last handed out stop is
//! where the stack of the current task points.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;

use debugcat::debugger::breakpoint::Breakpoint;
use debugcat::debugger::location::FileLocation;
use debugcat::debugger::state::{BreakHit, ExecState};
use debugcat::debugger::threads::{StackFrame, Task, Thread};
use debugcat::debugger::variables::{decode, RawValue, VarKind, Variable};
use debugcat::platform::{Backend, Capability, ExecStream};
use debugcat::{DebugError, OutputSink, Result, SessionParams};

/// A stop and the source line it happens at
#[derive(Debug, Clone)]
pub struct Stop {
    pub exec: ExecState,
    pub loc: FileLocation,
}

impl Stop {
    /// Stop of thread 1 / task 1 at a line, optionally hitting a breakpoint
    pub fn at(path: &str, line: u32, hit: Option<i64>) -> Self {
        let loc = FileLocation::new(path, line);
        let hits = hit
            .map(|id| BreakHit {
                id,
                thread_id: 1,
                loc: loc.clone(),
                trace_only: false,
            })
            .into_iter()
            .collect();
        Self {
            exec: ExecState {
                current_thread_id: 1,
                current_task_id: 1,
                hits,
                ..Default::default()
            },
            loc,
        }
    }

    pub fn exited(code: i32) -> Self {
        Self {
            exec: ExecState::exited(code),
            loc: FileLocation::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Script {
    pub active: bool,
    pub pid: u32,
    /// Breakpoints known to the backend
    pub breaks: Vec<Breakpoint>,
    pub next_id: i64,
    pub creates: usize,
    /// Stops handed out by continue
    pub runs: VecDeque<Stop>,
    /// Stops handed out by the step calls
    pub steps: VecDeque<Stop>,
    pub loc: FileLocation,
    pub tasks: Vec<Task>,
    /// Stacks by task; tasks without an entry stop at `loc`
    pub stacks: HashMap<i64, Vec<StackFrame>>,
    pub locals: Vec<Variable>,
    pub globals: Vec<Variable>,
    pub values: HashMap<String, RawValue>,
    /// Expressions evaluated to follow pointers
    pub pointee_reads: Vec<String>,
    /// `kill` flag of the last detach
    pub detached: Option<bool>,
    /// Directory the backend resolves relative breakpoint paths against
    pub source_root: Option<String>,
}

/// Backend running entirely off a [`Script`]
#[derive(Clone, Default)]
pub struct FakeBackend {
    script: Arc<Mutex<Script>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.script().next_id = 1;
        fake
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    fn started(&self) -> Result<MutexGuard<'_, Script>> {
        let script = self.script();
        if !script.active {
            return Err(DebugError::NotStarted);
        }
        Ok(script)
    }

    fn current() -> ExecState {
        ExecState {
            current_thread_id: 1,
            current_task_id: 1,
            ..Default::default()
        }
    }

    fn next_step(&self) -> Result<ExecState> {
        let mut script = self.started()?;
        let stop = script.steps.pop_front().ok_or_else(|| DebugError::rpc("Command", "nothing scripted"))?;
        if stop.exec.exited {
            script.active = false;
        }
        script.loc = stop.loc;
        Ok(stop.exec)
    }
}

/// A pointer to a struct whose fields were not loaded yet
pub fn unloaded_pointer(name: &str, addr: u64) -> RawValue {
    RawValue {
        name: name.to_string(),
        type_name: "*main.Config".to_string(),
        kind: VarKind::Pointer,
        addr,
        children: vec![RawValue {
            type_name: "main.Config".to_string(),
            kind: VarKind::Struct,
            addr,
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn primitive(name: &str, type_name: &str, value: &str) -> RawValue {
    RawValue {
        name: name.to_string(),
        type_name: type_name.to_string(),
        kind: VarKind::Primitive,
        value: value.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn start(&self, _exe_path: &Path, _root_path: &Path, out: OutputSink, _params: &SessionParams) -> Result<()> {
        let mut script = self.script();
        script.active = true;
        out.write_line("API server listening at: 127.0.0.1:0");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.script().active
    }

    fn pid(&self) -> u32 {
        self.script().pid
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>> {
        self.started()?;
        Ok(Utc::now())
    }

    async fn detach(&self, kill: bool) -> Result<()> {
        let mut script = self.started()?;
        script.active = false;
        script.detached = Some(kill);
        Ok(())
    }

    async fn disconnect(&self, _cont: bool) -> Result<()> {
        self.started()?;
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.started()?;
        Ok(())
    }

    async fn restart_from(&self, _pos: &str, _reset_args: bool, _new_args: &[String]) -> Result<()> {
        Err(DebugError::Unsupported(Capability::Reverse.as_str()))
    }

    async fn state(&self) -> Result<ExecState> {
        self.started()?;
        Ok(Self::current())
    }

    fn continue_exec(&self) -> ExecStream {
        let script = self.script.clone();
        stream::unfold(script, |script| async move {
            let exec = {
                let mut s = script.lock().unwrap();
                if !s.active {
                    return None;
                }
                let stop = s.runs.pop_front()?;
                if stop.exec.exited {
                    s.active = false;
                }
                s.loc = stop.loc;
                stop.exec
            };
            Some((exec, script))
        })
        .boxed()
    }

    fn rewind(&self) -> ExecStream {
        stream::empty().boxed()
    }

    async fn next(&self) -> Result<ExecState> {
        self.next_step()
    }

    async fn step(&self) -> Result<ExecState> {
        self.next_step()
    }

    async fn step_out(&self) -> Result<ExecState> {
        self.next_step()
    }

    async fn step_single(&self) -> Result<ExecState> {
        self.next_step()
    }

    async fn call(&self, _task_id: i64, _expr: &str, _unsafe_call: bool) -> Result<ExecState> {
        self.started()?;
        Ok(Self::current())
    }

    async fn switch_thread(&self, _id: i64) -> Result<ExecState> {
        self.started()?;
        Ok(Self::current())
    }

    async fn switch_task(&self, id: i64) -> Result<ExecState> {
        self.started()?;
        let mut exec = Self::current();
        if id != 0 {
            exec.current_task_id = id;
        }
        Ok(exec)
    }

    async fn halt(&self) -> Result<ExecState> {
        self.started()?;
        Ok(Self::current())
    }

    async fn list_threads(&self) -> Result<Vec<Thread>> {
        let script = self.started()?;
        Ok(vec![Thread {
            id: 1,
            loc: script.loc.clone(),
            func_name: "main.main".to_string(),
            current_task_id: 1,
            ..Default::default()
        }])
    }

    async fn get_thread(&self, id: i64) -> Result<Thread> {
        let threads = self.list_threads().await?;
        threads
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| DebugError::rpc("GetThread", "no such thread"))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let script = self.started()?;
        if !script.tasks.is_empty() {
            return Ok(script.tasks.clone());
        }
        Ok(vec![Task {
            id: 1,
            loc: script.loc.clone(),
            func_name: "main.main".to_string(),
            host_thread_id: 1,
            ..Default::default()
        }])
    }

    async fn stack(&self, task_id: i64, depth: usize) -> Result<Vec<StackFrame>> {
        let script = self.started()?;
        let mut frames = match script.stacks.get(&task_id) {
            Some(frames) => frames.clone(),
            None => vec![
                StackFrame::new(0, task_id, 0x1000, script.loc.clone(), "main.main"),
                StackFrame::new(1, task_id, 0x2000, FileLocation::new("/go/src/runtime/proc.go", 250), "runtime.main"),
            ],
        };
        frames.truncate(depth);
        Ok(frames)
    }

    async fn list_globals(&self, filter: &str) -> Result<Vec<Variable>> {
        let script = self.started()?;
        let re = Regex::new(filter).map_err(|e| DebugError::rpc("ListPackageVars", e.to_string()))?;
        Ok(script.globals.iter().filter(|v| re.is_match(&v.name)).cloned().collect())
    }

    async fn list_locals(&self, _task_id: i64, _frame: usize) -> Result<Vec<Variable>> {
        Ok(self.started()?.locals.clone())
    }

    async fn get_var(&self, expr: &str, _task_id: i64, _frame: usize) -> Result<Variable> {
        let script = self.started()?;
        let raw = script.values.get(expr).ok_or_else(|| DebugError::InvalidExpr {
            expr: expr.to_string(),
            message: "could not find symbol value".to_string(),
        })?;
        let mut var = decode(raw);
        var.expr = expr.to_string();
        Ok(var)
    }

    async fn follow_ptr(&self, var: &mut Variable) -> Result<()> {
        let Some(expr) = var.pointee_request() else {
            return Ok(());
        };
        let mut script = self.started()?;
        script.pointee_reads.push(expr.clone());
        let raw = RawValue {
            type_name: "main.Config".to_string(),
            kind: VarKind::Struct,
            children: vec![primitive("Name", "string", "svc"), primitive("Port", "int", "8080")],
            ..Default::default()
        };
        var.attach_pointee(decode(&raw));
        Ok(())
    }

    async fn set_var(&self, name: &str, value: &str, _task_id: i64, _frame: usize) -> Result<()> {
        let mut script = self.started()?;
        let raw = script
            .values
            .get_mut(name)
            .ok_or_else(|| DebugError::rpc("Set", "could not find symbol value"))?;
        raw.value = value.to_string();
        Ok(())
    }

    async fn list_sources(&self, _filter: &str) -> Result<Vec<String>> {
        self.started()?;
        Ok(vec!["/p/main.go".to_string()])
    }

    async fn list_funcs(&self, _filter: &str) -> Result<Vec<String>> {
        self.started()?;
        Ok(vec!["main.main".to_string()])
    }

    async fn list_types(&self, _filter: &str) -> Result<Vec<String>> {
        self.started()?;
        Ok(vec!["main.Config".to_string()])
    }

    async fn create_break(&self, bp: &Breakpoint) -> Result<Breakpoint> {
        let mut script = self.started()?;
        let mut loc = bp.loc.clone();
        if let Some(root) = script.source_root.as_deref().filter(|_| !loc.path.starts_with('/')) {
            loc.path = format!("{}/{}", root, loc.path);
        }
        if script.breaks.iter().any(|b| b.loc.same_line(&loc)) {
            return Err(DebugError::rpc("CreateBreakpoint", format!("Breakpoint exists at {}", loc)));
        }
        let created = Breakpoint {
            id: script.next_id,
            func_name: "main.main".to_string(),
            loc,
            ..bp.clone()
        };
        script.next_id += 1;
        script.creates += 1;
        script.breaks.push(created.clone());
        Ok(created)
    }

    async fn get_break(&self, id: i64) -> Result<Breakpoint> {
        let script = self.started()?;
        script
            .breaks
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| DebugError::rpc("GetBreakpoint", "no such breakpoint"))
    }

    async fn list_breaks(&self) -> Result<Vec<Breakpoint>> {
        Ok(self.started()?.breaks.clone())
    }

    async fn clear_break(&self, id: i64) -> Result<Breakpoint> {
        let mut script = self.started()?;
        let pos = script
            .breaks
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| DebugError::rpc("ClearBreakpoint", "no such breakpoint"))?;
        Ok(script.breaks.remove(pos))
    }

    async fn amend_break(&self, bp: &Breakpoint) -> Result<()> {
        let mut script = self.started()?;
        if let Some(existing) = script.breaks.iter_mut().find(|b| b.id == bp.id) {
            existing.condition = bp.condition.clone();
            existing.trace_only = bp.trace_only;
        }
        Ok(())
    }

    async fn cancel_next(&self) -> Result<()> {
        self.started()?;
        Ok(())
    }

    fn has_tasks(&self) -> bool {
        true
    }

    fn capability(&self, _cap: Capability) -> bool {
        false
    }
}
