use std::collections::HashSet;

use log::{debug, warn};
use tokio::sync::RwLock;

use crate::config::Mode;
use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::location::FileLocation;
use crate::debugger::status::Status;
use crate::debugger::threads::{StackFrame, Task, Thread};
use crate::debugger::variables::Variable;
use crate::error::{DebugError, Result};
use crate::platform::Backend;

/// Depth of the stack loaded at each stop
pub const STACK_DEPTH: usize = 100;

/// A breakpoint hit by one thread at a stop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakHit {
    /// Breakpoint ID
    pub id: i64,
    pub thread_id: i64,
    pub loc: FileLocation,
    /// The breakpoint logs and continues instead of stopping
    pub trace_only: bool,
}

/// Execution state as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecState {
    pub running: bool,
    /// A step is still in progress and must be finished or cancelled
    pub next_in_progress: bool,
    pub exited: bool,
    pub exit_code: i32,
    /// Error reported by the backend for this state
    pub err: Option<String>,
    pub current_thread_id: i64,
    pub current_task_id: i64,
    /// Breakpoints hit at this stop
    pub hits: Vec<BreakHit>,
}

impl ExecState {
    /// State of a process that exited with `code`
    pub fn exited(code: i32) -> Self {
        Self {
            exited: true,
            exit_code: code,
            ..Default::default()
        }
    }

    /// State carrying only an error
    pub fn failed(err: impl Into<String>) -> Self {
        Self {
            err: Some(err.into()),
            ..Default::default()
        }
    }

    /// Check if every breakpoint hit at this stop is trace-only
    ///
    /// False when no breakpoint was hit.
    pub fn is_trace_only(&self) -> bool {
        !self.hits.is_empty() && self.hits.iter().all(|h| h.trace_only)
    }

    /// Check if the run ended with this state
    pub fn is_terminal(&self) -> bool {
        self.exited || (self.err.is_some() && !self.running)
    }
}

/// Aggregated debugger state at the latest stop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub mode: Mode,
    pub status: Status,
    pub exec: ExecState,
    pub current_thread_id: i64,
    /// Current task, the current thread when the backend has no tasks
    pub current_task_id: i64,
    pub current_frame_index: usize,
    /// Breakpoint at the current location, 0 if none
    pub current_break_id: i64,
    pub desired_breaks: Vec<Breakpoint>,
    pub actual_breaks: Vec<Breakpoint>,
    pub threads: Vec<Thread>,
    pub tasks: Vec<Task>,
    pub stack: Vec<StackFrame>,
    /// Arguments and locals of the selected frame
    pub locals: Vec<Variable>,
    pub globals: Vec<Variable>,
    /// Result of the last frame search
    pub find_frames: Vec<StackFrame>,
}

impl Snapshot {
    /// Create an empty snapshot for a session mode
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// The selected frame
    pub fn current_frame(&self) -> Option<&StackFrame> {
        self.stack.get(self.current_frame_index)
    }

    /// Location of the selected frame
    pub fn current_loc(&self) -> Option<&FileLocation> {
        self.current_frame().map(|f| &f.loc).filter(|l| !l.is_unknown())
    }

    /// Status for the stop held in this snapshot
    pub fn stop_status(&self) -> Status {
        if self.exec.exited {
            Status::Finished
        } else if self.exec.err.is_some() {
            Status::Error
        } else if self.exec.running {
            Status::Running
        } else if self.current_break_id != 0 {
            Status::Breakpoint
        } else {
            Status::Stopped
        }
    }

    fn clear_process_state(&mut self) {
        self.threads.clear();
        self.tasks.clear();
        self.stack.clear();
        self.locals.clear();
        self.current_frame_index = 0;
        self.current_break_id = 0;
    }
}

/// Rewrite host thread IDs that do not name a known thread to 0 (parked)
pub fn sanitize_hosts(threads: &[Thread], tasks: &mut [Task]) {
    let known: HashSet<i64> = threads.iter().map(|t| t.id).collect();
    for task in tasks.iter_mut() {
        if task.host_thread_id != 0 && !known.contains(&task.host_thread_id) {
            debug!("Task {} names unknown thread {}", task.id, task.host_thread_id);
            task.host_thread_id = 0;
        }
    }
}

/// ID of the desired breakpoint at `loc`, 0 if none
pub fn resolve_break_id(loc: &FileLocation, desired: &[Breakpoint]) -> i64 {
    desired
        .iter()
        .find(|b| b.enabled && b.loc.same_line(loc))
        .map(|b| b.id)
        .unwrap_or(0)
}

/// Owner of the current [`Snapshot`]
///
/// Every write sequence runs under the exclusive lock so readers always see
/// one consistent stop.
#[derive(Debug, Default)]
pub struct StateAggregator {
    snapshot: RwLock<Snapshot>,
}

impl StateAggregator {
    pub fn new(mode: Mode) -> Self {
        Self {
            snapshot: RwLock::new(Snapshot::new(mode)),
        }
    }

    /// Copy of the current snapshot
    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Forget everything from the previous run
    pub async fn reset(&self) {
        let mut snap = self.snapshot.write().await;
        let mode = snap.mode;
        *snap = Snapshot::new(mode);
    }

    pub async fn set_status(&self, status: Status) {
        self.snapshot.write().await.status = status;
    }

    /// Record that the program runs
    pub async fn mark_running(&self) {
        let mut snap = self.snapshot.write().await;
        snap.exec.running = true;
        snap.current_break_id = 0;
    }

    pub async fn set_next_in_progress(&self, in_progress: bool) {
        self.snapshot.write().await.exec.next_in_progress = in_progress;
    }

    /// Replace the breakpoint lists without touching the process state
    pub async fn set_breaks(&self, desired: Vec<Breakpoint>, actual: Option<Vec<Breakpoint>>) {
        let mut snap = self.snapshot.write().await;
        if let Some(actual) = actual {
            snap.actual_breaks = actual;
        }
        if let Some(frame) = snap.stack.first() {
            let loc = frame.loc.clone();
            if !snap.exec.running && !snap.exec.exited {
                snap.current_break_id = resolve_break_id(&loc, &desired);
            }
        }
        snap.desired_breaks = desired;
    }

    /// Take in a stop reported by the backend
    ///
    /// Reloads threads, tasks, the current stack and the locals of frame 0,
    /// then resolves the breakpoint at the current location. Returns the
    /// status for the stop.
    pub async fn ingest(
        &self,
        backend: &dyn Backend,
        exec: ExecState,
        desired: Vec<Breakpoint>,
        actual: Vec<Breakpoint>,
    ) -> Result<Status> {
        let mut snap = self.snapshot.write().await;
        snap.desired_breaks = desired;
        snap.actual_breaks = actual;
        let result = Self::init_all(&mut snap, backend, exec).await;
        let current_break_id = match snap.stack.first() {
            Some(frame) if !snap.exec.running && !snap.exec.exited => resolve_break_id(&frame.loc, &snap.desired_breaks),
            _ => 0,
        };
        snap.current_break_id = current_break_id;
        let status = snap.stop_status();
        snap.status = status;
        result.map(|_| status)
    }

    async fn init_all(snap: &mut Snapshot, backend: &dyn Backend, exec: ExecState) -> Result<()> {
        snap.current_thread_id = exec.current_thread_id;
        snap.current_task_id = if backend.has_tasks() {
            exec.current_task_id
        } else {
            exec.current_thread_id
        };
        let finished = exec.exited || exec.running;
        snap.exec = exec;
        snap.clear_process_state();
        if finished {
            return Ok(());
        }

        snap.threads = backend.list_threads().await?;
        if backend.has_tasks() {
            let mut tasks = backend.list_tasks().await?;
            sanitize_hosts(&snap.threads, &mut tasks);
            snap.tasks = tasks;
        }
        Self::load_stack(snap, backend).await
    }

    /// Load the stack of the current task and the variables of the selected frame
    async fn load_stack(snap: &mut Snapshot, backend: &dyn Backend) -> Result<()> {
        snap.stack.clear();
        snap.locals.clear();
        if snap.current_task_id == 0 {
            return Ok(());
        }
        snap.stack = backend.stack(snap.current_task_id, STACK_DEPTH).await?;
        if snap.current_frame_index >= snap.stack.len() {
            snap.current_frame_index = 0;
        }

        let func_name = snap
            .tasks
            .iter()
            .find(|t| t.id == snap.current_task_id)
            .map(|t| t.func_name.clone())
            .or_else(|| snap.stack.first().map(|f| f.func_name.clone()))
            .unwrap_or_default();
        if func_name.is_empty() || snap.stack.is_empty() {
            return Ok(());
        }

        let idx = snap.current_frame_index;
        match backend.list_locals(snap.current_task_id, idx).await {
            Ok(vars) => {
                let (args, locals): (Vec<Variable>, Vec<Variable>) = vars.iter().cloned().partition(|v| v.is_arg);
                let frame = &mut snap.stack[idx];
                frame.args = args;
                frame.locals = locals;
                snap.locals = vars;
            }
            Err(e) => warn!("Failed to load locals of frame {}: {}", idx, e),
        }
        Ok(())
    }

    /// Select a frame of the current stack
    ///
    /// Stack and locals are reloaded only when the selection changes.
    pub async fn set_frame(&self, backend: &dyn Backend, idx: usize) -> Result<()> {
        let mut snap = self.snapshot.write().await;
        if idx >= snap.stack.len() {
            return Err(DebugError::FrameOutOfRange(idx));
        }
        if idx == snap.current_frame_index {
            return Ok(());
        }
        snap.current_frame_index = idx;
        Self::load_stack(&mut snap, backend).await
    }

    /// Take in the state after switching thread or task
    ///
    /// Always reloads the stack and locals of the new selection.
    pub async fn select(&self, backend: &dyn Backend, exec: ExecState) -> Result<()> {
        let mut snap = self.snapshot.write().await;
        snap.current_thread_id = exec.current_thread_id;
        snap.current_task_id = if backend.has_tasks() {
            exec.current_task_id
        } else {
            exec.current_thread_id
        };
        snap.current_frame_index = 0;
        snap.exec = exec;
        Self::load_stack(&mut snap, backend).await?;
        let current_break_id = match snap.stack.first() {
            Some(frame) => resolve_break_id(&frame.loc, &snap.desired_breaks),
            None => 0,
        };
        snap.current_break_id = current_break_id;
        Ok(())
    }

    /// Search every task for frames in `path` and keep the result
    pub async fn find_frames(&self, backend: &dyn Backend, path: &str, line: u32) -> Result<Vec<StackFrame>> {
        let frames = backend.find_frames(path, line).await?;
        self.snapshot.write().await.find_frames = frames.clone();
        Ok(frames)
    }

    /// Load package variables matching `filter` and keep the result
    pub async fn list_globals(&self, backend: &dyn Backend, filter: &str) -> Result<Vec<Variable>> {
        let globals = backend.list_globals(filter).await?;
        self.snapshot.write().await.globals = globals.clone();
        Ok(globals)
    }

    /// Replace a variable of the selected frame after it changed
    pub async fn update_local(&self, var: &Variable) {
        let mut snap = self.snapshot.write().await;
        if let Some(slot) = snap.locals.iter_mut().find(|v| v.name == var.name) {
            *slot = var.clone();
        }
    }
}
