use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{Mode, SessionParams};
use crate::debugger::breakpoint::{Breakpoint, BreakpointManager};
use crate::debugger::highlight::{line_colors, LineColor, LineHighlighter};
use crate::debugger::output::OutputSink;
use crate::debugger::state::{ExecState, Snapshot, StateAggregator};
use crate::debugger::status::{Status, StatusBus};
use crate::debugger::threads::StackFrame;
use crate::debugger::variables::{render, RenderOpts, Variable};
use crate::error::{DebugError, Result};
use crate::platform::{Backend, Capability, ExecStream, Registry};

/// The single-step commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Next source line in the current function
    Over,
    /// Next source line, entering calls
    Into,
    /// Return from the current function
    Out,
    /// One machine instruction
    Single,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Over => "step over",
            StepKind::Into => "step into",
            StepKind::Out => "step out",
            StepKind::Single => "step a single instruction",
        }
    }
}

/// State shared with the continue task
struct Inner {
    backend: Arc<dyn Backend>,
    params: SessionParams,
    /// Desired breakpoints, edited by the user and synced before every run
    breaks: Mutex<BreakpointManager>,
    state: StateAggregator,
    status: StatusBus,
    out: OutputSink,
    /// Project root, used for links in the output
    root: Option<PathBuf>,
}

impl Inner {
    /// Publish a status and record it in the snapshot
    async fn set_status(&self, status: Status) {
        self.state.set_status(status).await;
        self.status.emit(status);
    }

    /// Surface an error as a status transition
    async fn fail(&self, err: &DebugError) {
        error!("{}", err);
        self.set_status(Status::Error).await;
    }

    async fn publish_breaks(&self) {
        let desired = self.breaks.lock().await.desired().to_vec();
        self.state.set_breaks(desired, None).await;
    }

    /// Push the desired breakpoints to the backend
    async fn sync_breaks(&self) -> Result<()> {
        let mut breaks = self.breaks.lock().await;
        breaks.sync(self.backend.as_ref(), &self.out).await?;
        let desired = breaks.desired().to_vec();
        drop(breaks);
        self.state.set_breaks(desired, None).await;
        Ok(())
    }

    /// Check if every breakpoint hit at this stop only traces
    async fn is_trace_event(&self, exec: &ExecState) -> bool {
        if exec.hits.is_empty() || exec.exited {
            return false;
        }
        let breaks = self.breaks.lock().await;
        exec.hits
            .iter()
            .all(|h| h.trace_only || breaks.by_id(h.id).map_or(false, |b| b.trace_only))
    }

    /// Aggregate a stop and return its status
    async fn ingest(&self, exec: ExecState) -> Status {
        let actual = if exec.exited || exec.running {
            None
        } else {
            match self.backend.list_breaks().await {
                Ok(actual) => Some(actual),
                Err(e) => {
                    debug!("Breakpoints unavailable at stop: {}", e);
                    None
                }
            }
        };
        let desired = {
            let mut breaks = self.breaks.lock().await;
            if let Some(actual) = &actual {
                breaks.merge_actual(actual);
            }
            breaks.desired().to_vec()
        };
        match self
            .state
            .ingest(self.backend.as_ref(), exec, desired, actual.unwrap_or_default())
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to load stop state: {}", e);
                self.out.write_line(format!("Failed to load program state: {}", e));
                self.state.set_status(Status::Error).await;
                Status::Error
            }
        }
    }

    /// Read a continue stream until it closes
    async fn consume(self: Arc<Self>, mut stream: ExecStream) {
        let mut last = None;
        while let Some(exec) = stream.next().await {
            if self.is_trace_event(&exec).await {
                for hit in &exec.hits {
                    self.out.write_line(format!("Trace: {} {}:{}", hit.id, hit.loc.path, hit.loc.line));
                }
                continue;
            }
            let status = self.ingest(exec).await;
            self.status.emit(status);
            last = Some(status);
        }
        match last {
            Some(status) if status != Status::Running => debug!("Run ended with status {}", status),
            _ => {
                warn!("{}", DebugError::StreamClosed);
                self.state.set_status(Status::Finished).await;
                self.status.emit(Status::Finished);
            }
        }
    }
}

/// Execution controller
///
/// Drives one debugger session: owns the breakpoint list, runs the
/// continue stream on a task and turns backend results into status
/// transitions. Every other component only returns errors; this is where
/// they become `Error`.
pub struct Debugger {
    inner: Arc<Inner>,
    /// The continue stream being consumed, if any
    run_task: StdMutex<Option<JoinHandle<()>>>,
    /// Lines coloured by the last highlight update
    painted: StdMutex<HashMap<(String, u32), LineColor>>,
}

impl Debugger {
    /// Create a controller around a backend
    pub fn new(backend: Arc<dyn Backend>, params: SessionParams, out: OutputSink, root: Option<PathBuf>) -> Self {
        let status = params.status.clone();
        let state = StateAggregator::new(params.mode);
        Self {
            inner: Arc::new(Inner {
                backend,
                params,
                breaks: Mutex::new(BreakpointManager::new()),
                state,
                status,
                out,
                root,
            }),
            run_task: StdMutex::new(None),
            painted: StdMutex::new(HashMap::new()),
        }
    }

    /// Create a controller with the backend registered for the source at `path`
    pub fn for_path(
        registry: &Registry,
        path: &Path,
        params: SessionParams,
        out: OutputSink,
        root: Option<PathBuf>,
    ) -> Result<Self> {
        let backend = registry.create_for_path(path)?;
        Ok(Self::new(backend, params, out, root))
    }

    pub fn mode(&self) -> Mode {
        self.inner.params.mode
    }

    /// Latest published status
    pub fn status(&self) -> Status {
        self.inner.status.current()
    }

    pub fn is_active(&self) -> bool {
        self.inner.backend.is_active()
    }

    /// Process ID of the debugged program, 0 if unknown
    pub fn pid(&self) -> u32 {
        self.inner.backend.pid()
    }

    /// Run `cb` on a task for every distinct status transition
    pub fn on_status<F>(&self, cb: F) -> JoinHandle<()>
    where
        F: FnMut(Status) + Send + 'static,
    {
        self.inner.status.on_status(cb)
    }

    /// Copy of the aggregated state
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.state.snapshot().await
    }

    fn abort_run(&self) {
        if let Ok(mut task) = self.run_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }

    fn is_running_task(&self) -> bool {
        self.run_task
            .lock()
            .map(|t| t.as_ref().map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Wait until the current continue stream is consumed
    pub async fn wait_run(&self) {
        let handle = self.run_task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Continue task failed: {}", e);
                }
            }
        }
    }

    // --------------------------------- session -----------------------------------------------------

    /// Start a session for `exe_path`
    ///
    /// The status goes `Building` then `Ready`. May be called again after
    /// any error.
    pub async fn start(&self, exe_path: &Path) -> Result<()> {
        self.abort_run();
        self.inner.state.reset().await;
        self.inner.set_status(Status::Building).await;
        info!("Starting {} session for {}", self.mode(), exe_path.display());

        let root = self.inner.root.clone().unwrap_or_default();
        let started = self
            .inner
            .backend
            .start(exe_path, &root, self.inner.out.clone(), &self.inner.params)
            .await;
        match started {
            Ok(()) => {
                let status = self.inner.status.current();
                if status == Status::Building || status == Status::Ready {
                    self.inner.set_status(Status::Ready).await;
                } else {
                    self.inner.state.set_status(status).await;
                }
                self.inner.publish_breaks().await;
                Ok(())
            }
            Err(e) => {
                self.inner.fail(&e).await;
                Err(e)
            }
        }
    }

    /// End the session, killing the program unless it was attached to
    pub async fn stop(&self) -> Result<()> {
        self.detach(self.mode() != Mode::Attach).await
    }

    /// Detach from the program
    pub async fn detach(&self, kill: bool) -> Result<()> {
        let result = self.inner.backend.detach(kill).await;
        self.abort_run();
        match result {
            Ok(()) => {
                self.inner.set_status(Status::Finished).await;
                Ok(())
            }
            Err(e) if e.is_not_started() => Err(e),
            Err(e) => {
                self.inner.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Restart the program from the beginning, keeping the breakpoints
    pub async fn restart(&self) -> Result<()> {
        self.restart_with(None).await
    }

    /// Restart from a recorded position
    pub async fn restart_from(&self, pos: &str, reset_args: bool, new_args: &[String]) -> Result<()> {
        self.restart_with(Some((pos, reset_args, new_args))).await
    }

    async fn restart_with(&self, from: Option<(&str, bool, &[String])>) -> Result<()> {
        let status = self.status();
        if matches!(status, Status::NotInitialized | Status::Building) {
            return Err(DebugError::InvalidState { op: "restart", status });
        }
        self.abort_run();
        let result = match from {
            None => self.inner.backend.restart().await,
            Some((pos, reset_args, new_args)) => self.inner.backend.restart_from(pos, reset_args, new_args).await,
        };
        if let Err(e) = result {
            self.inner.fail(&e).await;
            return Err(e);
        }
        self.inner.breaks.lock().await.restore_backup();
        self.inner.state.reset().await;
        self.inner.set_status(Status::Ready).await;
        self.inner.publish_breaks().await;
        info!("Restarted");
        Ok(())
    }

    // --------------------------------- execution ---------------------------------------------------

    /// Resume the program
    ///
    /// Returns once `Running` is published; stops arrive on the status bus.
    pub async fn continue_exec(&self) -> Result<()> {
        self.run(false).await
    }

    /// Resume the program backwards
    pub async fn reverse_continue(&self) -> Result<()> {
        if !self.inner.backend.capability(Capability::Reverse) {
            return Err(DebugError::Unsupported(Capability::Reverse.as_str()));
        }
        self.run(true).await
    }

    async fn run(&self, reverse: bool) -> Result<()> {
        let status = self.status();
        if !status.can_continue() || self.is_running_task() {
            return Err(DebugError::InvalidState { op: "continue", status });
        }
        self.inner.sync_breaks().await?;

        self.inner.state.mark_running().await;
        self.inner.set_status(Status::Running).await;
        let stream = if reverse {
            self.inner.backend.rewind()
        } else {
            self.inner.backend.continue_exec()
        };
        let handle = tokio::spawn(self.inner.clone().consume(stream));
        if let Ok(mut task) = self.run_task.lock() {
            *task = Some(handle);
        }
        Ok(())
    }

    pub async fn step_over(&self) -> Result<Status> {
        self.step(StepKind::Over).await
    }

    pub async fn step_into(&self) -> Result<Status> {
        self.step(StepKind::Into).await
    }

    pub async fn step_out(&self) -> Result<Status> {
        self.step(StepKind::Out).await
    }

    pub async fn step_single(&self) -> Result<Status> {
        self.step(StepKind::Single).await
    }

    /// Run one step and return the status of the stop it ends at
    pub async fn step(&self, kind: StepKind) -> Result<Status> {
        let status = self.status();
        let in_progress = self.inner.state.snapshot().await.exec.next_in_progress;
        if !status.is_stopped() || in_progress {
            return Err(DebugError::InvalidState { op: kind.as_str(), status });
        }
        self.inner.sync_breaks().await?;

        self.inner.state.mark_running().await;
        self.inner.set_status(Status::Running).await;
        let backend = self.inner.backend.as_ref();
        let result = match kind {
            StepKind::Over => backend.next().await,
            StepKind::Into => backend.step().await,
            StepKind::Out => backend.step_out().await,
            StepKind::Single => backend.step_single().await,
        };
        match result {
            Ok(exec) => {
                let status = self.inner.ingest(exec).await;
                self.inner.status.emit(status);
                Ok(status)
            }
            Err(e) => {
                warn!("{} failed: {}", kind.as_str(), e);
                match backend.state().await {
                    Ok(exec) => {
                        let status = self.inner.ingest(exec).await;
                        self.inner.status.emit(status);
                    }
                    Err(_) => self.inner.fail(&e).await,
                }
                Err(e)
            }
        }
    }

    /// Stop a running program
    pub async fn halt(&self) -> Result<()> {
        if !self.is_active() {
            return Err(DebugError::NotStarted);
        }
        let exec = match self.inner.backend.halt().await {
            Ok(exec) => exec,
            Err(e) => {
                self.inner.fail(&e).await;
                return Err(e);
            }
        };
        // a pending continue reports the stop itself
        if !self.is_running_task() {
            let status = self.inner.ingest(exec).await;
            self.inner.status.emit(status);
        }
        Ok(())
    }

    /// Abandon a step that stopped at a breakpoint before completing
    pub async fn cancel_next(&self) -> Result<()> {
        self.inner.backend.cancel_next().await?;
        self.inner.state.set_next_in_progress(false).await;
        Ok(())
    }

    /// Call a function in the current task
    pub async fn call(&self, expr: &str, unsafe_call: bool) -> Result<Status> {
        let status = self.status();
        if !status.is_stopped() {
            return Err(DebugError::InvalidState { op: "call", status });
        }
        let task_id = self.inner.state.snapshot().await.current_task_id;
        self.inner.set_status(Status::Running).await;
        match self.inner.backend.call(task_id, expr, unsafe_call).await {
            Ok(exec) => {
                let status = self.inner.ingest(exec).await;
                self.inner.status.emit(status);
                Ok(status)
            }
            Err(e) => {
                // the call failed before the program resumed
                self.inner.set_status(status).await;
                Err(e)
            }
        }
    }

    // --------------------------------- inspection --------------------------------------------------

    /// Select a frame of the current stack
    pub async fn set_frame(&self, idx: usize) -> Result<()> {
        self.inner.state.set_frame(self.inner.backend.as_ref(), idx).await
    }

    pub async fn switch_thread(&self, id: i64) -> Result<()> {
        let exec = self.inner.backend.switch_thread(id).await?;
        self.inner.state.select(self.inner.backend.as_ref(), exec).await
    }

    pub async fn switch_task(&self, id: i64) -> Result<()> {
        let exec = self.inner.backend.switch_task(id).await?;
        self.inner.state.select(self.inner.backend.as_ref(), exec).await
    }

    async fn scope(&self) -> (i64, usize) {
        let snap = self.inner.state.snapshot().await;
        (snap.current_task_id, snap.current_frame_index)
    }

    /// Evaluate an expression in the selected frame and render its value
    pub async fn var_value(&self, expr: &str) -> Result<String> {
        let (task, frame) = self.scope().await;
        let var = self.inner.backend.get_var(expr, task, frame).await?;
        Ok(render(&var, &RenderOpts::from_params(&self.inner.params.get_vars, false)))
    }

    /// Evaluate an expression in the selected frame, following a top-level pointer
    pub async fn show_var(&self, expr: &str) -> Result<Variable> {
        let (task, frame) = self.scope().await;
        let mut var = self.inner.backend.get_var(expr, task, frame).await?;
        if var.pointee_request().is_some() {
            if let Err(e) = self.inner.backend.follow_ptr(&mut var).await {
                debug!("Could not follow {}: {}", expr, e);
            }
        }
        Ok(var)
    }

    /// Load the pointee of a lazily loaded pointer
    pub async fn follow_ptr(&self, var: &mut Variable) -> Result<()> {
        self.inner.backend.follow_ptr(var).await?;
        self.inner.state.update_local(var).await;
        Ok(())
    }

    /// Assign a value to a variable of the selected frame
    pub async fn set_var(&self, name: &str, value: &str) -> Result<()> {
        let (task, frame) = self.scope().await;
        self.inner.backend.set_var(name, value, task, frame).await?;
        match self.inner.backend.get_var(name, task, frame).await {
            Ok(var) => self.inner.state.update_local(&var).await,
            Err(e) => debug!("Could not reload {}: {}", name, e),
        }
        Ok(())
    }

    /// Frames of every task in files whose path contains `path`, nearest `line` first
    pub async fn find_frames(&self, path: &str, line: u32) -> Result<Vec<StackFrame>> {
        self.inner.state.find_frames(self.inner.backend.as_ref(), path, line).await
    }

    pub async fn list_globals(&self, filter: &str) -> Result<Vec<Variable>> {
        self.inner.state.list_globals(self.inner.backend.as_ref(), filter).await
    }

    pub async fn list_sources(&self, filter: &str) -> Result<Vec<String>> {
        self.inner.backend.list_sources(filter).await
    }

    pub async fn list_funcs(&self, filter: &str) -> Result<Vec<String>> {
        self.inner.backend.list_funcs(filter).await
    }

    pub async fn list_types(&self, filter: &str) -> Result<Vec<String>> {
        self.inner.backend.list_types(filter).await
    }

    // --------------------------------- breakpoints -------------------------------------------------

    /// Desired breakpoints
    pub async fn breakpoints(&self) -> Vec<Breakpoint> {
        self.inner.breaks.lock().await.desired().to_vec()
    }

    /// Add a breakpoint at a line, or remove the one already there
    ///
    /// Returns true if a breakpoint was added.
    pub async fn toggle_break(&self, path: &str, line: u32) -> bool {
        let added = self.inner.breaks.lock().await.toggle_break(path, line);
        self.inner.publish_breaks().await;
        added
    }

    /// Add a plain breakpoint at a line, keeping one already there
    ///
    /// Returns false if the line already had a breakpoint.
    pub async fn add_break(&self, path: &str, line: u32) -> bool {
        let added = self.inner.breaks.lock().await.add_break(path, line);
        if added {
            self.inner.publish_breaks().await;
        }
        added
    }

    /// Set a breakpoint at a line with the given settings
    pub async fn set_break(&self, path: &str, line: u32, condition: Option<String>, trace_only: bool) -> Result<()> {
        {
            let mut breaks = self.inner.breaks.lock().await;
            breaks.add_break(path, line);
            breaks.set_condition(path, line, condition)?;
            breaks.set_trace(path, line, trace_only)?;
        }
        self.inner.publish_breaks().await;
        Ok(())
    }

    pub async fn clear_break(&self, path: &str, line: u32) -> Result<()> {
        let removed = self.inner.breaks.lock().await.delete_break(path, line);
        if removed.is_none() {
            return Err(DebugError::NoBreakpoint(path.to_string(), line));
        }
        self.inner.publish_breaks().await;
        Ok(())
    }

    /// Change the settings of an existing breakpoint
    pub async fn amend_break(
        &self,
        path: &str,
        line: u32,
        enabled: bool,
        condition: Option<String>,
        trace_only: bool,
    ) -> Result<()> {
        {
            let mut breaks = self.inner.breaks.lock().await;
            breaks.set_enabled(path, line, enabled)?;
            breaks.set_condition(path, line, condition)?;
            breaks.set_trace(path, line, trace_only)?;
        }
        self.inner.publish_breaks().await;
        Ok(())
    }

    /// Repaint breakpoint and program counter lines
    pub async fn update_highlights(&self, highlighter: &mut dyn LineHighlighter) {
        let colors = line_colors(&self.snapshot().await);
        let Ok(mut painted) = self.painted.lock() else {
            return;
        };
        for (path, line0) in painted.keys() {
            if !colors.contains_key(&(path.clone(), *line0)) {
                highlighter.clear_line_color(path, *line0);
            }
        }
        for ((path, line0), color) in &colors {
            if painted.get(&(path.clone(), *line0)) != Some(color) {
                highlighter.set_line_color(path, *line0, *color);
            }
        }
        *painted = colors;
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        self.abort_run();
    }
}
