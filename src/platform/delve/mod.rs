//! Backend for the Delve debugger
//!
//! The debugger runs headless as a child process (see [`supervisor`]) and is
//! driven over its JSON-RPC API (see [`rpc`]). Everything Delve specific is
//! converted into the core model at this boundary.

pub mod api;
pub mod convert;
pub mod expr;
pub mod rpc;
pub mod supervisor;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{Mode, SessionParams};
use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::output::OutputSink;
use crate::debugger::state::ExecState;
use crate::debugger::threads::{StackFrame, Task, Thread};
use crate::debugger::variables::{decode, decode_all, RawValue, Variable};
use crate::error::{DebugError, Result};
use crate::platform::{Backend, Capability, ExecStream};

use api::{command, DebuggerCommand, EvalScope, LoadConfig};
use expr::quote_package_path;
use rpc::RpcClient;
use supervisor::{Launch, Supervisor};

/// Stops buffered between the continue task and its consumer
const STREAM_CAPACITY: usize = 16;

/// A connected debugger
struct Session {
    client: RpcClient,
    /// Absent when connected to a debugger started elsewhere
    supervisor: Option<Supervisor>,
    out: OutputSink,
    list_cfg: LoadConfig,
    get_cfg: LoadConfig,
    /// Scope of the last variable request, used to follow pointers
    last_scope: Mutex<EvalScope>,
    pid: u32,
    recorded: bool,
}

impl Session {
    fn is_started(&self) -> bool {
        !self.client.is_closed() && self.supervisor.as_ref().map_or(true, Supervisor::is_alive)
    }

    /// Call a method, logging failures to the output
    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let result = self.client.call(method, params).await;
        if let Err(e) = &result {
            if self.exited_state(e).is_none() {
                warn!("{} failed: {}", method, e);
                self.out.write_line(e.to_string());
            }
        }
        result
    }

    /// Call a method, leaving failures to the caller
    async fn call_quiet<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.client.call(method, params).await
    }

    /// State to report when `e` means the program or the debugger is gone
    fn exited_state(&self, e: &DebugError) -> Option<ExecState> {
        match e {
            DebugError::Rpc { message, .. } => convert::exited_status(message).map(ExecState::exited),
            DebugError::StreamClosed | DebugError::NotStarted | DebugError::Io(_) => {
                let reason = self
                    .supervisor
                    .as_ref()
                    .and_then(Supervisor::exit_error)
                    .unwrap_or_else(|| e.to_string());
                Some(ExecState {
                    exited: true,
                    err: Some(reason),
                    ..Default::default()
                })
            }
            _ => None,
        }
    }

    async fn command(&self, cmd: DebuggerCommand) -> Result<ExecState> {
        match self.call::<_, api::CommandOut>("Command", &cmd).await {
            Ok(out) => Ok(convert::exec_state(&out.state)),
            Err(e) => self.exited_state(&e).ok_or(e),
        }
    }

    async fn state(&self) -> Result<ExecState> {
        match self.call::<_, api::StateOut>("State", &api::StateIn { non_blocking: true }).await {
            Ok(out) => Ok(out.state.as_ref().map(convert::exec_state).unwrap_or_default()),
            Err(e) => self.exited_state(&e).ok_or(e),
        }
    }

    fn remember_scope(&self, scope: EvalScope) {
        if let Ok(mut last) = self.last_scope.lock() {
            *last = scope;
        }
    }

    fn last_scope(&self) -> EvalScope {
        self.last_scope.lock().map(|s| *s).unwrap_or_default()
    }

    async fn eval(&self, expr: &str, scope: EvalScope, cfg: LoadConfig) -> Result<RawValue> {
        let params = api::EvalIn {
            scope,
            expr: quote_package_path(expr),
            cfg: Some(cfg),
        };
        let out: api::EvalOut = self.call_quiet("Eval", &params).await.map_err(|e| match e {
            DebugError::Rpc { message, .. } => DebugError::InvalidExpr {
                expr: expr.to_string(),
                message,
            },
            other => other,
        })?;
        let var = out
            .variable
            .ok_or_else(|| DebugError::Decode(format!("no value for `{}`", expr)))?;
        Ok(RawValue {
            name: expr.to_string(),
            ..convert::raw_value(&var)
        })
    }

    /// Load lazily loaded pointees of listed variables with the listing limits
    async fn complete_pointees(&self, vars: &mut [Variable], scope: EvalScope) {
        for var in vars.iter_mut() {
            let Some(request) = var.pointee_request() else {
                continue;
            };
            match self.eval(&request, scope, self.list_cfg).await {
                Ok(raw) => var.attach_pointee(decode(&raw)),
                Err(e) => {
                    debug!("Could not load pointee {}: {}", request, e);
                    var.mark_followed();
                }
            }
        }
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

/// Drives a headless `dlv` process
pub struct DelveBackend {
    binary: PathBuf,
    session: RwLock<Option<Arc<Session>>>,
}

impl DelveBackend {
    /// Create a backend spawning `binary`
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            session: RwLock::new(None),
        }
    }

    /// Connect to a headless debugger that is already listening at `endpoint`
    pub async fn connect(&self, endpoint: &str, out: OutputSink, params: &SessionParams) -> Result<()> {
        let client = RpcClient::connect(endpoint).await?;
        self.open(client, None, out, params).await
    }

    async fn open(
        &self,
        client: RpcClient,
        supervisor: Option<Supervisor>,
        out: OutputSink,
        params: &SessionParams,
    ) -> Result<()> {
        let pid = match params.mode {
            Mode::Attach => params.pid.unwrap_or(0),
            _ => match client.call::<_, api::ProcessPidOut>("ProcessPid", &api::Empty {}).await {
                Ok(out) => u32::try_from(out.pid).unwrap_or(0),
                Err(e) => {
                    debug!("Process ID unavailable: {}", e);
                    0
                }
            },
        };
        let recorded = match client.call::<_, api::RecordedOut>("Recorded", &api::Empty {}).await {
            Ok(out) => out.recorded,
            Err(e) => {
                debug!("Recording state unavailable: {}", e);
                false
            }
        };
        info!("Connected to debugger, pid {}, recorded {}", pid, recorded);

        let session = Session {
            client,
            supervisor,
            out,
            list_cfg: LoadConfig::from(&params.list_vars),
            get_cfg: LoadConfig::from(&params.get_vars),
            last_scope: Mutex::new(EvalScope::default()),
            pid,
            recorded,
        };
        if let Ok(mut slot) = self.session.write() {
            *slot = Some(Arc::new(session));
        }
        Ok(())
    }

    /// The current session if it is usable
    fn started(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.clone())
            .filter(|s| s.is_started())
            .ok_or(DebugError::NotStarted)
    }

    fn take_session(&self) -> Option<Arc<Session>> {
        self.session.write().ok().and_then(|mut s| s.take())
    }

    fn run(&self, name: &'static str) -> ExecStream {
        let session = match self.started() {
            Ok(session) => session,
            Err(e) => return stream::once(async move { ExecState::failed(e.to_string()) }).boxed(),
        };
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        tokio::spawn(async move {
            loop {
                let result = session
                    .call::<_, api::CommandOut>("Command", &DebuggerCommand::named(name))
                    .await;
                let (state, again) = match result {
                    Ok(out) => {
                        let again = !out.state.exited && convert::only_tracepoints_hit(&out.state);
                        (convert::exec_state(&out.state), again)
                    }
                    Err(e) => {
                        let state = session
                            .exited_state(&e)
                            .unwrap_or_else(|| ExecState::failed(e.to_string()));
                        (state, false)
                    }
                };
                if tx.send(state).await.is_err() || !again {
                    break;
                }
            }
            debug!("{} stream done", name);
        });
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|state| (state, rx)) }).boxed()
    }

    async fn restart_at(&self, position: &str, reset_args: bool, new_args: &[String]) -> Result<()> {
        let session = self.started()?;
        let params = api::RestartIn {
            position: position.to_string(),
            reset_args,
            new_args: new_args.to_vec(),
            rerecord: false,
            rebuild: false,
        };
        session.call::<_, api::Ignored>("Restart", &params).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for DelveBackend {
    async fn start(&self, exe_path: &Path, root_path: &Path, out: OutputSink, params: &SessionParams) -> Result<()> {
        if let Some(old) = self.take_session() {
            debug!("Dropping previous session");
            old.close().await;
        }
        let launch = Launch::for_session(&self.binary, exe_path, params)?;
        let root = (!root_path.as_os_str().is_empty()).then(|| root_path.to_path_buf());
        let (supervisor, endpoint) = Supervisor::spawn(&launch, out.clone(), params.status.clone(), root).await?;
        let client = match RpcClient::connect(&endpoint).await {
            Ok(client) => client,
            Err(e) => {
                out.write_line(format!("Cannot connect to {}: {}", endpoint, e));
                supervisor.kill();
                return Err(e);
            }
        };
        self.open(client, Some(supervisor), out, params).await
    }

    fn is_active(&self) -> bool {
        self.started().is_ok()
    }

    fn pid(&self) -> u32 {
        self.started().map(|s| s.pid).unwrap_or(0)
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>> {
        let session = self.started()?;
        let out: api::LastModifiedOut = session.call("LastModified", &api::Empty {}).await?;
        DateTime::parse_from_rfc3339(&out.time)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| DebugError::Decode(format!("modification time `{}`: {}", out.time, e)))
    }

    async fn detach(&self, kill: bool) -> Result<()> {
        let session = self.started()?;
        info!("Detaching, kill = {}", kill);
        if let Err(e) = session.call::<_, api::Ignored>("Detach", &api::DetachIn { kill }).await {
            warn!("Detach failed, killing the debugger: {}", e);
            if let Some(supervisor) = &session.supervisor {
                supervisor.kill();
            }
        }
        session.close().await;
        self.take_session();
        Ok(())
    }

    async fn disconnect(&self, cont: bool) -> Result<()> {
        let session = self.started()?;
        if cont {
            session
                .client
                .notify("Command", &DebuggerCommand::named(command::CONTINUE))
                .await?;
        }
        session.close().await;
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.restart_at("", false, &[]).await
    }

    async fn restart_from(&self, pos: &str, reset_args: bool, new_args: &[String]) -> Result<()> {
        self.restart_at(pos, reset_args, new_args).await
    }

    async fn state(&self) -> Result<ExecState> {
        self.started()?.state().await
    }

    fn continue_exec(&self) -> ExecStream {
        self.run(command::CONTINUE)
    }

    fn rewind(&self) -> ExecStream {
        self.run(command::REWIND)
    }

    async fn next(&self) -> Result<ExecState> {
        self.started()?.command(DebuggerCommand::named(command::NEXT)).await
    }

    async fn step(&self) -> Result<ExecState> {
        self.started()?.command(DebuggerCommand::named(command::STEP)).await
    }

    async fn step_out(&self) -> Result<ExecState> {
        self.started()?.command(DebuggerCommand::named(command::STEP_OUT)).await
    }

    async fn step_single(&self) -> Result<ExecState> {
        self.started()?
            .command(DebuggerCommand::named(command::STEP_INSTRUCTION))
            .await
    }

    async fn call(&self, task_id: i64, expr: &str, unsafe_call: bool) -> Result<ExecState> {
        let session = self.started()?;
        let cmd = DebuggerCommand {
            goroutine_id: task_id,
            expr: quote_package_path(expr),
            unsafe_call,
            return_info_load_config: Some(session.list_cfg),
            ..DebuggerCommand::named(command::CALL)
        };
        session.command(cmd).await
    }

    async fn switch_thread(&self, id: i64) -> Result<ExecState> {
        let cmd = DebuggerCommand {
            thread_id: id,
            ..DebuggerCommand::named(command::SWITCH_THREAD)
        };
        self.started()?.command(cmd).await
    }

    async fn switch_task(&self, id: i64) -> Result<ExecState> {
        let session = self.started()?;
        if id == 0 {
            return session.state().await;
        }
        let cmd = DebuggerCommand {
            goroutine_id: id,
            ..DebuggerCommand::named(command::SWITCH_GOROUTINE)
        };
        session.command(cmd).await
    }

    async fn halt(&self) -> Result<ExecState> {
        self.started()?.command(DebuggerCommand::named(command::HALT)).await
    }

    async fn list_threads(&self) -> Result<Vec<Thread>> {
        let out: api::ListThreadsOut = self.started()?.call("ListThreads", &api::Empty {}).await?;
        Ok(out.threads.unwrap_or_default().iter().map(convert::thread).collect())
    }

    async fn get_thread(&self, id: i64) -> Result<Thread> {
        let out: api::GetThreadOut = self.started()?.call("GetThread", &api::GetThreadIn { id }).await?;
        out.thread
            .as_ref()
            .map(convert::thread)
            .ok_or_else(|| DebugError::rpc("GetThread", format!("no thread {}", id)))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let params = api::ListGoroutinesIn { start: 0, count: 0 };
        let out: api::ListGoroutinesOut = self.started()?.call("ListGoroutines", &params).await?;
        Ok(out.goroutines.unwrap_or_default().iter().map(convert::task).collect())
    }

    async fn stack(&self, task_id: i64, depth: usize) -> Result<Vec<StackFrame>> {
        let params = api::StacktraceIn {
            id: task_id,
            depth,
            full: false,
            defers: false,
            opts: 0,
            cfg: None,
        };
        let out: api::StacktraceOut = self.started()?.call("Stacktrace", &params).await?;
        Ok(convert::stack_frames(task_id, &out.locations.unwrap_or_default()))
    }

    async fn list_globals(&self, filter: &str) -> Result<Vec<Variable>> {
        let session = self.started()?;
        let params = api::ListPackageVarsIn {
            filter: filter.to_string(),
            cfg: session.list_cfg,
        };
        let out: api::VariablesOut = session.call("ListPackageVars", &params).await?;
        let raws: Vec<RawValue> = out.variables.unwrap_or_default().iter().map(convert::raw_value).collect();
        let mut vars = decode_all(&raws);
        session.complete_pointees(&mut vars, session.last_scope()).await;
        Ok(vars)
    }

    async fn list_locals(&self, task_id: i64, frame: usize) -> Result<Vec<Variable>> {
        let session = self.started()?;
        let scope = EvalScope::new(task_id, frame);
        session.remember_scope(scope);
        let params = api::ScopeIn {
            scope,
            cfg: session.list_cfg,
        };
        let args: api::ArgsOut = session.call("ListFunctionArgs", &params).await?;
        let locals: api::VariablesOut = session.call("ListLocalVars", &params).await?;

        let mut raws: Vec<RawValue> = args
            .args
            .unwrap_or_default()
            .iter()
            .map(|v| RawValue {
                is_arg: true,
                ..convert::raw_value(v)
            })
            .collect();
        raws.extend(locals.variables.unwrap_or_default().iter().map(convert::raw_value));
        let mut vars = decode_all(&raws);
        session.complete_pointees(&mut vars, scope).await;
        Ok(vars)
    }

    async fn get_var(&self, expr: &str, task_id: i64, frame: usize) -> Result<Variable> {
        let session = self.started()?;
        let scope = EvalScope::new(task_id, frame);
        session.remember_scope(scope);
        match session.eval(expr, scope, session.get_cfg).await {
            Ok(raw) => Ok(decode(&raw)),
            Err(e) => {
                session.out.write_line(e.to_string());
                Err(e)
            }
        }
    }

    async fn follow_ptr(&self, var: &mut Variable) -> Result<()> {
        let Some(request) = var.pointee_request() else {
            return Ok(());
        };
        let session = self.started()?;
        match session.eval(&request, session.last_scope(), session.get_cfg).await {
            Ok(raw) => {
                var.attach_pointee(decode(&raw));
                Ok(())
            }
            Err(e) => {
                var.mark_followed();
                session.out.write_line(e.to_string());
                Err(e)
            }
        }
    }

    async fn set_var(&self, name: &str, value: &str, task_id: i64, frame: usize) -> Result<()> {
        let params = api::SetIn {
            scope: EvalScope::new(task_id, frame),
            symbol: quote_package_path(name),
            value: value.to_string(),
        };
        self.started()?.call::<_, api::Ignored>("Set", &params).await?;
        Ok(())
    }

    async fn list_sources(&self, filter: &str) -> Result<Vec<String>> {
        let params = api::FilterIn { filter: filter.to_string() };
        let out: api::SourcesOut = self.started()?.call("ListSources", &params).await?;
        Ok(out.sources.unwrap_or_default())
    }

    async fn list_funcs(&self, filter: &str) -> Result<Vec<String>> {
        let params = api::FilterIn { filter: filter.to_string() };
        let out: api::FunctionsOut = self.started()?.call("ListFunctions", &params).await?;
        Ok(out.funcs.unwrap_or_default())
    }

    async fn list_types(&self, filter: &str) -> Result<Vec<String>> {
        let params = api::FilterIn { filter: filter.to_string() };
        let out: api::TypesOut = self.started()?.call("ListTypes", &params).await?;
        Ok(out.types.unwrap_or_default())
    }

    async fn create_break(&self, bp: &Breakpoint) -> Result<Breakpoint> {
        let wire = api::Breakpoint {
            id: 0,
            ..convert::wire_breakpoint(bp)
        };
        let out: api::BreakpointOut = self
            .started()?
            .call_quiet("CreateBreakpoint", &api::BreakpointIn { breakpoint: wire })
            .await?;
        out.breakpoint
            .as_ref()
            .map(convert::breakpoint)
            .ok_or_else(|| DebugError::Decode(format!("no breakpoint created at {}", bp.loc)))
    }

    async fn get_break(&self, id: i64) -> Result<Breakpoint> {
        let params = api::BreakpointIdIn { id, name: String::new() };
        let out: api::BreakpointOut = self.started()?.call_quiet("GetBreakpoint", &params).await?;
        out.breakpoint
            .as_ref()
            .map(convert::breakpoint)
            .ok_or_else(|| DebugError::rpc("GetBreakpoint", format!("no breakpoint {}", id)))
    }

    async fn list_breaks(&self) -> Result<Vec<Breakpoint>> {
        let out: api::ListBreakpointsOut = self
            .started()?
            .call_quiet("ListBreakpoints", &api::ListBreakpointsIn { all: false })
            .await?;
        // negative IDs belong to breakpoints the debugger sets for itself
        Ok(out
            .breakpoints
            .unwrap_or_default()
            .iter()
            .filter(|bp| bp.id > 0)
            .map(convert::breakpoint)
            .collect())
    }

    async fn clear_break(&self, id: i64) -> Result<Breakpoint> {
        let params = api::BreakpointIdIn { id, name: String::new() };
        let out: api::BreakpointOut = self.started()?.call_quiet("ClearBreakpoint", &params).await?;
        Ok(out.breakpoint.as_ref().map(convert::breakpoint).unwrap_or_default())
    }

    async fn amend_break(&self, bp: &Breakpoint) -> Result<()> {
        let params = api::BreakpointIn {
            breakpoint: convert::wire_breakpoint(bp),
        };
        self.started()?
            .call_quiet::<_, api::Ignored>("AmendBreakpoint", &params)
            .await?;
        Ok(())
    }

    async fn cancel_next(&self) -> Result<()> {
        self.started()?
            .call::<_, api::Ignored>("CancelNext", &api::Empty {})
            .await?;
        Ok(())
    }

    fn has_tasks(&self) -> bool {
        true
    }

    fn capability(&self, cap: Capability) -> bool {
        match cap {
            Capability::Reverse => self.started().map(|s| s.recorded).unwrap_or(false),
        }
    }
}
