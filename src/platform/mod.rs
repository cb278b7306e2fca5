//! Debugger backends
//!
//! A backend adapts one concrete debugger to the narrow [`Backend`]
//! interface. The [`Registry`] picks a backend from the kind of the source
//! file being debugged; it is the only place where file kinds and concrete
//! backends meet.

pub mod delve;
pub mod stub;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use log::{debug, info};

use crate::config::SessionParams;
use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::output::OutputSink;
use crate::debugger::state::ExecState;
use crate::debugger::threads::{StackFrame, Task, Thread};
use crate::debugger::variables::Variable;
use crate::error::{DebugError, Result};

/// Depth of the stacks collected when searching frames
pub const FIND_FRAMES_DEPTH: usize = 100;

/// Stream of execution states produced by a continue
pub type ExecStream = BoxStream<'static, ExecState>;

/// Optional backend features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Execution can run backwards
    Reverse,
}

impl Capability {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Reverse => "reverse",
        }
    }
}

/// Kind of source file, used to choose a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Go,
    Unknown,
}

impl SourceKind {
    /// Classify a path by its extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("go") => SourceKind::Go,
            _ => SourceKind::Unknown,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Go => write!(f, "go"),
            SourceKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Interface to a concrete debugger
///
/// Line numbers are 1-based everywhere. Every call made before [`Backend::start`]
/// completed, or after the debugger went away, fails with
/// [`DebugError::NotStarted`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start the debugger for `exe_path` and wait until it accepts requests
    async fn start(&self, exe_path: &Path, root_path: &Path, out: OutputSink, params: &SessionParams) -> Result<()>;

    /// Check if a debugger process is running and connected
    fn is_active(&self) -> bool;

    /// Process ID of the debugged program, 0 if unknown
    fn pid(&self) -> u32;

    /// Modification time of the debugged executable
    async fn last_modified(&self) -> Result<DateTime<Utc>>;

    /// Detach from the program, killing it when `kill` is set
    async fn detach(&self, kill: bool) -> Result<()>;

    /// Drop the connection, optionally resuming the program first
    async fn disconnect(&self, cont: bool) -> Result<()>;

    /// Restart the program from the beginning
    async fn restart(&self) -> Result<()>;

    /// Restart from a recorded position, optionally replacing the program arguments
    async fn restart_from(&self, pos: &str, reset_args: bool, new_args: &[String]) -> Result<()>;

    /// Current execution state
    async fn state(&self) -> Result<ExecState>;

    /// Resume execution; the stream yields every stop and closes when the run ends
    fn continue_exec(&self) -> ExecStream;

    /// Resume execution backwards; only when [`Capability::Reverse`] is offered
    fn rewind(&self) -> ExecStream;

    /// Step over to the next source line
    async fn next(&self) -> Result<ExecState>;

    /// Step into the next source line
    async fn step(&self) -> Result<ExecState>;

    /// Step out of the current function
    async fn step_out(&self) -> Result<ExecState>;

    /// Step a single machine instruction
    async fn step_single(&self) -> Result<ExecState>;

    /// Call a function in the program
    async fn call(&self, task_id: i64, expr: &str, unsafe_call: bool) -> Result<ExecState>;

    /// Make `id` the current thread
    async fn switch_thread(&self, id: i64) -> Result<ExecState>;

    /// Make `id` the current task
    async fn switch_task(&self, id: i64) -> Result<ExecState>;

    /// Stop a running program
    async fn halt(&self) -> Result<ExecState>;

    async fn list_threads(&self) -> Result<Vec<Thread>>;

    async fn get_thread(&self, id: i64) -> Result<Thread>;

    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// Frames of a task, innermost first
    async fn stack(&self, task_id: i64, depth: usize) -> Result<Vec<StackFrame>>;

    /// Package level variables whose name matches the `filter` regex
    async fn list_globals(&self, filter: &str) -> Result<Vec<Variable>>;

    /// Arguments and locals of a frame
    async fn list_locals(&self, task_id: i64, frame: usize) -> Result<Vec<Variable>>;

    /// Evaluate an expression in a frame
    async fn get_var(&self, expr: &str, task_id: i64, frame: usize) -> Result<Variable>;

    /// Load the pointee of a lazily loaded pointer, a no-op if already loaded
    async fn follow_ptr(&self, var: &mut Variable) -> Result<()>;

    /// Assign `value` to the variable `name`
    async fn set_var(&self, name: &str, value: &str, task_id: i64, frame: usize) -> Result<()>;

    async fn list_sources(&self, filter: &str) -> Result<Vec<String>>;

    async fn list_funcs(&self, filter: &str) -> Result<Vec<String>>;

    async fn list_types(&self, filter: &str) -> Result<Vec<String>>;

    /// Create a breakpoint, returning it with its assigned ID
    async fn create_break(&self, bp: &Breakpoint) -> Result<Breakpoint>;

    async fn get_break(&self, id: i64) -> Result<Breakpoint>;

    async fn list_breaks(&self) -> Result<Vec<Breakpoint>>;

    async fn clear_break(&self, id: i64) -> Result<Breakpoint>;

    /// Update condition and trace flag of an existing breakpoint
    async fn amend_break(&self, bp: &Breakpoint) -> Result<()>;

    /// Abandon an in-progress step
    async fn cancel_next(&self) -> Result<()>;

    /// Check if the backend reports tasks in addition to threads
    fn has_tasks(&self) -> bool;

    /// Check if an optional feature is available
    fn capability(&self, cap: Capability) -> bool;

    /// Frames of every task located in a file whose path contains `path`
    ///
    /// Keeps the first matching frame per task and orders them by distance to
    /// `line`.
    async fn find_frames(&self, path: &str, line: u32) -> Result<Vec<StackFrame>> {
        let owners: Vec<i64> = if self.has_tasks() {
            self.list_tasks().await?.into_iter().map(|t| t.id).collect()
        } else {
            self.list_threads().await?.into_iter().map(|t| t.id).collect()
        };
        let mut found = Vec::new();
        for id in owners {
            let frames = match self.stack(id, FIND_FRAMES_DEPTH).await {
                Ok(frames) => frames,
                Err(e) => {
                    debug!("Skipping stack of {}: {}", id, e);
                    continue;
                }
            };
            if let Some(frame) = frames.into_iter().find(|f| f.loc.path.contains(path)) {
                found.push(frame);
            }
        }
        sort_by_line_distance(&mut found, line);
        Ok(found)
    }
}

/// Order frames by how far their line is from `line`
pub fn sort_by_line_distance(frames: &mut [StackFrame], line: u32) {
    frames.sort_by_key(|f| f.loc.line.abs_diff(line));
}

/// Creates backends of one kind
pub type BackendFactory = Arc<dyn Fn() -> Arc<dyn Backend> + Send + Sync>;

/// Maps a path to its source kind
pub type KindResolver = Arc<dyn Fn(&Path) -> SourceKind + Send + Sync>;

/// Backend factories by source kind
#[derive(Clone)]
pub struct Registry {
    factories: HashMap<SourceKind, BackendFactory>,
    resolver: KindResolver,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry resolving kinds by file extension
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            resolver: Arc::new(SourceKind::from_path),
        }
    }

    /// Register every backend whose runtime prerequisites are present
    ///
    /// Source kinds without a usable backend get the stub.
    pub fn with_defaults(debugger: &str) -> Self {
        let mut registry = Self::new();
        match which::which(debugger) {
            Ok(path) => {
                info!("Using debugger {}", path.display());
                registry.register(SourceKind::Go, delve_factory(path));
            }
            Err(e) => {
                info!("Debugger `{}` not available ({}), registering stub", debugger, e);
                registry.register(SourceKind::Go, Arc::new(|| Arc::new(stub::StubBackend) as Arc<dyn Backend>));
            }
        }
        registry
    }

    /// Replace the file kind resolver
    pub fn set_resolver(&mut self, resolver: KindResolver) {
        self.resolver = resolver;
    }

    /// Register a factory for a source kind
    pub fn register(&mut self, kind: SourceKind, factory: BackendFactory) {
        debug!("Registering backend for {}", kind);
        self.factories.insert(kind, factory);
    }

    /// Check if a kind has a backend
    pub fn supports(&self, kind: SourceKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Kind of the source at `path`
    pub fn kind_of(&self, path: &Path) -> SourceKind {
        (self.resolver)(path)
    }

    /// Create a backend for a source kind
    pub fn create(&self, kind: SourceKind) -> Result<Arc<dyn Backend>> {
        self.factories.get(&kind).map(|f| f()).ok_or(DebugError::NoBackend(kind))
    }

    /// Create a backend for the source at `path`
    ///
    /// Directories are classified by the kinds of the files they contain.
    pub fn create_for_path(&self, path: &Path) -> Result<Arc<dyn Backend>> {
        let mut kind = self.kind_of(path);
        if kind == SourceKind::Unknown && path.is_dir() {
            kind = std::fs::read_dir(path)?
                .filter_map(|e| e.ok())
                .map(|e| self.kind_of(&e.path()))
                .find(|k| *k != SourceKind::Unknown)
                .unwrap_or(SourceKind::Unknown);
        }
        self.create(kind)
    }
}

fn delve_factory(binary: PathBuf) -> BackendFactory {
    Arc::new(move || Arc::new(delve::DelveBackend::new(binary.clone())) as Arc<dyn Backend>)
}
