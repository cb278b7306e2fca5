//! Wire types of the Delve JSON-RPC API (version 2)
//!
//! Field names follow Delve's JSON tags; a few Go structs carry no tags and
//! keep their capitalized field names.

use serde::{Deserialize, Serialize};

use crate::config::VarLoadParams;

/// `reflect.Kind` values reported in [`Variable::kind`]
pub mod kind {
    pub const INVALID: u32 = 0;
    pub const BOOL: u32 = 1;
    pub const COMPLEX128: u32 = 16;
    pub const ARRAY: u32 = 17;
    pub const CHAN: u32 = 18;
    pub const FUNC: u32 = 19;
    pub const INTERFACE: u32 = 20;
    pub const MAP: u32 = 21;
    pub const PTR: u32 = 22;
    pub const SLICE: u32 = 23;
    pub const STRING: u32 = 24;
    pub const STRUCT: u32 = 25;
    pub const UNSAFE_POINTER: u32 = 26;
}

/// Variable escaped to the heap
pub const FLAG_ESCAPED: u32 = 1 << 0;
/// Variable is a function argument
pub const FLAG_ARGUMENT: u32 = 1 << 3;

/// Commands accepted by `RPCServer.Command`
pub mod command {
    pub const CONTINUE: &str = "continue";
    pub const REWIND: &str = "rewind";
    pub const NEXT: &str = "next";
    pub const STEP: &str = "step";
    pub const STEP_OUT: &str = "stepOut";
    pub const STEP_INSTRUCTION: &str = "stepInstruction";
    pub const HALT: &str = "halt";
    pub const SWITCH_THREAD: &str = "switchThread";
    pub const SWITCH_GOROUTINE: &str = "switchGoroutine";
    pub const CALL: &str = "call";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Function {
    pub name: String,
    pub value: u64,
    pub optimized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub pc: u64,
    pub file: String,
    pub line: u32,
    pub function: Option<Function>,
}

impl Location {
    pub fn function_name(&self) -> &str {
        self.function.as_ref().map(|f| f.name.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Breakpoint {
    pub id: i64,
    pub name: String,
    pub addr: u64,
    pub file: String,
    pub line: u32,
    #[serde(rename = "functionName", skip_serializing_if = "String::is_empty")]
    pub function_name: String,
    #[serde(rename = "Cond")]
    pub cond: String,
    /// Tracepoint: log and continue
    #[serde(rename = "continue")]
    pub tracepoint: bool,
    #[serde(rename = "traceReturn")]
    pub trace_return: bool,
    #[serde(rename = "totalHitCount")]
    pub total_hit_count: u64,
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thread {
    pub id: i64,
    pub pc: u64,
    pub file: String,
    pub line: u32,
    pub function: Option<Function>,
    #[serde(rename = "goroutineID")]
    pub goroutine_id: i64,
    #[serde(rename = "breakPoint")]
    pub breakpoint: Option<Breakpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Goroutine {
    pub id: i64,
    #[serde(rename = "currentLoc")]
    pub current_loc: Location,
    #[serde(rename = "userCurrentLoc")]
    pub user_current_loc: Location,
    #[serde(rename = "goStatementLoc")]
    pub go_statement_loc: Location,
    #[serde(rename = "startLoc")]
    pub start_loc: Location,
    #[serde(rename = "threadID")]
    pub thread_id: i64,
    pub unreadable: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stackframe {
    #[serde(flatten)]
    pub location: Location,
    #[serde(rename = "Locals")]
    pub locals: Option<Vec<Variable>>,
    #[serde(rename = "Arguments")]
    pub arguments: Option<Vec<Variable>>,
    #[serde(rename = "Err")]
    pub err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Variable {
    pub name: String,
    pub addr: u64,
    #[serde(rename = "onlyAddr")]
    pub only_addr: bool,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "realType")]
    pub real_type: String,
    pub flags: u32,
    pub kind: u32,
    pub value: String,
    pub len: i64,
    pub cap: i64,
    pub children: Vec<Variable>,
    pub unreadable: String,
    #[serde(rename = "DeclLine")]
    pub decl_line: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerState {
    #[serde(rename = "Pid")]
    pub pid: i64,
    #[serde(rename = "Running")]
    pub running: bool,
    #[serde(rename = "Recording")]
    pub recording: bool,
    #[serde(rename = "currentThread")]
    pub current_thread: Option<Thread>,
    #[serde(rename = "currentGoroutine")]
    pub current_goroutine: Option<Goroutine>,
    #[serde(rename = "Threads")]
    pub threads: Option<Vec<Thread>>,
    #[serde(rename = "NextInProgress")]
    pub next_in_progress: bool,
    pub exited: bool,
    #[serde(rename = "exitStatus")]
    pub exit_status: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadConfig {
    pub follow_pointers: bool,
    pub max_variable_recurse: i32,
    pub max_string_len: i32,
    pub max_array_values: i32,
    pub max_struct_fields: i32,
}

impl From<&VarLoadParams> for LoadConfig {
    fn from(p: &VarLoadParams) -> Self {
        Self {
            follow_pointers: p.follow_pointers,
            max_variable_recurse: p.max_recurse,
            max_string_len: p.max_string_len,
            max_array_values: p.max_array_values,
            max_struct_fields: p.max_struct_fields,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvalScope {
    #[serde(rename = "GoroutineID")]
    pub goroutine_id: i64,
    pub frame: i64,
    pub deferred_call: i64,
}

impl EvalScope {
    pub fn new(goroutine_id: i64, frame: usize) -> Self {
        Self {
            goroutine_id,
            frame: frame as i64,
            deferred_call: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebuggerCommand {
    pub name: String,
    #[serde(rename = "threadID", skip_serializing_if = "is_zero")]
    pub thread_id: i64,
    #[serde(rename = "goroutineID", skip_serializing_if = "is_zero")]
    pub goroutine_id: i64,
    #[serde(rename = "ReturnInfoLoadConfig", skip_serializing_if = "Option::is_none")]
    pub return_info_load_config: Option<LoadConfig>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expr: String,
    #[serde(rename = "unsafeCall", skip_serializing_if = "std::ops::Not::not")]
    pub unsafe_call: bool,
}

impl DebuggerCommand {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

// --------------------------------- request and response bodies -----------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateIn {
    pub non_blocking: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct StateOut {
    pub state: Option<DebuggerState>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CommandOut {
    pub state: DebuggerState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetachIn {
    pub kill: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartIn {
    pub position: String,
    pub reset_args: bool,
    pub new_args: Vec<String>,
    pub rerecord: bool,
    pub rebuild: bool,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

/// Response body that is ignored
#[derive(Debug, Default, Deserialize)]
pub struct Ignored {}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ProcessPidOut {
    pub pid: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LastModifiedOut {
    pub time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RecordedOut {
    pub recorded: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListThreadsOut {
    pub threads: Option<Vec<Thread>>,
}

#[derive(Debug, Serialize)]
pub struct GetThreadIn {
    #[serde(rename = "Id")]
    pub id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct GetThreadOut {
    pub thread: Option<Thread>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListGoroutinesIn {
    pub start: i64,
    pub count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListGoroutinesOut {
    pub goroutines: Option<Vec<Goroutine>>,
    pub nextg: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StacktraceIn {
    pub id: i64,
    pub depth: usize,
    pub full: bool,
    pub defers: bool,
    pub opts: u32,
    pub cfg: Option<LoadConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct StacktraceOut {
    pub locations: Option<Vec<Stackframe>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListPackageVarsIn {
    pub filter: String,
    pub cfg: LoadConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScopeIn {
    pub scope: EvalScope,
    pub cfg: LoadConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VariablesOut {
    pub variables: Option<Vec<Variable>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ArgsOut {
    pub args: Option<Vec<Variable>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvalIn {
    pub scope: EvalScope,
    pub expr: String,
    pub cfg: Option<LoadConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct EvalOut {
    pub variable: Option<Variable>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetIn {
    pub scope: EvalScope,
    pub symbol: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterIn {
    pub filter: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SourcesOut {
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FunctionsOut {
    pub funcs: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TypesOut {
    pub types: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BreakpointIn {
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BreakpointIdIn {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BreakpointOut {
    pub breakpoint: Option<Breakpoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListBreakpointsIn {
    pub all: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListBreakpointsOut {
    pub breakpoints: Option<Vec<Breakpoint>>,
}
