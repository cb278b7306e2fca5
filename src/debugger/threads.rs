use std::fmt;

use crate::debugger::location::FileLocation;
use crate::debugger::variables::Variable;

/// An OS thread of the debugged process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thread {
    /// Thread ID as reported by the debugger
    pub id: i64,
    /// Program counter
    pub pc: u64,
    /// Source location of the program counter
    pub loc: FileLocation,
    /// Function being executed
    pub func_name: String,
    /// Task currently scheduled on this thread, 0 if none
    pub current_task_id: i64,
}

impl Thread {
    /// Get a human-readable one-line description
    pub fn description(&self) -> String {
        let mut desc = format!("Thread {} at 0x{:x}", self.id, self.pc);
        if !self.func_name.is_empty() {
            desc.push_str(&format!(" in {}", self.func_name));
        }
        if !self.loc.is_unknown() {
            desc.push_str(&format!(" ({})", self.loc));
        }
        if self.current_task_id != 0 {
            desc.push_str(&format!(" [task {}]", self.current_task_id));
        }
        desc
    }
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A lightweight task multiplexed onto OS threads
///
/// Only present when the backend advertises tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Task {
    pub id: i64,
    pub pc: u64,
    /// Current location in user code
    pub loc: FileLocation,
    pub func_name: String,
    /// Thread the task runs on, 0 when the task is parked
    pub host_thread_id: i64,
    /// Entry function of the task
    pub start_loc: FileLocation,
    /// Statement that launched the task
    pub launch_loc: FileLocation,
}

impl Task {
    /// Get a human-readable one-line description
    pub fn description(&self) -> String {
        let mut desc = format!("Task {} at {}", self.id, self.loc);
        if !self.func_name.is_empty() {
            desc.push_str(&format!(" in {}", self.func_name));
        }
        if self.host_thread_id != 0 {
            desc.push_str(&format!(" (thread {})", self.host_thread_id));
        }
        desc
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A stack frame in a task's call stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackFrame {
    /// Frame number (0 is the innermost frame)
    pub depth: usize,
    /// Thread or task owning the stack
    pub thread_or_task_id: i64,
    /// Instruction pointer
    pub pc: u64,
    pub loc: FileLocation,
    pub func_name: String,
    /// Local variables, only loaded for the selected frame
    pub locals: Vec<Variable>,
    /// Arguments, only loaded for the selected frame
    pub args: Vec<Variable>,
}

impl StackFrame {
    /// Create a frame without variables
    pub fn new(depth: usize, thread_or_task_id: i64, pc: u64, loc: FileLocation, func_name: impl Into<String>) -> Self {
        Self {
            depth,
            thread_or_task_id,
            pc,
            loc,
            func_name: func_name.into(),
            locals: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Get a human-readable description of the frame
    pub fn description(&self) -> String {
        let func = if self.func_name.is_empty() { "???" } else { &self.func_name };
        let mut desc = format!("#{} 0x{:016x} in {}", self.depth, self.pc, func);
        if !self.loc.is_unknown() {
            desc.push_str(&format!(" at {}", self.loc));
        }
        desc
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
