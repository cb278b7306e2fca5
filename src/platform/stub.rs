//! Placeholder backend for source kinds without a debugger
//!
//! Never becomes active. Every session call fails with
//! [`DebugError::NotStarted`] and execution streams end immediately.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::config::SessionParams;
use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::output::OutputSink;
use crate::debugger::state::ExecState;
use crate::debugger::threads::{StackFrame, Task, Thread};
use crate::debugger::variables::Variable;
use crate::error::{DebugError, Result};
use crate::platform::{Backend, Capability, ExecStream};

/// Backend that is never active and fails every call with `NotStarted`
#[derive(Debug, Default, Clone, Copy)]
pub struct StubBackend;

#[async_trait]
impl Backend for StubBackend {
    async fn start(&self, _exe_path: &Path, _root_path: &Path, out: OutputSink, _params: &SessionParams) -> Result<()> {
        out.write_line("No debugger is available for this kind of file");
        Err(DebugError::NotStarted)
    }

    fn is_active(&self) -> bool {
        false
    }

    fn pid(&self) -> u32 {
        0
    }

    async fn last_modified(&self) -> Result<DateTime<Utc>> {
        Err(DebugError::NotStarted)
    }

    async fn detach(&self, _kill: bool) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    async fn disconnect(&self, _cont: bool) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    async fn restart(&self) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    async fn restart_from(&self, _pos: &str, _reset_args: bool, _new_args: &[String]) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    async fn state(&self) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    fn continue_exec(&self) -> ExecStream {
        stream::empty().boxed()
    }

    fn rewind(&self) -> ExecStream {
        stream::empty().boxed()
    }

    async fn next(&self) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn step(&self) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn step_out(&self) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn step_single(&self) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn call(&self, _task_id: i64, _expr: &str, _unsafe_call: bool) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn switch_thread(&self, _id: i64) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn switch_task(&self, _id: i64) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn halt(&self) -> Result<ExecState> {
        Err(DebugError::NotStarted)
    }

    async fn list_threads(&self) -> Result<Vec<Thread>> {
        Err(DebugError::NotStarted)
    }

    async fn get_thread(&self, _id: i64) -> Result<Thread> {
        Err(DebugError::NotStarted)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Err(DebugError::NotStarted)
    }

    async fn stack(&self, _task_id: i64, _depth: usize) -> Result<Vec<StackFrame>> {
        Err(DebugError::NotStarted)
    }

    async fn list_globals(&self, _filter: &str) -> Result<Vec<Variable>> {
        Err(DebugError::NotStarted)
    }

    async fn list_locals(&self, _task_id: i64, _frame: usize) -> Result<Vec<Variable>> {
        Err(DebugError::NotStarted)
    }

    async fn get_var(&self, _expr: &str, _task_id: i64, _frame: usize) -> Result<Variable> {
        Err(DebugError::NotStarted)
    }

    async fn follow_ptr(&self, _var: &mut Variable) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    async fn set_var(&self, _name: &str, _value: &str, _task_id: i64, _frame: usize) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    async fn list_sources(&self, _filter: &str) -> Result<Vec<String>> {
        Err(DebugError::NotStarted)
    }

    async fn list_funcs(&self, _filter: &str) -> Result<Vec<String>> {
        Err(DebugError::NotStarted)
    }

    async fn list_types(&self, _filter: &str) -> Result<Vec<String>> {
        Err(DebugError::NotStarted)
    }

    async fn create_break(&self, _bp: &Breakpoint) -> Result<Breakpoint> {
        Err(DebugError::NotStarted)
    }

    async fn get_break(&self, _id: i64) -> Result<Breakpoint> {
        Err(DebugError::NotStarted)
    }

    async fn list_breaks(&self) -> Result<Vec<Breakpoint>> {
        Err(DebugError::NotStarted)
    }

    async fn clear_break(&self, _id: i64) -> Result<Breakpoint> {
        Err(DebugError::NotStarted)
    }

    async fn amend_break(&self, _bp: &Breakpoint) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    async fn cancel_next(&self) -> Result<()> {
        Err(DebugError::NotStarted)
    }

    fn has_tasks(&self) -> bool {
        false
    }

    fn capability(&self, _cap: Capability) -> bool {
        false
    }

    async fn find_frames(&self, _path: &str, _line: u32) -> Result<Vec<StackFrame>> {
        Err(DebugError::NotStarted)
    }
}
