//! Line-oriented console
//!
//! Parses one command per line and runs it against a [`Debugger`]. Stops
//! and output lines arrive asynchronously through the status bus and the
//! output sink; the console only prints what a command returns.

use std::fmt;

use log::debug;

use crate::debugger::core::Debugger;
use crate::debugger::variables::RenderOpts;
use crate::error::Result;

/// A console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Breakpoints
    Break(String, u32),
    Clear(String, u32),
    /// Set or, with an empty expression, remove a condition
    Cond(String, u32, String),
    /// Turn a breakpoint into a tracepoint, adding it if needed
    Trace(String, u32),
    Breakpoints,

    // Execution
    Continue,
    Next,
    Step,
    StepOut,
    StepInstruction,
    Halt,
    Restart,
    Detach,

    // Inspection
    Print(String),
    Show(String),
    Set(String, String),
    Frame(usize),
    Thread(i64),
    Task(i64),
    Backtrace,
    Locals,
    Globals(String),
    Find(String, u32),
    Sources(String),
    Funcs(String),
    Types(String),

    // Console
    Help,
    Quit,
    Unknown(String),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Break(p, l) => write!(f, "break {}:{}", p, l),
            Command::Clear(p, l) => write!(f, "clear {}:{}", p, l),
            Command::Cond(p, l, e) => write!(f, "cond {}:{} {}", p, l, e),
            Command::Trace(p, l) => write!(f, "trace {}:{}", p, l),
            Command::Unknown(msg) => write!(f, "unknown ({})", msg),
            other => write!(f, "{:?}", other),
        }
    }
}

pub const HELP: &str = "\
break|b FILE:LINE       set a breakpoint
clear FILE:LINE         remove a breakpoint
cond FILE:LINE [EXPR]   set or remove a breakpoint condition
trace FILE:LINE         log and continue at a line
breakpoints|bl          list breakpoints
continue|c              resume the program
next|n                  step over
step|s                  step into
stepout|finish          step out
stepi                   step one instruction
halt                    stop the running program
restart                 restart the program
detach                  detach from the program
print|p EXPR            print a value
show EXPR               print a value, following pointers
set NAME VALUE          assign a variable
frame N                 select a frame
thread N | task N       switch thread or task
bt                      show the stack
locals                  show variables of the selected frame
globals [FILTER]        show package variables
find FILE LINE          find frames near a line in every task
sources|funcs|types [FILTER]
help                    show this help
quit|q                  end the session";

/// Split `path:line`
pub fn parse_location(s: &str) -> Option<(String, u32)> {
    let (path, line) = s.rsplit_once(':')?;
    let line: u32 = line.parse().ok()?;
    if path.is_empty() || line == 0 {
        return None;
    }
    Some((path.to_string(), line))
}

fn with_location(arg: Option<&&str>, usage: &str, f: impl FnOnce(String, u32) -> Command) -> Command {
    match arg.and_then(|a| parse_location(a)) {
        Some((path, line)) => f(path, line),
        None => Command::Unknown(format!("usage: {}", usage)),
    }
}

fn with_number<T: std::str::FromStr>(arg: Option<&&str>, usage: &str, f: impl FnOnce(T) -> Command) -> Command {
    match arg.and_then(|a| a.parse().ok()) {
        Some(n) => f(n),
        None => Command::Unknown(format!("usage: {}", usage)),
    }
}

/// Parse one console line
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(&name) = parts.first() else {
        return Command::Unknown(String::new());
    };
    let rest = || parts[1..].join(" ");

    match name {
        "b" | "break" => with_location(parts.get(1), "break FILE:LINE", Command::Break),
        "clear" => with_location(parts.get(1), "clear FILE:LINE", Command::Clear),
        "cond" | "condition" => {
            with_location(parts.get(1), "cond FILE:LINE [EXPR]", |p, l| Command::Cond(p, l, parts[2..].join(" ")))
        }
        "trace" => with_location(parts.get(1), "trace FILE:LINE", Command::Trace),
        "bl" | "breakpoints" => Command::Breakpoints,
        "c" | "continue" => Command::Continue,
        "n" | "next" => Command::Next,
        "s" | "step" => Command::Step,
        "stepout" | "finish" | "fin" => Command::StepOut,
        "stepi" | "si" => Command::StepInstruction,
        "halt" => Command::Halt,
        "r" | "restart" => Command::Restart,
        "detach" => Command::Detach,
        "p" | "print" if parts.len() > 1 => Command::Print(rest()),
        "show" if parts.len() > 1 => Command::Show(rest()),
        "p" | "print" | "show" => Command::Unknown(format!("{} requires an expression", name)),
        "set" if parts.len() >= 3 => Command::Set(parts[1].to_string(), parts[2..].join(" ")),
        "set" => Command::Unknown("set requires a variable name and value".to_string()),
        "frame" | "f" => with_number(parts.get(1), "frame N", Command::Frame),
        "thread" => with_number(parts.get(1), "thread ID", Command::Thread),
        "task" | "goroutine" => with_number(parts.get(1), "task ID", Command::Task),
        "bt" | "backtrace" | "stack" => Command::Backtrace,
        "locals" => Command::Locals,
        "globals" => Command::Globals(rest()),
        "find" => match (parts.get(1), parts.get(2).and_then(|l| l.parse().ok())) {
            (Some(path), Some(line)) => Command::Find(path.to_string(), line),
            _ => Command::Unknown("usage: find FILE LINE".to_string()),
        },
        "sources" => Command::Sources(rest()),
        "funcs" => Command::Funcs(rest()),
        "types" => Command::Types(rest()),
        "h" | "help" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => Command::Unknown(format!("unknown command `{}`", other)),
    }
}

/// Run a command and return the lines to print
pub async fn execute(dbg: &Debugger, cmd: Command) -> Result<Vec<String>> {
    debug!("Console: {}", cmd);
    let done = |s: &str| Ok(vec![s.to_string()]);
    match cmd {
        Command::Break(path, line) => {
            if dbg.add_break(&path, line).await {
                Ok(vec![format!("Breakpoint set at {}:{}", path, line)])
            } else {
                Ok(vec![format!("Breakpoint already set at {}:{}", path, line)])
            }
        }
        Command::Clear(path, line) => {
            dbg.clear_break(&path, line).await?;
            Ok(vec![format!("Breakpoint at {}:{} removed", path, line)])
        }
        Command::Cond(path, line, expr) => {
            let bp = dbg
                .breakpoints()
                .await
                .into_iter()
                .find(|b| b.is_at(&path, line))
                .ok_or_else(|| crate::error::DebugError::NoBreakpoint(path.clone(), line))?;
            let condition = (!expr.is_empty()).then_some(expr);
            dbg.amend_break(&path, line, bp.enabled, condition, bp.trace_only).await?;
            done("Condition updated")
        }
        Command::Trace(path, line) => {
            let existing = dbg.breakpoints().await.into_iter().find(|b| b.is_at(&path, line));
            match existing {
                Some(bp) => dbg.amend_break(&path, line, bp.enabled, bp.condition, true).await?,
                None => dbg.set_break(&path, line, None, true).await?,
            }
            Ok(vec![format!("Tracepoint set at {}:{}", path, line)])
        }
        Command::Breakpoints => {
            let breaks = dbg.breakpoints().await;
            if breaks.is_empty() {
                return done("No breakpoints");
            }
            Ok(breaks.iter().map(|b| b.description()).collect())
        }
        Command::Continue => {
            dbg.continue_exec().await?;
            Ok(vec![])
        }
        Command::Next => Ok(vec![format!("{}", dbg.step_over().await?)]),
        Command::Step => Ok(vec![format!("{}", dbg.step_into().await?)]),
        Command::StepOut => Ok(vec![format!("{}", dbg.step_out().await?)]),
        Command::StepInstruction => Ok(vec![format!("{}", dbg.step_single().await?)]),
        Command::Halt => {
            dbg.halt().await?;
            Ok(vec![])
        }
        Command::Restart => {
            dbg.restart().await?;
            done("Restarted")
        }
        Command::Detach => {
            dbg.detach(false).await?;
            done("Detached")
        }
        Command::Print(expr) => Ok(vec![format!("{} = {}", expr, dbg.var_value(&expr).await?)]),
        Command::Show(expr) => {
            let var = dbg.show_var(&expr).await?;
            let opts = RenderOpts {
                multiline: true,
                ..RenderOpts::default()
            };
            Ok(vec![var.format(&opts)])
        }
        Command::Set(name, value) => {
            dbg.set_var(&name, &value).await?;
            Ok(vec![format!("{} = {}", name, dbg.var_value(&name).await?)])
        }
        Command::Frame(idx) => {
            dbg.set_frame(idx).await?;
            let snap = dbg.snapshot().await;
            Ok(snap.current_frame().map(|f| f.description()).into_iter().collect())
        }
        Command::Thread(id) => {
            dbg.switch_thread(id).await?;
            Ok(vec![format!("Switched to thread {}", id)])
        }
        Command::Task(id) => {
            dbg.switch_task(id).await?;
            Ok(vec![format!("Switched to task {}", id)])
        }
        Command::Backtrace => {
            let snap = dbg.snapshot().await;
            Ok(snap
                .stack
                .iter()
                .map(|f| {
                    let marker = if f.depth == snap.current_frame_index { "*" } else { " " };
                    format!("{} {}", marker, f.description())
                })
                .collect())
        }
        Command::Locals => {
            let snap = dbg.snapshot().await;
            Ok(snap.locals.iter().map(|v| v.to_string()).collect())
        }
        Command::Globals(filter) => Ok(dbg
            .list_globals(&filter)
            .await?
            .iter()
            .map(|v| v.to_string())
            .collect()),
        Command::Find(path, line) => Ok(dbg
            .find_frames(&path, line)
            .await?
            .iter()
            .map(|f| format!("[{}] {}", f.thread_or_task_id, f.description()))
            .collect()),
        Command::Sources(filter) => dbg.list_sources(&filter).await,
        Command::Funcs(filter) => dbg.list_funcs(&filter).await,
        Command::Types(filter) => dbg.list_types(&filter).await,
        Command::Help => Ok(HELP.lines().map(str::to_string).collect()),
        Command::Quit => Ok(vec![]),
        Command::Unknown(msg) => Ok(vec![msg]),
    }
}
