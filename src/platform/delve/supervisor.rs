//! Headless debugger process supervision
//!
//! The supervisor owns the child process and both of its output pipes. Its
//! watcher task forwards every output line to the output sink and scrapes it
//! for the API endpoint handshake and for the build's exit status.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::config::{Mode, SessionParams};
use crate::debugger::output::OutputSink;
use crate::debugger::status::{Status, StatusBus};
use crate::error::{DebugError, Result};

/// Printed by the debugger once its API server accepts connections
pub const HANDSHAKE_PREFIX: &str = "API server listening at: ";
/// Printed when the build or the program ends
pub const EXIT_PREFIX: &str = "exit status";

/// What an output line means to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// The API server listens at this endpoint
    Handshake(String),
    /// Exit code announced on the output
    Exit(i32),
    Plain,
}

/// Classify one line of debugger output
pub fn classify_line(line: &str) -> LineEvent {
    let line = line.trim_end();
    if let Some(endpoint) = line.strip_prefix(HANDSHAKE_PREFIX) {
        return LineEvent::Handshake(endpoint.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix(EXIT_PREFIX) {
        let code = rest.trim().parse().unwrap_or(-1);
        return LineEvent::Exit(code);
    }
    LineEvent::Plain
}

/// Command line of the debugger process for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory, inherited when unset
    pub cwd: Option<PathBuf>,
}

impl Launch {
    /// Build the command line for the session mode
    pub fn for_session(binary: &Path, exe_path: &Path, params: &SessionParams) -> Result<Self> {
        let headless = ["--headless".to_string(), "--api-version=2".to_string()];
        let mut args = Vec::new();
        let cwd = match params.mode {
            Mode::Exec => {
                args.push("debug".to_string());
                args.extend(headless);
                Some(package_dir(exe_path))
            }
            Mode::Test => {
                args.push("test".to_string());
                args.extend(headless);
                if let Some(filter) = params.test_filter.as_deref().filter(|f| !f.is_empty()) {
                    args.extend(["--".to_string(), "-test.run".to_string(), filter.to_string()]);
                }
                Some(package_dir(exe_path))
            }
            Mode::Attach => {
                let pid = params
                    .pid
                    .ok_or_else(|| DebugError::Config("attach mode requires a pid".to_string()))?;
                args.push("attach".to_string());
                args.push(pid.to_string());
                args.extend(headless);
                None
            }
        };
        args.extend(params.extra_args.iter().cloned());
        Ok(Self {
            program: binary.to_path_buf(),
            args,
            cwd,
        })
    }

    /// Get the command line as one string, for logging
    pub fn display(&self) -> String {
        format!("{} {}", self.program.display(), self.args.join(" "))
    }
}

fn package_dir(exe_path: &Path) -> PathBuf {
    if exe_path.is_dir() {
        return exe_path.to_path_buf();
    }
    match exe_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Handle on a running debugger process
///
/// Dropping the handle kills the process.
#[derive(Debug)]
pub struct Supervisor {
    pid: Option<u32>,
    alive: Arc<AtomicBool>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    exit_error: Arc<Mutex<Option<String>>>,
}

impl Supervisor {
    /// Spawn the debugger and wait for its API endpoint
    ///
    /// Status transitions go to `status`: `Ready` on the handshake, `Error`
    /// when spawning fails or the output ends before the handshake.
    pub async fn spawn(
        launch: &Launch,
        out: OutputSink,
        status: StatusBus,
        root: Option<PathBuf>,
    ) -> Result<(Self, String)> {
        info!("Starting {}", launch.display());
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &launch.cwd {
            command.current_dir(cwd);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = DebugError::SpawnFailed {
                    binary: launch.program.display().to_string(),
                    source,
                };
                error!("{}", err);
                out.write_line(err.to_string());
                status.emit(Status::Error);
                return Err(err);
            }
        };

        let pid = child.id();
        let alive = Arc::new(AtomicBool::new(true));
        let exit_error = Arc::new(Mutex::new(None));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            status.emit(Status::Error);
            return Err(DebugError::HandshakeMissing);
        };
        let watcher = Watcher {
            out: out.clone(),
            status: status.clone(),
            root,
            alive: alive.clone(),
            exit_error: exit_error.clone(),
        };
        tokio::spawn(watcher.run(child, stdout, stderr, endpoint_tx, kill_rx));

        let endpoint = match endpoint_rx.await {
            Ok(endpoint) => endpoint,
            Err(_) => {
                out.write_line(DebugError::HandshakeMissing.to_string());
                return Err(DebugError::HandshakeMissing);
            }
        };
        debug!("Debugger {:?} listens at {}", pid, endpoint);
        Ok((
            Self {
                pid,
                alive,
                kill_tx: Mutex::new(Some(kill_tx)),
                exit_error,
            },
            endpoint,
        ))
    }

    /// OS process ID of the debugger
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Check if the debugger process is still running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Why the process went away, if it did so unexpectedly
    pub fn exit_error(&self) -> Option<String> {
        self.exit_error.lock().ok().and_then(|e| e.clone())
    }

    /// Kill the debugger process
    pub fn kill(&self) {
        if let Ok(mut tx) = self.kill_tx.lock() {
            if let Some(tx) = tx.take() {
                debug!("Killing debugger {:?}", self.pid);
                let _ = tx.send(());
            }
        }
    }
}

struct Watcher {
    out: OutputSink,
    status: StatusBus,
    root: Option<PathBuf>,
    alive: Arc<AtomicBool>,
    exit_error: Arc<Mutex<Option<String>>>,
}

impl Watcher {
    async fn run(
        self,
        mut child: Child,
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
        endpoint_tx: oneshot::Sender<String>,
        mut kill_rx: oneshot::Receiver<()>,
    ) {
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);
        let mut endpoint_tx = Some(endpoint_tx);
        let mut killed = false;

        while out_open || err_open {
            let line = tokio::select! {
                line = out_lines.next_line(), if out_open => match line {
                    Ok(Some(line)) => line,
                    _ => {
                        out_open = false;
                        continue;
                    }
                },
                line = err_lines.next_line(), if err_open => match line {
                    Ok(Some(line)) => line,
                    _ => {
                        err_open = false;
                        continue;
                    }
                },
                // fires on kill() and when the supervisor is dropped
                _ = &mut kill_rx, if !killed => {
                    killed = true;
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill debugger: {}", e);
                    }
                    continue;
                }
            };

            self.out.write_linked(&line, self.root.as_deref());
            match classify_line(&line) {
                LineEvent::Handshake(endpoint) => {
                    if let Some(tx) = endpoint_tx.take() {
                        info!("API server listening at {}", endpoint);
                        self.status.emit(Status::Ready);
                        let _ = tx.send(endpoint);
                    }
                }
                LineEvent::Exit(code) => {
                    debug!("Exit status {} announced", code);
                    self.status.emit(if code == 0 { Status::Finished } else { Status::Error });
                }
                LineEvent::Plain => {}
            }
        }

        let exit = child.wait().await;
        self.alive.store(false, Ordering::SeqCst);
        debug!("Debugger process ended: {:?}", exit);

        if endpoint_tx.is_some() {
            warn!("Debugger output closed before the handshake");
            self.status.emit(Status::Error);
        } else if !self.status.current().is_terminal() {
            let reason = match exit {
                Ok(status) => format!("debugger exited unexpectedly ({})", status),
                Err(e) => format!("debugger exited unexpectedly: {}", e),
            };
            if !killed {
                self.out.write_line(reason.clone());
            }
            if let Ok(mut slot) = self.exit_error.lock() {
                *slot = Some(reason);
            }
            self.status.emit(Status::Finished);
        }
    }
}
