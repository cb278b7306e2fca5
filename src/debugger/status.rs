use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Debugger session status
///
/// Ordered by how much the status tells about the session, not by time.
/// `Error` sits outside of the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Status {
    #[default]
    NotInitialized,
    Building,
    Ready,
    Running,
    Stopped,
    Breakpoint,
    Finished,
    Error,
}

impl Status {
    /// Check if the session is halted somewhere the user can inspect
    pub fn is_stopped(&self) -> bool {
        matches!(self, Status::Stopped | Status::Breakpoint)
    }

    /// Check if the session may continue from this status
    pub fn can_continue(&self) -> bool {
        matches!(self, Status::Ready | Status::Stopped | Status::Breakpoint)
    }

    /// Check if a run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Finished | Status::Error)
    }

    /// Check if `next` may follow `self` within a single run
    pub fn allows(&self, next: Status) -> bool {
        if next == Status::Error || next == *self {
            return true;
        }
        match self {
            Status::Running => matches!(next, Status::Stopped | Status::Breakpoint | Status::Finished),
            // a new run may begin after anything else
            _ => true,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::NotInitialized => "not initialized",
            Status::Building => "building",
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Breakpoint => "at breakpoint",
            Status::Finished => "finished",
            Status::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Default)]
struct BusState {
    current: Status,
    subscriber: Option<mpsc::UnboundedSender<Status>>,
}

/// Broadcasts status transitions to at most one subscriber
///
/// Cloning the bus hands out another writer handle; the controller and the
/// session supervisor are the only writers.
#[derive(Debug, Clone, Default)]
pub struct StatusBus {
    state: Arc<Mutex<BusState>>,
}

impl StatusBus {
    /// Create a bus with no subscriber
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest emitted status
    pub fn current(&self) -> Status {
        self.state.lock().map(|s| s.current).unwrap_or_default()
    }

    /// Publish a status
    pub fn emit(&self, status: Status) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.current.allows(status) {
            warn!("Status transition {} -> {} breaks run ordering", state.current, status);
        }
        debug!("Status: {} -> {}", state.current, status);
        state.current = status;
        if let Some(tx) = &state.subscriber {
            if tx.send(status).is_err() {
                state.subscriber = None;
            }
        }
    }

    /// Attach the subscriber, replacing any previous one
    ///
    /// The subscriber receives the current status first.
    pub fn subscribe(&self) -> StatusSubscriber {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.state.lock() {
            let _ = tx.send(state.current);
            state.subscriber = Some(tx);
        }
        StatusSubscriber { rx, last: None }
    }

    /// Run `cb` on a task for every distinct status transition
    pub fn on_status<F>(&self, mut cb: F) -> JoinHandle<()>
    where
        F: FnMut(Status) + Send + 'static,
    {
        let mut sub = self.subscribe();
        tokio::spawn(async move {
            while let Some(status) = sub.recv().await {
                cb(status);
            }
        })
    }
}

/// Receiving end of the status bus
#[derive(Debug)]
pub struct StatusSubscriber {
    rx: mpsc::UnboundedReceiver<Status>,
    last: Option<Status>,
}

impl StatusSubscriber {
    /// Wait for the next status that differs from the previous one
    ///
    /// Returns `None` once every writer is gone.
    pub async fn recv(&mut self) -> Option<Status> {
        loop {
            let status = self.rx.recv().await?;
            if self.last != Some(status) {
                self.last = Some(status);
                return Some(status);
            }
        }
    }

    /// Drain everything already delivered, deduplicated
    pub fn drain(&mut self) -> Vec<Status> {
        let mut out = Vec::new();
        while let Ok(status) = self.rx.try_recv() {
            if self.last != Some(status) {
                self.last = Some(status);
                out.push(status);
            }
        }
        out
    }
}
