use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use log::{debug, info, warn};

use crate::debugger::location::FileLocation;
use crate::debugger::output::OutputSink;
use crate::error::{DebugError, Result};
use crate::platform::Backend;

/// Upper bound of list/diff/apply rounds in one [`BreakpointManager::sync`]
pub const MAX_SYNC_PASSES: usize = 2;

/// A source breakpoint
///
/// The same shape serves the desired list kept for the user and the actual
/// list reported by the backend. `(loc.path, loc.line)` is the natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakpoint {
    /// Backend assigned ID, 0 until resolved
    pub id: i64,
    pub enabled: bool,
    pub loc: FileLocation,
    /// Function containing the breakpoint, filled in by the backend
    pub func_name: String,
    /// Address the backend placed the breakpoint at
    pub pc: u64,
    /// Expression that must hold for the breakpoint to stop
    pub condition: Option<String>,
    /// Log the hit and keep running instead of stopping
    pub trace_only: bool,
    /// Number of hits reported by the backend
    pub hit_count: u64,
}

impl Breakpoint {
    /// Create an enabled breakpoint at a source line
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            enabled: true,
            loc: FileLocation::new(path, line),
            ..Default::default()
        }
    }

    /// Check if this breakpoint sits at the given source line
    ///
    /// A relative `path` also matches once the backend has resolved the
    /// breakpoint to an absolute path ending in it.
    pub fn is_at(&self, path: &str, line: u32) -> bool {
        if self.loc.line != line {
            return false;
        }
        if self.loc.path == path {
            return true;
        }
        !path.is_empty()
            && !Path::new(path).is_absolute()
            && Path::new(&self.loc.path).is_absolute()
            && Path::new(&self.loc.path).ends_with(path)
    }

    /// Check if two breakpoints share their natural key
    pub fn same_key(&self, other: &Breakpoint) -> bool {
        self.loc.same_line(&other.loc)
    }

    /// Check if the user owned settings differ from another breakpoint
    pub fn settings_differ(&self, other: &Breakpoint) -> bool {
        self.condition != other.condition || self.trace_only != other.trace_only
    }

    fn key(&self) -> (String, u32) {
        (self.loc.path.clone(), self.loc.line)
    }

    /// Get a description of the breakpoint
    pub fn description(&self) -> String {
        let mut desc = if self.id > 0 {
            format!("Breakpoint {} at {}", self.id, self.loc)
        } else {
            format!("Breakpoint (pending) at {}", self.loc)
        };
        if !self.func_name.is_empty() {
            desc.push_str(&format!(" in {}", self.func_name));
        }
        if let Some(cond) = &self.condition {
            desc.push_str(&format!(" if {}", cond));
        }
        if self.trace_only {
            desc.push_str(" [trace]");
        }
        if !self.enabled {
            desc.push_str(" [disabled]");
        }
        if self.hit_count > 0 {
            desc.push_str(&format!(" (hit {} times)", self.hit_count));
        }
        desc
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Owner of the desired breakpoint list
///
/// The UI edits the desired list only; [`BreakpointManager::sync`] pushes it
/// to the backend at the sync points right before continuing or stepping.
#[derive(Debug, Clone, Default)]
pub struct BreakpointManager {
    desired: Vec<Breakpoint>,
    /// Natural keys deleted since the last sync
    pending_clear: HashSet<(String, u32)>,
    /// Desired list as of the end of the last sync pass
    backup: Vec<Breakpoint>,
}

impl BreakpointManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Desired breakpoints, sorted by ID after each sync
    pub fn desired(&self) -> &[Breakpoint] {
        &self.desired
    }

    /// Desired list saved by the last sync pass
    pub fn backup(&self) -> &[Breakpoint] {
        &self.backup
    }

    /// Find the desired breakpoint at a source line
    pub fn find(&self, path: &str, line: u32) -> Option<&Breakpoint> {
        self.desired.iter().find(|b| b.is_at(path, line))
    }

    fn find_mut(&mut self, path: &str, line: u32) -> Result<&mut Breakpoint> {
        self.desired
            .iter_mut()
            .find(|b| b.is_at(path, line))
            .ok_or_else(|| DebugError::NoBreakpoint(path.to_string(), line))
    }

    /// Find a desired breakpoint by backend ID
    pub fn by_id(&self, id: i64) -> Option<&Breakpoint> {
        if id <= 0 {
            return None;
        }
        self.desired.iter().find(|b| b.id == id)
    }

    /// Add a breakpoint at a source line
    ///
    /// Returns false if one already exists there.
    pub fn add_break(&mut self, path: &str, line: u32) -> bool {
        if self.find(path, line).is_some() {
            return false;
        }
        debug!("Adding breakpoint at {}:{}", path, line);
        self.pending_clear.remove(&(path.to_string(), line));
        self.desired.push(Breakpoint::new(path, line));
        true
    }

    /// Remove the breakpoint at a source line
    ///
    /// The backend copy is cleared on the next sync.
    pub fn delete_break(&mut self, path: &str, line: u32) -> Option<Breakpoint> {
        let idx = self.desired.iter().position(|b| b.is_at(path, line))?;
        let removed = self.desired.remove(idx);
        debug!("Deleting {}", removed);
        self.pending_clear.insert(removed.key());
        Some(removed)
    }

    /// Add the breakpoint if missing, delete it otherwise
    ///
    /// Returns true if a breakpoint exists at the line afterwards.
    pub fn toggle_break(&mut self, path: &str, line: u32) -> bool {
        if self.delete_break(path, line).is_some() {
            false
        } else {
            self.add_break(path, line)
        }
    }

    pub fn set_enabled(&mut self, path: &str, line: u32, enabled: bool) -> Result<()> {
        self.find_mut(path, line)?.enabled = enabled;
        Ok(())
    }

    pub fn set_condition(&mut self, path: &str, line: u32, condition: Option<String>) -> Result<()> {
        self.find_mut(path, line)?.condition = condition.filter(|c| !c.trim().is_empty());
        Ok(())
    }

    pub fn set_trace(&mut self, path: &str, line: u32, trace_only: bool) -> Result<()> {
        self.find_mut(path, line)?.trace_only = trace_only;
        Ok(())
    }

    /// Bring the desired list back after a restart that dropped backend breakpoints
    ///
    /// IDs are reset so the next sync re-creates whatever the backend lost.
    pub fn restore_backup(&mut self) {
        if self.backup.is_empty() {
            return;
        }
        let mut restored = self.backup.clone();
        for bp in restored.iter_mut() {
            bp.id = 0;
        }
        // lines added after the last sync survive the restore
        for bp in &self.desired {
            if !restored.iter().any(|r| r.same_key(bp)) {
                restored.push(bp.clone());
            }
        }
        restored.retain(|b| !self.pending_clear.contains(&b.key()));
        self.desired = restored;
    }

    /// Merge the actual list reported at a stop into the desired list
    ///
    /// Actual breakpoints unknown to the desired list are adopted, desired
    /// breakpoints whose backend copy disappeared are marked disabled.
    pub fn merge_actual(&mut self, actual: &[Breakpoint]) {
        for bp in self.desired.iter_mut() {
            if bp.id <= 0 {
                continue;
            }
            match actual.iter().find(|a| a.id == bp.id) {
                Some(a) => {
                    bp.hit_count = a.hit_count;
                    bp.pc = a.pc;
                }
                None => {
                    debug!("Breakpoint {} vanished from the backend", bp.id);
                    bp.enabled = false;
                    bp.id = 0;
                }
            }
        }
        for a in actual {
            if a.id <= 0 || self.pending_clear.contains(&a.key()) {
                continue;
            }
            if self.desired.iter().any(|d| d.id == a.id || d.same_key(a)) {
                continue;
            }
            let mut adopted = a.clone();
            adopted.enabled = true;
            self.desired.push(adopted);
        }
        self.sort();
    }

    fn sort(&mut self) {
        // unresolved entries go last
        self.desired.sort_by_key(|b| (b.id <= 0, b.id));
    }

    /// Push the desired list to the backend
    ///
    /// Runs at most [`MAX_SYNC_PASSES`] rounds and stops early once a round
    /// changes nothing on the backend. Failures to create or amend a single
    /// breakpoint are written to `out` and leave the entry for the next sync.
    /// Returns the number of rounds run.
    pub async fn sync(&mut self, backend: &dyn Backend, out: &OutputSink) -> Result<usize> {
        let mut passes = 0;
        while passes < MAX_SYNC_PASSES {
            passes += 1;
            let mutated = self.sync_pass(backend, out).await?;
            self.backup = self.desired.clone();
            if !mutated {
                break;
            }
        }
        debug!("Breakpoint sync finished after {} pass(es)", passes);
        Ok(passes)
    }

    async fn sync_pass(&mut self, backend: &dyn Backend, out: &OutputSink) -> Result<bool> {
        let mut actual = backend.list_breaks().await?;
        let mut mutated = false;
        let mut cleared: HashSet<i64> = HashSet::new();

        // deleted lines first so they are not adopted back below
        let pending: Vec<(String, u32)> = self.pending_clear.iter().cloned().collect();
        for key in pending {
            let mut ok = true;
            for a in actual.iter().filter(|a| a.id > 0 && a.key() == key) {
                match backend.clear_break(a.id).await {
                    Ok(_) => {
                        cleared.insert(a.id);
                        mutated = true;
                    }
                    Err(e) => {
                        ok = false;
                        warn!("Failed to clear breakpoint {}: {}", a.id, e);
                        out.write_line(format!("Failed to clear breakpoint at {}:{}: {}", key.0, key.1, e));
                    }
                }
            }
            if ok {
                self.pending_clear.remove(&key);
            }
        }
        actual.retain(|a| !cleared.contains(&a.id));

        for d in self.desired.iter_mut() {
            match actual.iter().position(|a| a.same_key(d)) {
                Some(pos) => {
                    let a = actual.remove(pos);
                    if !d.enabled {
                        match backend.clear_break(a.id).await {
                            Ok(_) => {
                                cleared.insert(a.id);
                                mutated = true;
                                d.id = 0;
                            }
                            Err(e) => {
                                warn!("Failed to clear disabled breakpoint {}: {}", a.id, e);
                                out.write_line(format!("Failed to disable {}: {}", d.loc, e));
                            }
                        }
                        continue;
                    }
                    if d.settings_differ(&a) {
                        let amended = Breakpoint { id: a.id, ..d.clone() };
                        match backend.amend_break(&amended).await {
                            Ok(()) => mutated = true,
                            Err(e) => {
                                warn!("Failed to amend breakpoint {}: {}", a.id, e);
                                out.write_line(format!("Failed to update breakpoint at {}: {}", d.loc, e));
                            }
                        }
                    }
                    d.id = a.id;
                    d.pc = a.pc;
                    d.func_name = a.func_name;
                    d.hit_count = a.hit_count;
                }
                None if d.enabled => {
                    mutated = true;
                    match backend.create_break(d).await {
                        Ok(created) => {
                            info!("Created breakpoint {} at {}", created.id, created.loc);
                            if !created.loc.is_unknown() {
                                d.loc = created.loc;
                            }
                            d.id = created.id;
                            d.pc = created.pc;
                            d.func_name = created.func_name;
                        }
                        Err(e) => {
                            let err = DebugError::BreakCreateFailed {
                                path: d.loc.path.clone(),
                                line: d.loc.line,
                                message: e.to_string(),
                            };
                            warn!("{}", err);
                            out.write_line(err.to_string());
                            d.id = 0;
                        }
                    }
                }
                None => d.id = 0,
            }
        }

        for a in actual {
            if a.id <= 0 || cleared.contains(&a.id) || self.pending_clear.contains(&a.key()) {
                continue;
            }
            if self.desired.iter().any(|d| d.same_key(&a)) {
                continue;
            }
            debug!("Adopting breakpoint {} set outside of the editor", a.id);
            self.desired.push(Breakpoint { enabled: true, ..a });
        }

        self.sort();
        Ok(mutated)
    }
}
