use std::collections::HashMap;
use std::fmt;

use crate::debugger::state::Snapshot;

/// Colour tag of a highlighted source line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineColor {
    /// Disabled or unresolved breakpoint
    BreakInactive,
    BreakActive,
    /// Breakpoint the program is stopped at
    BreakCurrent,
    /// Current program counter
    PcCurrent,
}

impl LineColor {
    /// Convert to the tag understood by text buffers
    pub fn as_str(&self) -> &'static str {
        match self {
            LineColor::BreakInactive => "break-inactive",
            LineColor::BreakActive => "break-active",
            LineColor::BreakCurrent => "break-current",
            LineColor::PcCurrent => "pc-current",
        }
    }
}

impl fmt::Display for LineColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Line highlighting offered by the editor's text buffers
///
/// Lines are 0-based here, unlike everywhere else in the core.
pub trait LineHighlighter {
    fn set_line_color(&mut self, path: &str, line0: u32, color: LineColor);
    fn clear_line_color(&mut self, path: &str, line0: u32);
}

/// Colours to show for a snapshot, keyed by `(path, 0-based line)`
pub fn line_colors(snap: &Snapshot) -> HashMap<(String, u32), LineColor> {
    let mut colors = HashMap::new();
    for bp in &snap.desired_breaks {
        if bp.loc.is_unknown() || bp.loc.line == 0 {
            continue;
        }
        let color = if bp.id != 0 && bp.id == snap.current_break_id {
            LineColor::BreakCurrent
        } else if bp.enabled && bp.id > 0 {
            LineColor::BreakActive
        } else {
            LineColor::BreakInactive
        };
        colors.insert((bp.loc.path.clone(), bp.loc.line - 1), color);
    }
    if snap.status.is_stopped() {
        if let Some(loc) = snap.current_loc() {
            if loc.line > 0 {
                // a current breakpoint wins over the pc
                colors.entry((loc.path.clone(), loc.line - 1)).or_insert(LineColor::PcCurrent);
            }
        }
    }
    colors
}
