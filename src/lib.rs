//! DEBUGCAT - debugger control core
//!
//! Supervises a headless language debugger, keeps breakpoints in sync with
//! it and aggregates everything known at a stop into one snapshot. Editors
//! embed the library; the `debugcat` binary drives it from a console.

pub mod config;
pub mod debugger;
pub mod error;
pub mod platform;
pub mod ui;

/// Re-export key types for easier access in tests
pub use config::{Mode, SessionConfig, SessionParams, VarLoadParams};
pub use debugger::core::{Debugger, StepKind};
pub use debugger::output::{OutputLine, OutputReceiver, OutputSink};
pub use debugger::state::Snapshot;
pub use debugger::status::{Status, StatusBus};
pub use error::{DebugError, Result};
pub use platform::{Backend, Registry, SourceKind};
pub use ui::console::{parse_command, Command as ConsoleCommand};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: log::LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .filter_module("debugcat", level)
        .parse_env("RUST_LOG")
        .format_timestamp_secs()
        .try_init();
}
