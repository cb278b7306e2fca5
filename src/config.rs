use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::debugger::status::StatusBus;
use crate::error::{DebugError, Result};

/// How the debugger gets hold of the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Build and run the program
    #[default]
    Exec,
    /// Build and run the package tests
    Test,
    /// Attach to an already running process
    Attach,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Exec => write!(f, "exec"),
            Mode::Test => write!(f, "test"),
            Mode::Attach => write!(f, "attach"),
        }
    }
}

/// Limits for materializing variables on the backend side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarLoadParams {
    /// Dereference pointers while loading
    pub follow_pointers: bool,
    /// Maximum nesting of loaded children
    pub max_recurse: i32,
    /// Maximum number of string bytes loaded
    pub max_string_len: i32,
    /// Maximum number of array/slice/map entries loaded
    pub max_array_values: i32,
    /// Maximum number of struct fields loaded, -1 loads all
    pub max_struct_fields: i32,
}

impl VarLoadParams {
    /// Conservative limits used for locals and globals listings
    pub const fn list_defaults() -> Self {
        Self {
            follow_pointers: true,
            max_recurse: 4,
            max_string_len: 100,
            max_array_values: 10,
            max_struct_fields: -1,
        }
    }

    /// Generous limits used when a single variable is requested
    pub const fn get_defaults() -> Self {
        Self {
            follow_pointers: true,
            max_recurse: 10,
            max_string_len: 1024,
            max_array_values: 1024,
            max_struct_fields: -1,
        }
    }
}

impl Default for VarLoadParams {
    fn default() -> Self {
        Self::list_defaults()
    }
}

/// Session configuration as read from disk and the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: Mode,
    /// Process to attach to (attach mode)
    pub pid: Option<u32>,
    /// Test name filter (test mode)
    pub test_filter: Option<String>,
    /// Passed verbatim to the debugger process
    pub extra_args: Vec<String>,
    /// Debugger binary name or path
    pub debugger: String,
    /// Prefix stripped from paths for display
    pub project_root: Option<PathBuf>,
    pub list_vars: VarLoadParams,
    pub get_vars: VarLoadParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Exec,
            pid: None,
            test_filter: None,
            extra_args: Vec::new(),
            debugger: "dlv".to_string(),
            project_root: None,
            list_vars: VarLoadParams::list_defaults(),
            get_vars: VarLoadParams::get_defaults(),
        }
    }
}

impl SessionConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading session config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::Attach && self.pid.is_none() {
            return Err(DebugError::Config("attach mode requires a pid".to_string()));
        }
        if self.debugger.trim().is_empty() {
            return Err(DebugError::Config("debugger binary must not be empty".to_string()));
        }
        Ok(())
    }

    /// Turn the configuration into per-session parameters
    pub fn into_params(self, status: StatusBus) -> SessionParams {
        SessionParams {
            mode: self.mode,
            pid: self.pid,
            test_filter: self.test_filter,
            extra_args: self.extra_args,
            status,
            list_vars: self.list_vars,
            get_vars: self.get_vars,
        }
    }
}

/// Parameters handed to a backend when a session starts
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub mode: Mode,
    pub pid: Option<u32>,
    pub test_filter: Option<String>,
    pub extra_args: Vec<String>,
    /// Where status transitions are published
    pub status: StatusBus,
    /// Load limits for locals and globals
    pub list_vars: VarLoadParams,
    /// Load limits for a single variable
    pub get_vars: VarLoadParams,
}

impl SessionParams {
    /// Parameters for `mode` with default load limits
    pub fn new(mode: Mode, status: StatusBus) -> Self {
        Self {
            mode,
            pid: None,
            test_filter: None,
            extra_args: Vec::new(),
            status,
            list_vars: VarLoadParams::list_defaults(),
            get_vars: VarLoadParams::get_defaults(),
        }
    }
}
