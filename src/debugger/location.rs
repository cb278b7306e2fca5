use std::fmt;
use std::path::Path;

/// A position in a source file as reported by the debugger
///
/// Lines are 1-based. An empty path means the location is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FileLocation {
    /// Absolute path of the source file
    pub path: String,
    /// 1-based line number
    pub line: u32,
    /// 0-based column
    pub col: u32,
    /// Symbol at this location, if the debugger named one
    pub symbol: Option<String>,
}

impl FileLocation {
    /// Create a location without column or symbol
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            col: 0,
            symbol: None,
        }
    }

    /// Set the symbol name
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Check if the location is unknown and must be treated as absent
    pub fn is_unknown(&self) -> bool {
        self.path.is_empty()
    }

    /// Check if this location is on the same file line as `other`
    pub fn same_line(&self, other: &FileLocation) -> bool {
        !self.is_unknown() && self.path == other.path && self.line == other.line
    }

    /// Path with the project root prefix stripped
    pub fn display_path(&self, root: Option<&Path>) -> String {
        display_path(&self.path, root)
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, "<unknown>");
        }
        write!(f, "{}:{}", self.path, self.line)
    }
}

/// Strip the project root from `path` for display
pub fn display_path(path: &str, root: Option<&Path>) -> String {
    let Some(root) = root.and_then(|r| r.to_str()) else {
        return path.to_string();
    };
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(root) {
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
        _ => path.to_string(),
    }
}
