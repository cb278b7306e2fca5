use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tokio::sync::mpsc;

/// A hyperlink into a source file embedded in an output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Byte range of the linked text within the line
    pub start: usize,
    pub end: usize,
    /// `file:///<path>#<line>:<col>`
    pub url: String,
}

/// One line written to the UI output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub text: String,
    pub links: Vec<Link>,
}

impl OutputLine {
    /// A line without links
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            links: Vec::new(),
        }
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Append-only channel of output lines towards the UI
///
/// Safe for concurrent writers; lines written after the receiver is gone are
/// dropped.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl OutputSink {
    /// Create a sink and its receiving end
    pub fn channel() -> (OutputSink, OutputReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OutputSink { tx }, OutputReceiver { rx })
    }

    /// A sink that nobody reads
    pub fn discard() -> Self {
        Self::channel().0
    }

    /// Write a line as is
    pub fn write_line(&self, text: impl Into<String>) {
        let _ = self.tx.send(OutputLine::plain(text));
    }

    /// Write a line, turning `file:line` references into links
    pub fn write_linked(&self, text: &str, base: Option<&Path>) {
        let _ = self.tx.send(linkify(text, base));
    }
}

/// Receiving end of an [`OutputSink`]
#[derive(Debug)]
pub struct OutputReceiver {
    rx: mpsc::UnboundedReceiver<OutputLine>,
}

impl OutputReceiver {
    /// Wait for the next line
    pub async fn recv(&mut self) -> Option<OutputLine> {
        self.rx.recv().await
    }

    /// Take every line already written
    pub fn drain(&mut self) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }
}

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^\s:]*[/.][^\s:]*):(\d+)(?::(\d+))?:?$").expect("location pattern is valid")
    })
}

/// Link `path:line[:col]` references in the first two space-delimited fields
///
/// Relative paths are resolved against `base`.
pub fn linkify(text: &str, base: Option<&Path>) -> OutputLine {
    let mut links = Vec::new();
    let mut offset = 0;
    for field in text.split(' ').take(2) {
        let start = offset;
        offset += field.len() + 1;
        let Some(caps) = location_regex().captures(field) else {
            continue;
        };
        let path = &caps[1];
        let line = &caps[2];
        let col = caps.get(3).map(|c| c.as_str()).unwrap_or("0");
        let full = if path.starts_with('/') {
            path.to_string()
        } else {
            match base {
                Some(base) => base.join(path.trim_start_matches("./")).to_string_lossy().into_owned(),
                None => path.to_string(),
            }
        };
        links.push(Link {
            start,
            end: start + caps[0].trim_end_matches(':').len(),
            url: format!("file:///{}#{}:{}", full.trim_start_matches('/'), line, col),
        });
    }
    OutputLine {
        text: text.to_string(),
        links,
    }
}
