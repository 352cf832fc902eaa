//! Raw serial frames

use std::fmt;

/// Leading character of diagnostic output that is not telemetry
pub const DIAGNOSTIC_MARKER: char = '*';

/// One line read from the serial device, without its line terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    text: String,
}

impl RawFrame {
    /// Build a frame from a line, stripping any trailing `\n` / `\r\n`
    pub fn new(line: impl Into<String>) -> Self {
        let mut text = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Diagnostic frames start with `*` and never reach the decoder
    pub fn is_diagnostic(&self) -> bool {
        self.text.starts_with(DIAGNOSTIC_MARKER)
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for RawFrame {
    fn from(line: &str) -> Self {
        RawFrame::new(line)
    }
}
