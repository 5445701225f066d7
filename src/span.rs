//! Source positions.
//!
//! Every AST node and every compile-time error carries a [`Span`] so
//! diagnostics can point at a single source line, matching the
//! `ERROR: ... at line N` format required by the error handling design.

use std::fmt::Display;

use colored::Colorize;

/// A single source line. Franz's AST nodes only track line numbers (no
/// column/offset range), so a span is just that line plus the originating
/// file, used to build the one-line diagnostics the CLI prints to stderr.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Span {
    pub file: String,
    pub line: usize,
}

impl Span {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Render `err` as the single-line diagnostic the CLI writes to stderr.
    /// The `ERROR` tag is colored the same way `why_lib`'s `ParseError`
    /// colors its caret underline - only when stderr is a real terminal,
    /// which `colored` detects on its own.
    pub fn to_string(&self, err: Box<dyn std::error::Error>) -> String {
        format!("{}: {err} at {}:{}", "ERROR".red().bold(), self.file, self.line)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
