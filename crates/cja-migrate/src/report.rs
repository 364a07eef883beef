//! User-facing progress output.
//!
//! Progress goes to stdout and can be silenced with quiet mode; warnings
//! always go to stderr. Diagnostics belong in `tracing`, not here.

use std::fmt::Display;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Sink {
    Stdio,
    Buffer(Arc<Mutex<Vec<String>>>),
}

/// Writes progress lines for the person running migrations.
#[derive(Debug, Clone)]
pub struct Reporter {
    quiet: bool,
    sink: Sink,
}

impl Reporter {
    /// Report to the terminal.
    pub fn stdio(quiet: bool) -> Self {
        Self {
            quiet,
            sink: Sink::Stdio,
        }
    }

    /// Collect lines in memory instead of printing them. Warnings are stored
    /// with a `Warning: ` prefix.
    pub fn buffered(quiet: bool) -> Self {
        Self {
            quiet,
            sink: Sink::Buffer(Arc::default()),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Lines collected by a [`buffered`](Self::buffered) reporter.
    pub fn lines(&self) -> Vec<String> {
        match &self.sink {
            Sink::Stdio => Vec::new(),
            Sink::Buffer(lines) => lines.lock().map(|lines| lines.clone()).unwrap_or_default(),
        }
    }

    /// A progress line, dropped in quiet mode.
    pub fn info(&self, line: impl Display) {
        if self.quiet {
            return;
        }

        match &self.sink {
            Sink::Stdio => println!("{line}"),
            Sink::Buffer(lines) => push(lines, line.to_string()),
        }
    }

    /// A warning, shown even in quiet mode.
    pub fn warn(&self, line: impl Display) {
        match &self.sink {
            Sink::Stdio => eprintln!("Warning: {line}"),
            Sink::Buffer(lines) => push(lines, format!("Warning: {line}")),
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::stdio(false)
    }
}

fn push(lines: &Mutex<Vec<String>>, line: String) {
    if let Ok(mut lines) = lines.lock() {
        lines.push(line);
    }
}
