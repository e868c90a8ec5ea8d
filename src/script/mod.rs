//! SQL scripts: splitting, execution and reporting.
//!
//! A script is split with the dialect's lexical rules, then run one
//! statement at a time in source order against the session's connection.

use std::time::Duration;

use crate::cursor::ResultCursor;
use crate::error::Error;

mod executor;
pub mod splitter;
mod watchdog;

pub(crate) use executor::execute;
pub use splitter::{Splitter, Statement};

/// How a script run behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    /// Halt on the first failing statement.
    pub stop_on_error: bool,
    /// Rows handed to the observer per result set; 0 hands over all of them.
    pub row_cap: usize,
    /// Per-statement execution limit.
    pub timeout: Option<Duration>,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            row_cap: 1000,
            timeout: None,
        }
    }
}

/// What one result set of a statement produced.
pub enum StatementOutcome<'c> {
    /// Rows, already limited to the row cap.
    Rows(&'c mut dyn ResultCursor),
    Affected(u64),
}

/// Receives progress while a script runs. Every method defaults to a no-op.
pub trait ScriptObserver {
    fn on_statement(&mut self, _index: usize, _sql: &str) {}

    /// Called once per result set of a statement.
    fn on_result(&mut self, _index: usize, _outcome: StatementOutcome<'_>, _elapsed: Duration) {}

    fn on_error(&mut self, _index: usize, _error: &Error) {}
}

impl ScriptObserver for () {}

/// Summary of a finished script run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub statements: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `(statement index, native message)` per failure.
    pub errors: Vec<(usize, String)>,
    pub elapsed: Duration,
    /// Stopped early because of `stop_on_error`.
    pub halted: bool,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
