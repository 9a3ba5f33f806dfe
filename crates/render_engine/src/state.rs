//! Observable lifecycle state of an engine adapter.

use std::fmt;

/// What an adapter reports from [`EngineAdapter::status`](crate::EngineAdapter::status).
///
/// `Success` and `Failure` are terminal: the process has been released and the
/// outcome stays put until the next `begin_render`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// No process has run yet, and no exit code has been recorded.
    #[default]
    Stopped,
    /// A renderer process is alive.
    Running,
    /// The last render exited cleanly and its artifacts were captured.
    Success,
    /// The last render failed and its retry budget is exhausted.
    Failure,
}

impl ProcessState {
    /// Returns `true` for `Success` and `Failure`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// The upper-case name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
