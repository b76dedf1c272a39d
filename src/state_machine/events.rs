use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that trigger run status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    /// First tick picked the run up
    Start,
    /// The run hit a delay node or a retry backoff
    Suspend,
    /// A tick picked a suspended run back up
    Resume,
    /// A success terminal node was reached
    Complete,
    /// A failure terminal node or an unrecoverable error was reached
    Fail,
    /// Cancellation was requested
    Cancel,
}

impl RunEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Fail | Self::Cancel)
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}
