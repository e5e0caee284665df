//! Outbound status reports.
//!
//! Published to the status topic after each drained command.  The
//! `Display` impl is the wire text.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Stopped,
    MovingForward,
    MovingBackward,
    /// The received text did not match any command.
    UnknownCommand(String),
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::MovingForward => write!(f, "moving forward"),
            Self::MovingBackward => write!(f, "moving backward"),
            Self::UnknownCommand(raw) => write!(f, "unknown command: {raw}"),
        }
    }
}
