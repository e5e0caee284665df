//! Inbound conveyor commands.
//!
//! Control-topic payloads are UTF-8 text.  Decoding trims surrounding
//! whitespace and ignores ASCII case; any other text is kept verbatim (after
//! trimming) in [`Command::Unknown`] so it can be echoed back in the status
//! report.  Decoding never fails.

use super::events::StatusReport;

/// Commands the outside world can send to the belt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `stop`
    Stop,
    /// `fwd`
    MoveForward,
    /// `back`
    MoveBackward,
    /// Anything else, carrying the received text.
    Unknown(String),
}

impl Command {
    /// Decode raw payload bytes.  Invalid UTF-8 sequences are replaced and
    /// end up in [`Command::Unknown`].
    pub fn decode(payload: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(payload))
    }

    pub fn parse(text: &str) -> Self {
        let t = text.trim();
        if t.eq_ignore_ascii_case("stop") {
            Self::Stop
        } else if t.eq_ignore_ascii_case("fwd") {
            Self::MoveForward
        } else if t.eq_ignore_ascii_case("back") {
            Self::MoveBackward
        } else {
            Self::Unknown(t.to_owned())
        }
    }

    /// Status reported once this command has been applied.
    pub fn status(&self) -> StatusReport {
        match self {
            Self::Stop => StatusReport::Stopped,
            Self::MoveForward => StatusReport::MovingForward,
            Self::MoveBackward => StatusReport::MovingBackward,
            Self::Unknown(raw) => StatusReport::UnknownCommand(raw.clone()),
        }
    }
}
