//! Unified error types for the conveyor controller.
//!
//! Each subsystem has its own small `Copy` error enum so the control loop
//! can match on it cheaply; all of them convert into the crate-level
//! [`Error`] for callers that only want to propagate with `?`.
//!
//! Unknown command text is deliberately absent here: it is not an error,
//! it decodes to [`Command::Unknown`](crate::app::commands::Command::Unknown)
//! and is answered with a status message.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Establishing the broker connection failed.
    Connection(ConnectionError),
    /// A subscribe request failed.
    Subscription(SubscriptionError),
    /// A publish request failed.
    Publish(PublishError),
    /// The dispatch queue refused a pending action.
    Dispatch(DispatchError),
    /// Configuration is invalid or could not be parsed.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "connection: {e}"),
            Self::Subscription(e) => write!(f, "subscription: {e}"),
            Self::Publish(e) => write!(f, "publish: {e}"),
            Self::Dispatch(e) => write!(f, "dispatch: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Connection errors
// ---------------------------------------------------------------------------

/// Failures at connect time.  Terminal for that connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    /// A connection setting is missing or malformed.
    InvalidConfig(&'static str),
    /// The transport-security policy could not be applied.
    Security(&'static str),
    /// TCP/TLS handshake with the broker failed.
    Handshake,
    /// The broker refused the supplied credentials.
    Authentication,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid connection config: {msg}"),
            Self::Security(msg) => write!(f, "transport security: {msg}"),
            Self::Handshake => write!(f, "broker handshake failed"),
            Self::Authentication => write!(f, "broker rejected credentials"),
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

// ---------------------------------------------------------------------------
// Subscription errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Subscribe attempted before the link came up (or after it dropped).
    NotConnected,
    /// The broker refused the topic filter.
    Rejected,
    /// The transport failed while sending the request.
    Transport,
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Rejected => write!(f, "topic rejected by broker"),
            Self::Transport => write!(f, "transport error"),
        }
    }
}

impl From<SubscriptionError> for Error {
    fn from(e: SubscriptionError) -> Self {
        Self::Subscription(e)
    }
}

// ---------------------------------------------------------------------------
// Publish errors
// ---------------------------------------------------------------------------

/// Publish failures are reported per attempt and never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// Publish attempted while the link is down.
    NotConnected,
    /// The broker refused the message.
    Rejected,
    /// The transport failed while queueing the message.
    Transport,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "client not connected"),
            Self::Rejected => write!(f, "message rejected by broker"),
            Self::Transport => write!(f, "transport error"),
        }
    }
}

impl From<PublishError> for Error {
    fn from(e: PublishError) -> Self {
        Self::Publish(e)
    }
}

// ---------------------------------------------------------------------------
// Dispatch errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The queue is at capacity; the action was dropped.
    Full,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "dispatch queue full"),
        }
    }
}

impl From<DispatchError> for Error {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for the schema.
    Parse,
    /// A field failed validation.  The string names the field and rule.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "malformed configuration document"),
            Self::Invalid(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Controller-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
