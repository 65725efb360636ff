//! Error types shared across the engine.
//!
//! Nothing in the engine is fatal: these errors are logged and swallowed at
//! the façade boundary, or turned into a falsy return value.

use thiserror::Error;

/// A patch could not be merged into a pen.
#[derive(Debug, Error)]
pub enum PenError {
    #[error("Patch does not fit the pen schema: {0}")]
    InvalidPatch(#[from] serde_json::Error),
}

/// Failure while compiling or running a behavior script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("Unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("Unexpected token at offset {offset}: expected {expected}")]
    UnexpectedToken { offset: usize, expected: String },
    #[error("Unexpected end of script: expected {0}")]
    UnexpectedEnd(String),
    #[error("Unknown root '{0}' (expected `pen` or `params`)")]
    UnknownRoot(String),
    #[error("Only `pen.<field>` can be assigned, found '{0}'")]
    InvalidAssignment(String),
    #[error("Nesting deeper than {limit} levels at offset {offset}")]
    TooDeep { offset: usize, limit: usize },
    #[error("Expression larger than {limit} operations at offset {offset}")]
    TooLarge { offset: usize, limit: usize },
    #[error("Empty script")]
    Empty,
}

/// Inbound live-data payload could not be interpreted.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Payload item is not an object: {0}")]
    NotAnObject(String),
}

/// Live-data channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid WebSocket URL scheme: {0}")]
    InvalidScheme(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    SendFailed(String),
}
