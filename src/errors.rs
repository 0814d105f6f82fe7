//! Errors.

use std::io;

/// Top-level error type propagated out of a connection's dispatch loop.
///
/// Each Session-fatal condition maps to exactly one of these kinds; the
/// mapping is performed by the dispatcher, not by individual handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid configuration: {0}")]
    BadConfig(String),

    #[error("shutting down")]
    ShuttingDown,

    #[error("peer closed the connection")]
    Closed,
}

/// Wire-framing and state-machine violations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("connection closed before any bytes were read")]
    PeerClosed,

    #[error("connection closed mid-frame")]
    Truncated,

    #[error("frame length {0} exceeds the configured ceiling of {1} bytes")]
    OversizeLength(i32, usize),

    #[error("invalid frame length {0}")]
    InvalidLength(i32),

    #[error("unexpected message type {0:?} in the current session state")]
    UnexpectedMessage(Option<u8>),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unexpected startup code {0}")]
    UnexpectedStartupCode(i32),

    #[error("client startup message is missing the required 'user' parameter")]
    MissingUser,
}

/// Authentication failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password authentication failed for user \"{0}\"")]
    WrongPassword(String),

    #[error("unsupported authentication method requested by configuration")]
    UnsupportedMethod,
}

/// SQLSTATE codes the core and its default handlers may emit.
pub mod sqlstate {
    pub const PROTOCOL_VIOLATION: &str = "08P01";
    pub const INVALID_PASSWORD: &str = "28P01";
    pub const QUERY_CANCELED: &str = "57014";
    pub const ADMIN_SHUTDOWN: &str = "57P01";
    pub const SYNTAX_ERROR: &str = "42601";
    pub const INTERNAL_ERROR: &str = "XX000";
}
