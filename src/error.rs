//! Error types for gpcp

use thiserror::Error;

/// Result type alias using the gpcp `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the endpoint, dispatcher, handler registry, and the
/// server/client facades built on top of them.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid server/client/endpoint configuration (bad host/port/role,
    /// backlog, or other construction-time argument).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A command name failed identifier validation, collided with an
    /// already-registered command, or a second unknown-command fallback
    /// was registered.
    #[error("handler loading error: {0}")]
    HandlerLoading(String),

    /// A command identifier did not satisfy the naming grammar.
    #[error("annotation error: {0}")]
    Annotation(String),

    /// A documented precondition was violated by caller-supplied data that
    /// the type system could not rule out ahead of time.
    #[error("unmet precondition: {0}")]
    UnmetPrecondition(String),

    /// Wire framing or payload decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] gpcp_protocol::ProtocolError),

    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The two peers negotiated roles that cannot talk to each other
    /// (requester/requester or responder/responder).
    #[error("role negotiation failed: local={local} remote={remote}")]
    RoleMismatch { local: String, remote: String },

    /// Waiting for inbound activity exceeded the configured timeout. This
    /// is normally caught internally by the dispatcher/main loops to drive
    /// stop-flag polling and rarely escapes to a caller.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The remote peer closed the connection, or the connection was shut
    /// down locally; this drives the sentinel shutdown path.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The endpoint or server was asked to do something after it had
    /// already been closed/stopped.
    #[error("endpoint is closed")]
    Closed,
}
