//! Error types for tchat-client.

use std::{fmt, io};

use tchat_session::{SessionError, StoreError};

/// The error type returned from any `Client` method.
#[derive(Debug)]
pub enum ClientError {
    /// TCP connect or the connect-time handshake failed.
    ConnectionFailed(io::Error),
    /// The server broke protocol while connecting.
    Handshake(&'static str),
    /// The connect-time exchange did not finish within the timeout.
    Timeout,
    /// Network / I/O failure after connect.
    Io(io::Error),
    /// The client is not (or no longer) connected.
    NotConnected,
    /// The at-rest key store refused us.
    Store(StoreError),
    /// The session layer refused the operation.
    Session(SessionError),
    /// A group message was attempted before any group key arrived.
    NoGroupKey { group_id: u32 },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(e) => write!(f, "connection failed: {e}"),
            Self::Handshake(why) => write!(f, "server handshake violation: {why}"),
            Self::Timeout => write!(f, "timed out waiting for the server"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Store(e) => write!(f, "{e}"),
            Self::Session(e) => write!(f, "{e}"),
            Self::NoGroupKey { group_id } => {
                write!(f, "no key for group {group_id}: wait for the admin's distribution")
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<SessionError> for ClientError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}
