//! Replication Pipeline Error Hierarchy
//!
//! Defines the error types of the change-data-capture pipeline, categorized by
//! the layer that produced them. Runtime faults are handled where they occur
//! (retried, skipped or logged); only startup paths propagate them to the caller.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (upstream, storage, network, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Source store connection and protocol failures
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Local embedded store failures
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Admin/agent front-end failures
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Component failed during startup
    #[error("Component failed to start: {0}")]
    StartFailed(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Socket level read/write failures
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Peer closed the connection (EOF on read)
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Connect did not complete within the configured timeout
    #[error("Connect to {addr} timed out after {duration:?}")]
    ConnectTimeout { addr: String, duration: Duration },

    /// Operation issued before `connect()` or after `close()`
    #[error("Not connected")]
    NotConnected,

    /// Malformed bytes on the wire
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Error reply sent by the server (e.g. `-ERR ...`)
    #[error("Server replied error: {0}")]
    Server(String),

    /// Well-formed reply of the wrong shape for the issued command
    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },
}

impl UpstreamError {
    /// Transport faults are worth a reconnect; server replies are not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            UpstreamError::Io(_)
                | UpstreamError::ConnectionClosed
                | UpstreamError::ConnectTimeout { .. }
                | UpstreamError::NotConnected
                | UpstreamError::Protocol(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to bind a listening socket
    #[error("Bind {addr} failed: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Length prefix above the configured frame limit
    #[error("Frame exceeds limit of {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("{0}")]
    SignalSendFailed(String),
}

// Serialization is classified separately (used by the pipeline and the front-ends)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============== Conversion Implementations ============== //
impl From<UpstreamError> for Error {
    fn from(e: UpstreamError) -> Self {
        Error::System(SystemError::Upstream(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        SerializationError::Json(e).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}

impl Error {
    /// Returns the upstream fault if this error wraps one.
    pub fn as_upstream(&self) -> Option<&UpstreamError> {
        match self {
            Error::System(SystemError::Upstream(e)) => Some(e),
            _ => None,
        }
    }

    /// True when the error is an upstream transport fault (retry with reconnect).
    pub fn is_upstream_transport(&self) -> bool {
        self.as_upstream().map(UpstreamError::is_transport).unwrap_or(false)
    }
}
