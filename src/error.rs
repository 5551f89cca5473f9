//! Error types
//!
//! Transport and delivery failures are handled inside the hub and only show
//! up in logs and delivery reports. The crate-level [`Error`] is returned by
//! the few operations that can fail outright, such as binding the listener.

use std::fmt;
use std::io;

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error (bind, accept)
    Io(io::Error),
    /// Transport failure
    Transport(TransportError),
    /// Delivery failure
    Delivery(DeliveryError),
    /// Invalid configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Delivery(e) => write!(f, "Delivery error: {}", e),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Delivery(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<DeliveryError> for Error {
    fn from(e: DeliveryError) -> Self {
        Error::Delivery(e)
    }
}

/// Failure reported by a transport half
#[derive(Debug)]
pub enum TransportError {
    /// The stream is closed and can no longer be written
    Closed,
    /// Underlying socket error
    Io(io::Error),
    /// WebSocket protocol error
    WebSocket(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "stream closed"),
            TransportError::Io(e) => write!(f, "{}", e),
            TransportError::WebSocket(msg) => write!(f, "websocket: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Why a payload did not reach a connection
#[derive(Debug)]
pub enum DeliveryError {
    /// Connection was already closed (or closed before the write ran)
    Closed,
    /// Outbound queue is full; the payload was dropped for this recipient
    QueueFull,
    /// The transport write failed
    Write(TransportError),
}

impl DeliveryError {
    /// Whether the recipient should be deregistered because of this failure
    ///
    /// A full queue only costs the recipient one payload; everything else
    /// means the connection is gone.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryError::QueueFull)
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Closed => write!(f, "connection closed"),
            DeliveryError::QueueFull => write!(f, "outbound queue full"),
            DeliveryError::Write(e) => write!(f, "write failed: {}", e),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeliveryError::Write(e) => Some(e),
            _ => None,
        }
    }
}
