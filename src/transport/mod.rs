//! Transport abstraction
//!
//! A transport is one duplex byte stream with a client. The hub splits it into
//! a reader half, owned by the connection's read loop, and a writer half,
//! owned by the connection's writer task, so reads and writes never contend.
//!
//! Two transports are provided:
//! - [`StreamTransport`] for any `AsyncRead + AsyncWrite` stream (TCP, duplex pipes)
//! - [`WsTransport`] for an upgraded axum WebSocket

pub mod stream;
pub mod websocket;

use std::future::Future;

use crate::error::TransportError;

pub use stream::StreamTransport;
pub use websocket::WsTransport;

/// Result of a single read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were written into the front of the buffer (may be 0)
    Data(usize),
    /// Clean end of stream
    Closed,
}

/// A duplex stream that can be split into independent halves
pub trait Transport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    /// Remote identity for logging (usually the peer address)
    fn remote_identity(&self) -> String;

    /// Split into reader and writer halves
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Inbound half of a transport
pub trait TransportReader: Send + 'static {
    /// Read at most `buf.len()` bytes
    ///
    /// An `Err` is a transient failure; the caller decides whether to retry.
    /// End of stream is reported as `Ok(ReadOutcome::Closed)`.
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<ReadOutcome, TransportError>> + Send;
}

/// Outbound half of a transport
pub trait TransportWriter: Send + 'static {
    /// Write one payload in full
    fn write(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the outbound half; errors are ignored
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
