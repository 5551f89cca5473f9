//! Raw byte stream transport
//!
//! Wraps anything implementing `AsyncRead + AsyncWrite` (a `TcpStream`, a
//! `tokio::io::duplex` pipe). There is no framing: each read hands back
//! whatever bytes the stream produced, up to the buffer size.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::error::TransportError;

use super::{ReadOutcome, Transport, TransportReader, TransportWriter};

/// Transport over a raw byte stream
pub struct StreamTransport<S> {
    stream: S,
    remote: String,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a stream with the given remote identity
    pub fn new(stream: S, remote: impl Into<String>) -> Self {
        Self {
            stream,
            remote: remote.into(),
        }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    type Reader = StreamReader<S>;
    type Writer = StreamWriter<S>;

    fn remote_identity(&self) -> String {
        self.remote.clone()
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (read_half, write_half) = tokio::io::split(self.stream);
        (StreamReader { inner: read_half }, StreamWriter { inner: write_half })
    }
}

/// Reader half of a [`StreamTransport`]
pub struct StreamReader<S> {
    inner: ReadHalf<S>,
}

impl<S> TransportReader for StreamReader<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        if buf.is_empty() {
            return Ok(ReadOutcome::Data(0));
        }

        match self.inner.read(buf).await {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if is_disconnect(&e) => Ok(ReadOutcome::Closed),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

/// Writer half of a [`StreamTransport`]
pub struct StreamWriter<S> {
    inner: WriteHalf<S>,
}

impl<S> TransportWriter for StreamWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

// Errors after which the peer is gone for good
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_data_error_and_eof() {
        let mock = tokio_test::io::Builder::new()
            .read(b"hello")
            .read_error(io::Error::new(io::ErrorKind::Other, "glitch"))
            .read(b"again")
            .build();
        let (mut reader, _writer) = StreamTransport::new(mock, "mock").split();
        let mut buf = [0u8; 16];

        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Data(5));
        assert_eq!(&buf[..5], b"hello");

        // A non-disconnect error is transient
        assert!(matches!(
            reader.read(&mut buf).await,
            Err(TransportError::Io(_))
        ));

        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Data(5));
        assert_eq!(&buf[..5], b"again");

        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn test_reset_is_closed() {
        let mock = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (mut reader, _writer) = StreamTransport::new(mock, "mock").split();
        let mut buf = [0u8; 8];

        assert_eq!(reader.read(&mut buf).await.unwrap(), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn test_write_payload() {
        let mock = tokio_test::io::Builder::new().write(b"Order ready").build();
        let (_reader, mut writer) = StreamTransport::new(mock, "mock").split();

        writer.write(b"Order ready").await.unwrap();
    }

    #[tokio::test]
    async fn test_write_error() {
        let mock = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"))
            .build();
        let (_reader, mut writer) = StreamTransport::new(mock, "mock").split();

        assert!(writer.write(b"x").await.is_err());
    }

    #[test]
    fn test_remote_identity() {
        let (a, _b) = tokio::io::duplex(64);
        let transport = StreamTransport::new(a, "10.0.0.7:4100");
        assert_eq!(transport.remote_identity(), "10.0.0.7:4100");
    }
}
