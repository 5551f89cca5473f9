//! WebSocket transport
//!
//! Adapts an upgraded axum [`WebSocket`] to the hub's byte-oriented
//! transport. Inbound text and binary frames are both treated as raw bytes.
//! A frame larger than the caller's buffer is handed out over successive
//! reads. Outbound payloads go out as text frames when they are valid UTF-8
//! and as binary frames otherwise.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::error::TransportError;

use super::{ReadOutcome, Transport, TransportReader, TransportWriter};

/// Transport over an upgraded WebSocket
pub struct WsTransport {
    socket: WebSocket,
    remote: String,
}

impl WsTransport {
    /// Wrap an upgraded socket
    pub fn new(socket: WebSocket, remote: impl Into<String>) -> Self {
        Self {
            socket,
            remote: remote.into(),
        }
    }
}

impl Transport for WsTransport {
    type Reader = WsReader;
    type Writer = WsWriter;

    fn remote_identity(&self) -> String {
        self.remote.clone()
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.socket.split();
        (
            WsReader {
                inner: stream,
                pending: Bytes::new(),
            },
            WsWriter { inner: sink },
        )
    }
}

/// Reader half of a [`WsTransport`]
pub struct WsReader {
    inner: SplitStream<WebSocket>,
    /// Unread remainder of the current frame
    pending: Bytes,
}

impl WsReader {
    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        let chunk = self.pending.split_to(n);
        buf[..n].copy_from_slice(&chunk);
        n
    }
}

impl TransportReader for WsReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        if buf.is_empty() {
            return Ok(ReadOutcome::Data(0));
        }

        if !self.pending.is_empty() {
            return Ok(ReadOutcome::Data(self.drain_pending(buf)));
        }

        match self.inner.next().await {
            None | Some(Ok(Message::Close(_))) => Ok(ReadOutcome::Closed),
            Some(Ok(Message::Text(text))) => {
                self.pending = Bytes::copy_from_slice(text.as_str().as_bytes());
                Ok(ReadOutcome::Data(self.drain_pending(buf)))
            }
            Some(Ok(Message::Binary(data))) => {
                self.pending = data;
                Ok(ReadOutcome::Data(self.drain_pending(buf)))
            }
            // Control frames carry no payload for the hub
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(ReadOutcome::Data(0)),
            Some(Err(e)) => Err(TransportError::WebSocket(e.to_string())),
        }
    }
}

/// Writer half of a [`WsTransport`]
pub struct WsWriter {
    inner: SplitSink<WebSocket, Message>,
}

impl TransportWriter for WsWriter {
    async fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let message = match std::str::from_utf8(payload) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(Bytes::copy_from_slice(payload)),
        };

        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.inner.close().await;
    }
}
