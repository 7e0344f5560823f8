//! Frame transport seam between the session core and a concrete socket.
//!
//! A connection is split into a [`FrameSource`] (read half, owned by the
//! reader loop) and a [`FrameSink`] (write half, owned by the write
//! serializer). The axum `WebSocket` halves implement both; `memory`
//! provides an in-process duplex for unit tests.

#[cfg(test)]
pub mod memory;

use std::borrow::Cow;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::errors::TransportError;

/// One WebSocket frame as seen by the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 application message.
    Text(String),
    /// Binary application message.
    Binary(Bytes),
    /// Heartbeat probe.
    Ping(Bytes),
    /// Heartbeat acknowledgment.
    Pong(Bytes),
    /// Close handshake.
    Close,
}

/// Payload-free discriminant of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// See [`Frame::Text`].
    Text,
    /// See [`Frame::Binary`].
    Binary,
    /// See [`Frame::Ping`].
    Ping,
    /// See [`Frame::Pong`].
    Pong,
    /// See [`Frame::Close`].
    Close,
}

impl Frame {
    /// The frame's kind.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Text(_) => FrameKind::Text,
            Self::Binary(_) => FrameKind::Binary,
            Self::Ping(_) => FrameKind::Ping,
            Self::Pong(_) => FrameKind::Pong,
            Self::Close => FrameKind::Close,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b.len(),
            Self::Close => 0,
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An application message taken off the connection by the reader loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Text payload.
    Text(String),
    /// Binary payload.
    Binary(Bytes),
}

impl InboundMessage {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload as text; invalid UTF-8 in binary payloads is replaced.
    pub fn as_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Self::Text(t) => Cow::Borrowed(t.as_str()),
            Self::Binary(b) => String::from_utf8_lossy(b),
        }
    }
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next frame. `None` means the stream ended.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame, flushing it to the peer.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send a close frame and shut the write half down.
    async fn close(&mut self) -> Result<(), TransportError>;
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(t) => Self::Text(t.as_str().to_owned()),
            Message::Binary(b) => Self::Binary(b),
            Message::Ping(b) => Self::Ping(b),
            Message::Pong(b) => Self::Pong(b),
            Message::Close(_) => Self::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(t) => Self::Text(t.into()),
            Frame::Binary(b) => Self::Binary(b),
            Frame::Ping(b) => Self::Ping(b),
            Frame::Pong(b) => Self::Pong(b),
            Frame::Close => Self::Close(None),
        }
    }
}

#[async_trait]
impl FrameSource for SplitStream<WebSocket> {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.next()
            .await
            .map(|res| res.map(Frame::from).map_err(TransportError::from))
    }
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        SinkExt::send(self, Message::from(frame))
            .await
            .map_err(TransportError::from)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self).await.map_err(TransportError::from)
    }
}

/// Split an upgraded axum socket into its source and sink halves.
pub fn split(socket: WebSocket) -> (SplitStream<WebSocket>, SplitSink<WebSocket, Message>) {
    let (sink, stream) = socket.split();
    (stream, sink)
}
