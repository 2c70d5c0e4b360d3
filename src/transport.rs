//! # Buffer Server Transports
//!
//! A [`Transport`] sits beneath the framing layer. It receives one publisher
//! [`Registration`] when the stream activates and then every [`Frame`] in
//! arrival order. Sockets and queues are out of scope here; two in-process
//! transports are provided:
//!
//! - [`BufferedTransport`]: encodes frames with [`FrameCodec`] into a send
//!   buffer that the owner drains.
//! - [`ChannelTransport`]: hands registrations and frames to another task over
//!   a tokio unbounded channel, for a buffer server running in-process.

use crate::frame::{Frame, FrameCodec, FrameError};
use crate::window::WindowId;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tracing::trace;

/// Publisher identity announced once when a stream activates.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Registration {
  /// Identity of the upstream node port publishing on this stream.
  pub source_id: String,
  /// Identity of the stream (its sink).
  pub sink_id: String,
  /// Window from which the stream starts publishing.
  pub starting_window_id: WindowId,
}

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
  /// Frame could not be encoded.
  #[error("frame error: {0}")]
  Frame(#[from] FrameError),
  /// Receiving side has gone away.
  #[error("transport closed")]
  Closed,
}

/// Sink for registrations and frames.
pub trait Transport: Send {
  /// Registers the publisher. Called once, before the first frame.
  fn publish(&mut self, registration: &Registration) -> Result<(), TransportError>;

  /// Appends one frame to the outbound stream.
  fn send(&mut self, frame: Frame) -> Result<(), TransportError>;
}

/// Transport that encodes frames into an in-memory send buffer.
#[derive(Debug, Default)]
pub struct BufferedTransport {
  codec: FrameCodec,
  registration: Option<Registration>,
  buffer: BytesMut,
  frames_sent: u64,
}

impl BufferedTransport {
  /// Creates an empty buffered transport.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a transport whose codec uses `codec`'s frame limit.
  pub fn with_codec(codec: FrameCodec) -> Self {
    Self {
      codec,
      ..Self::default()
    }
  }

  /// Registration received from [`Transport::publish`], if any.
  pub fn registration(&self) -> Option<&Registration> {
    self.registration.as_ref()
  }

  /// Bytes waiting in the send buffer.
  pub fn pending(&self) -> &[u8] {
    &self.buffer
  }

  /// Number of frames encoded so far.
  pub fn frames_sent(&self) -> u64 {
    self.frames_sent
  }

  /// Drains the send buffer.
  pub fn take_pending(&mut self) -> Bytes {
    self.buffer.split().freeze()
  }
}

impl Transport for BufferedTransport {
  fn publish(&mut self, registration: &Registration) -> Result<(), TransportError> {
    self.registration = Some(registration.clone());
    Ok(())
  }

  fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
    trace!(kind = %frame.kind(), window_id = %frame.window_id, "buffering frame");
    self.codec.encode(frame, &mut self.buffer)?;
    self.frames_sent += 1;
    Ok(())
  }
}

/// Message delivered by a [`ChannelTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportMessage {
  /// Publisher registration.
  Publish(Registration),
  /// One frame.
  Frame(Frame),
}

/// Transport that forwards to a tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
  sender: mpsc::UnboundedSender<TransportMessage>,
}

impl ChannelTransport {
  /// Creates a transport and the receiver the buffer server reads from.
  pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportMessage>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }

  fn deliver(&self, message: TransportMessage) -> Result<(), TransportError> {
    self.sender.send(message).map_err(|_| TransportError::Closed)
  }
}

impl Transport for ChannelTransport {
  fn publish(&mut self, registration: &Registration) -> Result<(), TransportError> {
    self.deliver(TransportMessage::Publish(registration.clone()))
  }

  fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
    trace!(kind = %frame.kind(), window_id = %frame.window_id, "forwarding frame");
    self.deliver(TransportMessage::Frame(frame))
  }
}
