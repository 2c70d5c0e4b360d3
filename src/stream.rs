//! # Buffer Server Output Stream
//!
//! Write side of a logical stream between a node and the buffer server. The
//! buffer server persists frames and retains them until every subscriber has
//! consumed them; this component only turns tuples into [`Frame`]s, in
//! arrival order, and hands them to a [`Transport`].
//!
//! ## Lifecycle
//!
//! 1. [`activate`](BufferServerOutputStream::activate) registers the publisher
//!    with the transport, announcing source, sink and starting window.
//! 2. [`sink`](BufferServerOutputStream::sink) encodes and sends each tuple.
//! 3. `END_STREAM` is terminal; the stream refuses anything after it.
//!
//! ## Encoding
//!
//! | Tuple | Frame |
//! |---|---|
//! | `BEGIN_WINDOW` | node identity + window id |
//! | `END_WINDOW` | node identity + window id + data tuples sent in the window |
//! | `RESET_WINDOW` | tick width; `base_seconds << 32` in the window id slot |
//! | `END_STREAM` | empty body |
//! | data with key | `PARTITIONED_DATA` (key + payload) |
//! | data without key | `SIMPLE_DATA` (payload) |
//!
//! Any other kind fails with [`StreamError::UnsupportedTupleKind`] and nothing
//! is sent.

use crate::config::StreamConfig;
use crate::frame::{Frame, FrameBody};
use crate::partitioning::{PartitioningSerializer, SerializationError};
use crate::protocol::{ProtocolError, Transition, WindowProtocol};
use crate::transport::{Registration, Transport, TransportError};
use crate::tuple::{ControlTuple, Tuple, TupleKind};
use crate::window::WindowId;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors raised by the output stream. All of them are fatal to the stream.
#[derive(Debug, Error)]
pub enum StreamError {
  /// The framing layer does not handle this tuple kind.
  #[error("tuple kind {0} is not handled by the buffer server stream")]
  UnsupportedTupleKind(TupleKind),
  /// The payload could not be encoded.
  #[error(transparent)]
  Serialization(#[from] SerializationError),
  /// The transport rejected the frame or registration.
  #[error(transparent)]
  Transport(#[from] TransportError),
  /// The tuple breaks the window-control protocol.
  #[error(transparent)]
  Protocol(#[from] ProtocolError),
  /// A tuple arrived before `activate`.
  #[error("stream is not active")]
  NotActive,
  /// `activate` was called twice.
  #[error("stream is already active")]
  AlreadyActive,
}

/// Identity of a logical stream handed to [`BufferServerOutputStream::activate`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamContext {
  /// Upstream node port publishing on the stream.
  pub source_id: String,
  /// Stream identity.
  pub sink_id: String,
  /// Window from which the stream starts publishing.
  pub starting_window_id: WindowId,
}

impl StreamContext {
  /// Creates a context starting at window 0.
  pub fn new(source_id: impl Into<String>, sink_id: impl Into<String>) -> Self {
    Self {
      source_id: source_id.into(),
      sink_id: sink_id.into(),
      starting_window_id: WindowId::default(),
    }
  }

  /// Sets the starting window.
  #[must_use]
  pub fn with_starting_window_id(mut self, window_id: WindowId) -> Self {
    self.starting_window_id = window_id;
    self
  }

  fn registration(&self) -> Registration {
    Registration {
      source_id: self.source_id.clone(),
      sink_id: self.sink_id.clone(),
      starting_window_id: self.starting_window_id,
    }
  }
}

/// Encodes tuples into frames and forwards them to a transport.
pub struct BufferServerOutputStream<P, S, T> {
  config: StreamConfig,
  serializer: S,
  transport: T,
  registration: Option<Registration>,
  protocol: WindowProtocol,
  _payload: PhantomData<fn(P)>,
}

impl<P, S, T> BufferServerOutputStream<P, S, T>
where
  S: PartitioningSerializer<P>,
  T: Transport,
{
  /// Creates an inactive stream.
  pub fn new(config: StreamConfig, serializer: S, transport: T) -> Self {
    Self {
      config,
      serializer,
      transport,
      registration: None,
      protocol: WindowProtocol::new(),
      _payload: PhantomData,
    }
  }

  /// Returns the stream configuration.
  pub fn config(&self) -> &StreamConfig {
    &self.config
  }

  /// Registration announced at activation, if active.
  pub fn registration(&self) -> Option<&Registration> {
    self.registration.as_ref()
  }

  /// Returns the transport.
  pub fn transport(&self) -> &T {
    &self.transport
  }

  /// Returns the transport mutably, e.g. to drain its send buffer.
  pub fn transport_mut(&mut self) -> &mut T {
    &mut self.transport
  }

  /// Window currently open on the stream.
  pub fn current_window(&self) -> Option<WindowId> {
    self.protocol.current_window()
  }

  /// Registers this stream with the transport. Must precede the first tuple and
  /// may only happen once.
  pub fn activate(&mut self, context: &StreamContext) -> Result<(), StreamError> {
    if self.registration.is_some() {
      return Err(StreamError::AlreadyActive);
    }
    let registration = context.registration();
    debug!(
      source_id = %registration.source_id,
      sink_id = %registration.sink_id,
      starting_window_id = %registration.starting_window_id,
      "registering publisher"
    );
    self.transport.publish(&registration)?;
    self.registration = Some(registration);
    Ok(())
  }

  /// Drops the registration. The protocol state is kept, so a deactivated
  /// stream that is activated again continues where it stopped.
  pub fn deactivate(&mut self) {
    if let Some(registration) = self.registration.take() {
      debug!(sink_id = %registration.sink_id, "publisher deactivated");
    }
  }

  /// Builds the frame for `tuple` against the current stream state without
  /// sending it or changing any state.
  pub fn encode(&self, tuple: &Tuple<P>) -> Result<Frame, StreamError> {
    match tuple {
      Tuple::Control(control) => {
        let frame = self.encode_control(*control)?;
        self.protocol.check(tuple)?;
        Ok(frame)
      }
      Tuple::Data(payload) => {
        self.protocol.check(tuple)?;
        let window_id = self.protocol.current_window().unwrap_or_default();
        let bytes = self.serializer.to_bytes(payload)?;
        let body = match self.serializer.partition(payload) {
          Some(key) => FrameBody::PartitionedData {
            partition_key: key.into_bytes(),
            payload: bytes,
          },
          None => FrameBody::SimpleData { payload: bytes },
        };
        Ok(Frame::new(window_id, body))
      }
    }
  }

  fn encode_control(&self, control: ControlTuple) -> Result<Frame, StreamError> {
    let body = match control {
      ControlTuple::BeginWindow(_) => FrameBody::BeginWindow {
        node: self.config.node_id.clone(),
      },
      ControlTuple::EndWindow(_) => FrameBody::EndWindow {
        node: self.config.node_id.clone(),
        tuple_count: self.protocol.tuple_count(),
      },
      ControlTuple::EndStream(_) => FrameBody::EndStream,
      ControlTuple::ResetWindow {
        interval_millis, ..
      } => FrameBody::ResetWindow { interval_millis },
      ControlTuple::Checkpoint(_) => {
        return Err(StreamError::UnsupportedTupleKind(control.kind()));
      }
    };
    Ok(Frame::new(control.window_id(), body))
  }

  /// Encodes `tuple` and sends it. On error nothing is sent.
  pub fn sink(&mut self, tuple: Tuple<P>) -> Result<(), StreamError> {
    if self.registration.is_none() {
      warn!(kind = %tuple.kind(), "tuple refused by inactive stream");
      return Err(StreamError::NotActive);
    }
    let frame = self.encode(&tuple).inspect_err(|e| {
      warn!(kind = %tuple.kind(), error = %e, "tuple refused by stream");
    })?;
    trace!(kind = %frame.kind(), window_id = %frame.window_id, "sending frame");
    self.transport.send(frame)?;
    match self.protocol.advance(&tuple) {
      Transition::Closed {
        window_id,
        tuple_count,
      } => trace!(%window_id, tuple_count, "window published"),
      Transition::Ended => debug!("stream ended"),
      _ => {}
    }
    Ok(())
  }
}
