//! Window emitter for the publishing side of a stream.
//!
//! [`WindowEmitter`] turns calls like "open a window", "emit this payload",
//! "close the window" into a well-formed tuple sequence for a [`TupleSink`]:
//! window ids are assigned from the current epoch, `END_WINDOW` always matches
//! the open `BEGIN_WINDOW`, and nothing is sent after `END_STREAM`.
//!
//! ```rust
//! use slideweave::emitter::WindowEmitter;
//! use slideweave::tuple::Tuple;
//! use slideweave::window::WindowId;
//!
//! let mut emitter = WindowEmitter::new(Vec::new(), WindowId::new(0, 0));
//! emitter.reset_window(0xcafe_babe, 500).unwrap();
//! let id = emitter.begin_window().unwrap();
//! emitter.emit("hello").unwrap();
//! assert_eq!(emitter.end_window().unwrap(), 1);
//!
//! let sent = emitter.into_inner();
//! assert_eq!(sent[1], Tuple::begin_window(id));
//! assert_eq!(id, WindowId::new(0xcafe_babe, 0));
//! ```

use crate::partitioning::PartitioningSerializer;
use crate::protocol::{ProtocolError, Transition, WindowProtocol};
use crate::stream::{BufferServerOutputStream, StreamError};
use crate::transport::Transport;
use crate::tuple::Tuple;
use crate::window::WindowId;
use std::marker::PhantomData;
use tracing::trace;

/// Destination for a windowed tuple sequence.
pub trait TupleSink<P> {
  /// Error raised by the sink. Protocol violations detected by the emitter are
  /// reported through it too.
  type Error: From<ProtocolError>;

  /// Accepts one tuple.
  fn sink(&mut self, tuple: Tuple<P>) -> Result<(), Self::Error>;
}

impl<P> TupleSink<P> for Vec<Tuple<P>> {
  type Error = ProtocolError;

  fn sink(&mut self, tuple: Tuple<P>) -> Result<(), Self::Error> {
    self.push(tuple);
    Ok(())
  }
}

impl<P, S, T> TupleSink<P> for BufferServerOutputStream<P, S, T>
where
  S: PartitioningSerializer<P>,
  T: Transport,
{
  type Error = StreamError;

  fn sink(&mut self, tuple: Tuple<P>) -> Result<(), Self::Error> {
    BufferServerOutputStream::sink(self, tuple)
  }
}

/// Emits well-formed window sequences into a [`TupleSink`].
pub struct WindowEmitter<P, K> {
  sink: K,
  protocol: WindowProtocol,
  next_window: Option<WindowId>,
  last_window: WindowId,
  _payload: PhantomData<fn(P)>,
}

impl<P, K> WindowEmitter<P, K>
where
  K: TupleSink<P>,
{
  /// Creates an emitter whose first window, absent a reset, is `first_window`.
  pub fn new(sink: K, first_window: WindowId) -> Self {
    Self {
      sink,
      protocol: WindowProtocol::new(),
      next_window: Some(first_window),
      last_window: first_window,
      _payload: PhantomData,
    }
  }

  /// Returns the sink.
  pub fn sink(&self) -> &K {
    &self.sink
  }

  /// Returns the sink mutably.
  pub fn sink_mut(&mut self) -> &mut K {
    &mut self.sink
  }

  /// Consumes the emitter and returns the sink.
  pub fn into_inner(self) -> K {
    self.sink
  }

  /// Window currently open, if any.
  pub fn current_window(&self) -> Option<WindowId> {
    self.protocol.current_window()
  }

  // State only moves once the sink has accepted the tuple.
  fn send(&mut self, tuple: Tuple<P>) -> Result<Transition, K::Error> {
    self.protocol.check(&tuple)?;
    let mut next = self.protocol.clone();
    let transition = next.advance(&tuple);
    self.sink.sink(tuple)?;
    self.protocol = next;
    Ok(transition)
  }

  /// Starts epoch `base_seconds` with windows of `interval_millis`. The next
  /// window is the epoch's first.
  pub fn reset_window(&mut self, base_seconds: u32, interval_millis: u32) -> Result<(), K::Error> {
    self.send(Tuple::reset_window(base_seconds, interval_millis))?;
    let first = WindowId::reset_marker(base_seconds);
    self.next_window = Some(first);
    self.last_window = first;
    trace!(base_seconds, interval_millis, "epoch reset");
    Ok(())
  }

  /// Opens the next window and returns its id.
  pub fn begin_window(&mut self) -> Result<WindowId, K::Error> {
    let id = self
      .next_window
      .ok_or(ProtocolError::SequenceExhausted(self.last_window.epoch_seconds()))?;
    self.send(Tuple::begin_window(id))?;
    self.last_window = id;
    self.next_window = id.next();
    Ok(id)
  }

  /// Emits one payload into the open window.
  pub fn emit(&mut self, payload: P) -> Result<(), K::Error> {
    self.send(Tuple::Data(payload)).map(|_| ())
  }

  /// Closes the open window and returns how many payloads it carried.
  pub fn end_window(&mut self) -> Result<u32, K::Error> {
    let id = self.protocol.current_window().ok_or(ProtocolError::NoOpenWindow)?;
    match self.send(Tuple::end_window(id))? {
      Transition::Closed { tuple_count, .. } => Ok(tuple_count),
      _ => Ok(0),
    }
  }

  /// Ends the stream.
  pub fn end_stream(&mut self) -> Result<(), K::Error> {
    self.send(Tuple::end_stream(self.last_window)).map(|_| ())
  }
}
