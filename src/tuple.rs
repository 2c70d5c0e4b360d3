//! Tuple and window-control vocabulary.
//!
//! A windowed stream carries two kinds of units:
//!
//! - **Control tuples** ([`ControlTuple`]) mark window boundaries, epoch resets
//!   and the end of the stream. They carry engine metadata only.
//! - **Data tuples** carry an application payload `P`.
//!
//! Within one stream, a `BEGIN_WINDOW` opens every window, an `END_WINDOW`
//! closes it, and `END_STREAM` is terminal. See [`crate::protocol`] for the
//! tracker that enforces this.

use crate::window::WindowId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a tuple as seen by the framing layer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum TupleKind {
  /// Opens a window.
  BeginWindow,
  /// Closes the open window.
  EndWindow,
  /// Terminates the stream.
  EndStream,
  /// Starts a new epoch and tick width.
  ResetWindow,
  /// Unpartitioned payload.
  SimpleData,
  /// Payload routed by a partition key.
  PartitionedData,
  /// In-process checkpoint marker. Never framed for the buffer server.
  Checkpoint,
}

impl TupleKind {
  /// Returns true for kinds that carry a payload.
  pub fn is_data(self) -> bool {
    matches!(self, TupleKind::SimpleData | TupleKind::PartitionedData)
  }
}

impl fmt::Display for TupleKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TupleKind::BeginWindow => "BEGIN_WINDOW",
      TupleKind::EndWindow => "END_WINDOW",
      TupleKind::EndStream => "END_STREAM",
      TupleKind::ResetWindow => "RESET_WINDOW",
      TupleKind::SimpleData => "SIMPLE_DATA",
      TupleKind::PartitionedData => "PARTITIONED_DATA",
      TupleKind::Checkpoint => "CHECKPOINT",
    };
    f.write_str(name)
  }
}

/// Engine-generated control tuple.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ControlTuple {
  /// Start of window.
  BeginWindow(WindowId),
  /// End of window.
  EndWindow(WindowId),
  /// End of stream, tagged with the last window id.
  EndStream(WindowId),
  /// New epoch (`base_seconds`) and tick width (`interval_millis`).
  ResetWindow {
    /// Epoch seconds for every following window id.
    base_seconds: u32,
    /// Width of one window in milliseconds.
    interval_millis: u32,
  },
  /// Checkpoint marker for the given window.
  Checkpoint(WindowId),
}

impl ControlTuple {
  /// Returns the kind of this control tuple.
  pub fn kind(&self) -> TupleKind {
    match self {
      ControlTuple::BeginWindow(_) => TupleKind::BeginWindow,
      ControlTuple::EndWindow(_) => TupleKind::EndWindow,
      ControlTuple::EndStream(_) => TupleKind::EndStream,
      ControlTuple::ResetWindow { .. } => TupleKind::ResetWindow,
      ControlTuple::Checkpoint(_) => TupleKind::Checkpoint,
    }
  }

  /// Returns the window id slot of this control tuple. For a reset this is the
  /// new epoch with sequence zero.
  pub fn window_id(&self) -> WindowId {
    match *self {
      ControlTuple::BeginWindow(id)
      | ControlTuple::EndWindow(id)
      | ControlTuple::EndStream(id)
      | ControlTuple::Checkpoint(id) => id,
      ControlTuple::ResetWindow { base_seconds, .. } => WindowId::reset_marker(base_seconds),
    }
  }
}

/// Unit of flow on a windowed stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Tuple<P> {
  /// Control tuple.
  Control(ControlTuple),
  /// Data tuple with its payload.
  Data(P),
}

impl<P> Tuple<P> {
  /// Shorthand for a `BEGIN_WINDOW` tuple.
  pub fn begin_window(id: WindowId) -> Self {
    Tuple::Control(ControlTuple::BeginWindow(id))
  }

  /// Shorthand for an `END_WINDOW` tuple.
  pub fn end_window(id: WindowId) -> Self {
    Tuple::Control(ControlTuple::EndWindow(id))
  }

  /// Shorthand for an `END_STREAM` tuple.
  pub fn end_stream(id: WindowId) -> Self {
    Tuple::Control(ControlTuple::EndStream(id))
  }

  /// Shorthand for a `RESET_WINDOW` tuple.
  pub fn reset_window(base_seconds: u32, interval_millis: u32) -> Self {
    Tuple::Control(ControlTuple::ResetWindow {
      base_seconds,
      interval_millis,
    })
  }

  /// Kind of the tuple. Data tuples report [`TupleKind::SimpleData`] until a
  /// partitioning serializer routes them.
  pub fn kind(&self) -> TupleKind {
    match self {
      Tuple::Control(control) => control.kind(),
      Tuple::Data(_) => TupleKind::SimpleData,
    }
  }

  /// Window id carried by a control tuple; `None` for data.
  pub fn window_id(&self) -> Option<WindowId> {
    match self {
      Tuple::Control(control) => Some(control.window_id()),
      Tuple::Data(_) => None,
    }
  }

  /// Payload of a data tuple.
  pub fn payload(&self) -> Option<&P> {
    match self {
      Tuple::Data(payload) => Some(payload),
      Tuple::Control(_) => None,
    }
  }

  /// Returns true for data tuples.
  pub fn is_data(&self) -> bool {
    matches!(self, Tuple::Data(_))
  }
}

impl<P> From<ControlTuple> for Tuple<P> {
  fn from(control: ControlTuple) -> Self {
    Tuple::Control(control)
  }
}
