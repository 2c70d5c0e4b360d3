//! Window-control protocol tracking.
//!
//! [`WindowProtocol`] follows a single stream tuple by tuple and rejects any
//! tuple that would break the windowing contract:
//!
//! - window ids strictly increase, except across a `RESET_WINDOW`, after which
//!   the next window must belong to the new epoch;
//! - every window is opened by exactly one `BEGIN_WINDOW` and closed by the
//!   matching `END_WINDOW` before the next one opens;
//! - data only flows inside an open window;
//! - nothing follows `END_STREAM`.
//!
//! Checking and advancing are separate steps so that a caller can validate a
//! tuple, perform a fallible side effect, and only then commit the transition.
//! [`WindowProtocol::observe`] does both at once.

use crate::tuple::{ControlTuple, Tuple, TupleKind};
use crate::window::{WindowClock, WindowId};
use thiserror::Error;

/// Violation of the window-control protocol.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ProtocolError {
  /// A tuple arrived after `END_STREAM`.
  #[error("{0} after END_STREAM")]
  TupleAfterEndStream(TupleKind),
  /// `BEGIN_WINDOW` while another window is still open.
  #[error("BEGIN_WINDOW {next} while window {open} is open")]
  NestedBeginWindow {
    /// Window currently open.
    open: WindowId,
    /// Window that tried to open.
    next: WindowId,
  },
  /// Window id did not increase.
  #[error("window {next} does not follow {last}")]
  OutOfOrderWindow {
    /// Last window opened on the stream.
    last: WindowId,
    /// Offending window id.
    next: WindowId,
  },
  /// Window id outside the epoch set by the last reset.
  #[error("window {window_id} is outside epoch {epoch:#x}")]
  EpochMismatch {
    /// Epoch established by the last reset.
    epoch: u32,
    /// Offending window id.
    window_id: WindowId,
  },
  /// `END_WINDOW` without a matching open window.
  #[error("END_WINDOW {window_id} does not match open window {open:?}")]
  UnmatchedEndWindow {
    /// Window currently open, if any.
    open: Option<WindowId>,
    /// Window id carried by the `END_WINDOW`.
    window_id: WindowId,
  },
  /// Data tuple outside any window.
  #[error("data tuple outside of a window")]
  DataOutsideWindow,
  /// No window is open.
  #[error("no window is open")]
  NoOpenWindow,
  /// The 32-bit sequence of the current epoch is used up.
  #[error("window sequence of epoch {0:#x} is exhausted; a reset is required")]
  SequenceExhausted(u32),
  /// Control tuple that must sit between windows arrived inside one.
  #[error("{kind} inside open window {open}")]
  InsideOpenWindow {
    /// Kind of the offending control tuple.
    kind: TupleKind,
    /// Window currently open.
    open: WindowId,
  },
}

/// Transition produced by a successfully observed tuple.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
  /// A window opened.
  Opened(WindowId),
  /// A window closed after `tuple_count` data tuples.
  Closed {
    /// Window that closed.
    window_id: WindowId,
    /// Data tuples observed inside the window.
    tuple_count: u32,
  },
  /// A new epoch started.
  Reset(WindowClock),
  /// A data tuple was counted in the open window.
  Data,
  /// A checkpoint marker passed between windows.
  Checkpoint(WindowId),
  /// The stream ended.
  Ended,
}

/// Stream-invariant tracker for one windowed stream.
#[derive(Clone, Debug, Default)]
pub struct WindowProtocol {
  open: Option<WindowId>,
  last: Option<WindowId>,
  clock: Option<WindowClock>,
  tuple_count: u32,
  ended: bool,
}

impl WindowProtocol {
  /// Creates a tracker for a fresh stream.
  pub fn new() -> Self {
    Self::default()
  }

  /// Window currently open, if any.
  pub fn current_window(&self) -> Option<WindowId> {
    self.open
  }

  /// Most recent window opened since the last reset.
  pub fn last_window(&self) -> Option<WindowId> {
    self.last
  }

  /// Data tuples counted so far in the open window.
  pub fn tuple_count(&self) -> u32 {
    self.tuple_count
  }

  /// Clock established by the most recent reset.
  pub fn clock(&self) -> Option<WindowClock> {
    self.clock
  }

  /// Returns true once `END_STREAM` has been observed.
  pub fn is_ended(&self) -> bool {
    self.ended
  }

  /// Validates `tuple` against the current state without changing it.
  pub fn check<P>(&self, tuple: &Tuple<P>) -> Result<(), ProtocolError> {
    if self.ended {
      return Err(ProtocolError::TupleAfterEndStream(tuple.kind()));
    }
    let control = match tuple {
      Tuple::Data(_) => {
        return match self.open {
          Some(_) => Ok(()),
          None => Err(ProtocolError::DataOutsideWindow),
        };
      }
      Tuple::Control(control) => control,
    };
    match *control {
      ControlTuple::BeginWindow(next) => {
        if let Some(open) = self.open {
          return Err(ProtocolError::NestedBeginWindow { open, next });
        }
        if let Some(clock) = self.clock {
          if !clock.covers(next) {
            return Err(ProtocolError::EpochMismatch {
              epoch: clock.base_seconds(),
              window_id: next,
            });
          }
        }
        match self.last {
          Some(last) if next <= last => Err(ProtocolError::OutOfOrderWindow { last, next }),
          _ => Ok(()),
        }
      }
      ControlTuple::EndWindow(window_id) => match self.open {
        Some(open) if open == window_id => Ok(()),
        open => Err(ProtocolError::UnmatchedEndWindow { open, window_id }),
      },
      ControlTuple::ResetWindow { .. }
      | ControlTuple::EndStream(_)
      | ControlTuple::Checkpoint(_) => match self.open {
        Some(open) => Err(ProtocolError::InsideOpenWindow {
          kind: control.kind(),
          open,
        }),
        None => Ok(()),
      },
    }
  }

  /// Commits the transition for `tuple`. The tuple must have passed
  /// [`check`](Self::check).
  pub fn advance<P>(&mut self, tuple: &Tuple<P>) -> Transition {
    match tuple {
      Tuple::Data(_) => {
        self.tuple_count = self.tuple_count.saturating_add(1);
        Transition::Data
      }
      Tuple::Control(ControlTuple::BeginWindow(id)) => {
        self.open = Some(*id);
        self.last = Some(*id);
        self.tuple_count = 0;
        Transition::Opened(*id)
      }
      Tuple::Control(ControlTuple::EndWindow(id)) => {
        self.open = None;
        let tuple_count = std::mem::take(&mut self.tuple_count);
        Transition::Closed {
          window_id: *id,
          tuple_count,
        }
      }
      Tuple::Control(ControlTuple::ResetWindow {
        base_seconds,
        interval_millis,
      }) => {
        let clock = WindowClock::new(*base_seconds, *interval_millis);
        self.clock = Some(clock);
        self.last = None;
        Transition::Reset(clock)
      }
      Tuple::Control(ControlTuple::Checkpoint(id)) => Transition::Checkpoint(*id),
      Tuple::Control(ControlTuple::EndStream(_)) => {
        self.ended = true;
        Transition::Ended
      }
    }
  }

  /// Checks and commits `tuple` in one step.
  pub fn observe<P>(&mut self, tuple: &Tuple<P>) -> Result<Transition, ProtocolError> {
    self.check(tuple)?;
    Ok(self.advance(tuple))
  }
}
