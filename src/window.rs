//! Window identifiers and the window clock.
//!
//! Every tuple on a windowed stream belongs to a window. A window is named by a
//! 64-bit [`WindowId`] split in two halves:
//!
//! - **Epoch** (upper 32 bits): seconds since the reference instant, set by the
//!   most recent `RESET_WINDOW`.
//! - **Sequence** (lower 32 bits): number of fixed-width ticks elapsed within
//!   that epoch.
//!
//! A `RESET_WINDOW` carries the new epoch (`base_seconds`) and the new tick
//! width (`interval_millis`). [`WindowClock`] remembers the last reset so that
//! window ids can be mapped back to wall-clock time.
//!
//! # Example
//!
//! ```rust
//! use slideweave::window::{WindowClock, WindowId};
//!
//! let clock = WindowClock::new(1_700_000_000, 500);
//! let id = WindowId::new(1_700_000_000, 4);
//! assert_eq!(clock.start_millis(id), Some(1_700_000_000_000 + 2_000));
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one window: epoch seconds in the upper half, tick sequence in
/// the lower half.
#[derive(
  Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WindowId(pub u64);

impl WindowId {
  /// Builds a window id from an epoch and a sequence number.
  #[inline]
  pub const fn new(epoch_seconds: u32, sequence: u32) -> Self {
    Self(((epoch_seconds as u64) << 32) | sequence as u64)
  }

  /// Window id slot used by a `RESET_WINDOW`: the new epoch with sequence 0.
  #[inline]
  pub const fn reset_marker(base_seconds: u32) -> Self {
    Self::new(base_seconds, 0)
  }

  /// Returns the raw 64-bit value.
  #[inline]
  pub const fn as_u64(self) -> u64 {
    self.0
  }

  /// Returns the epoch (upper 32 bits).
  #[inline]
  pub const fn epoch_seconds(self) -> u32 {
    (self.0 >> 32) as u32
  }

  /// Returns the tick sequence within the epoch (lower 32 bits).
  #[inline]
  pub const fn sequence(self) -> u32 {
    self.0 as u32
  }

  /// Returns the id of the following window in the same epoch, or `None` when
  /// the sequence is exhausted and a reset is required.
  pub fn next(self) -> Option<Self> {
    self
      .sequence()
      .checked_add(1)
      .map(|seq| Self::new(self.epoch_seconds(), seq))
  }
}

impl From<u64> for WindowId {
  fn from(raw: u64) -> Self {
    Self(raw)
  }
}

impl fmt::Display for WindowId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:#x}:{}", self.epoch_seconds(), self.sequence())
  }
}

/// Interpretation of the most recent `RESET_WINDOW`.
///
/// Window ids are only meaningful relative to the reset that opened their
/// epoch; the clock rejects ids from any other epoch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WindowClock {
  base_seconds: u32,
  interval_millis: u32,
}

impl WindowClock {
  /// Creates a clock for the epoch `base_seconds` with ticks of
  /// `interval_millis`.
  pub fn new(base_seconds: u32, interval_millis: u32) -> Self {
    Self {
      base_seconds,
      interval_millis,
    }
  }

  /// Epoch established by the reset.
  pub fn base_seconds(&self) -> u32 {
    self.base_seconds
  }

  /// Width of one window in milliseconds.
  pub fn interval_millis(&self) -> u32 {
    self.interval_millis
  }

  /// Applies a new reset, replacing both epoch and tick width.
  pub fn reset(&mut self, base_seconds: u32, interval_millis: u32) {
    self.base_seconds = base_seconds;
    self.interval_millis = interval_millis;
  }

  /// First window id of the current epoch.
  pub fn first_window(&self) -> WindowId {
    WindowId::reset_marker(self.base_seconds)
  }

  /// Returns true if `id` belongs to the current epoch.
  pub fn covers(&self, id: WindowId) -> bool {
    id.epoch_seconds() == self.base_seconds
  }

  /// Start of window `id` in milliseconds since the reference instant, or
  /// `None` if `id` is outside the epoch or the start does not fit a `u64`.
  pub fn start_millis(&self, id: WindowId) -> Option<u64> {
    if !self.covers(id) {
      return None;
    }
    let offset = u64::from(id.sequence()).checked_mul(u64::from(self.interval_millis))?;
    (u64::from(self.base_seconds) * 1_000).checked_add(offset)
  }

  /// Start of window `id` as a UTC timestamp, taking the Unix epoch as the
  /// reference instant.
  pub fn start_time(&self, id: WindowId) -> Option<DateTime<Utc>> {
    let millis = i64::try_from(self.start_millis(id)?).ok()?;
    Utc.timestamp_millis_opt(millis).single()
  }

  /// Window of the current epoch that contains `millis`, or `None` if the
  /// instant precedes the epoch or the tick width is zero.
  pub fn window_at(&self, millis: u64) -> Option<WindowId> {
    let base = u64::from(self.base_seconds) * 1_000;
    if self.interval_millis == 0 || millis < base {
      return None;
    }
    let sequence = (millis - base) / u64::from(self.interval_millis);
    u32::try_from(sequence)
      .ok()
      .map(|seq| WindowId::new(self.base_seconds, seq))
  }
}
