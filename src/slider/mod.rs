//! # Sliding Window Unifier
//!
//! A [`Slider`] turns a window-scoped [`Unifier`] into one that aggregates over
//! the trailing `number_of_buckets` windows. The delegate keeps no history: at
//! every `begin_window` the slider replays the raw tuples it retained from the
//! previous `number_of_buckets - 1` windows, so the delegate's fresh
//! per-window accumulator starts out holding their union.
//!
//! Per window:
//!
//! 1. `begin_window(id)`: delegate `begin_window(id)`, then every retained
//!    tuple through delegate `process`, oldest window first; a new empty bucket
//!    opens for the live tuples.
//! 2. `process(t)`: delegate `process(t)`, and `t` goes into the open bucket.
//! 3. `end_window()`: delegate `end_window()`; the bucket joins the retention
//!    queue, evicting the oldest bucket once `number_of_buckets - 1` are held.
//!
//! The delegate's single output port is rebound at setup to forward into the
//! slider's own [`output_port`](Slider::output_port), so downstream consumers
//! never see the delegate directly.
//!
//! # Example
//!
//! ```rust
//! use slideweave::operator::{Operator, OperatorContext, Unifier};
//! use slideweave::port::{CollectingSink, DefaultOutputPort};
//! use slideweave::slider::Slider;
//! use slideweave::window::WindowId;
//!
//! #[derive(Default)]
//! struct Sum {
//!     total: i64,
//!     output: DefaultOutputPort<i64>,
//! }
//!
//! impl Operator for Sum {
//!     fn begin_window(&mut self, _window_id: WindowId) {
//!         self.total = 0;
//!     }
//!     fn end_window(&mut self) {
//!         self.output.emit(self.total);
//!     }
//! }
//!
//! impl Unifier<i64> for Sum {
//!     fn process(&mut self, tuple: i64) {
//!         self.total += tuple;
//!     }
//!     fn output_ports(&self) -> Vec<&DefaultOutputPort<i64>> {
//!         vec![&self.output]
//!     }
//! }
//!
//! let mut slider = Slider::new(Sum::default(), 2).unwrap();
//! let sums = CollectingSink::new();
//! slider.output_port().set_sink(sums.clone());
//! slider.setup(&OperatorContext::new("sum")).unwrap();
//!
//! for (seq, value) in [1, 10, 100].into_iter().enumerate() {
//!     slider.begin_window(WindowId::new(0, seq as u32));
//!     slider.process(value);
//!     slider.end_window();
//! }
//! assert_eq!(sums.items(), vec![1, 11, 110]);
//! ```

mod retention;
#[cfg(test)]
mod slider_test;

pub use retention::{Bucket, RetentionQueue};

use crate::config::SliderConfig;
use crate::operator::{
  ActivationListener, BatchedOperatorStats, CheckpointListener, IdleTimeHandler, Operator,
  OperatorContext, OperatorError, StatsListener, StatsResponse, Unifier, sole_output_port,
  DEFAULT_SPIN_MILLIS,
};
use crate::port::DefaultOutputPort;
use crate::window::WindowId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors raised by a [`Slider`].
#[derive(Debug, Error)]
pub enum SliderError {
  /// `number_of_buckets` was zero.
  #[error("number_of_buckets must be at least 1")]
  InvalidBucketCount,
  /// The delegate's wiring or setup failed.
  #[error(transparent)]
  Operator(#[from] OperatorError),
  /// Retained state could not be serialized or restored.
  #[error("snapshot error: {0}")]
  Snapshot(#[from] serde_json::Error),
}

/// Optional capabilities the delegate advertised when the slider was built.
///
/// The delegate is asked once, at construction. Forwarding for a capability it
/// did not advertise is skipped without asking again.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Capabilities {
  /// Delegate handles idle time itself.
  pub idle_time: bool,
  /// Delegate listens for activation.
  pub activation: bool,
  /// Delegate consumes statistics.
  pub stats: bool,
  /// Delegate listens for checkpoints.
  pub checkpoint: bool,
}

impl Capabilities {
  fn probe<O: Operator + ?Sized>(operator: &mut O) -> Self {
    Self {
      idle_time: operator.as_idle_time_handler().is_some(),
      activation: operator.as_activation_listener().is_some(),
      stats: operator.as_stats_listener().is_some(),
      checkpoint: operator.as_checkpoint_listener().is_some(),
    }
  }
}

/// Retained windows in serializable form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliderSnapshot<T> {
  /// Trailing window width the state was taken with.
  pub number_of_buckets: u32,
  /// Retained buckets, oldest first.
  pub buckets: Vec<Bucket<T>>,
}

/// Sliding-window wrapper around a window-scoped unifier.
pub struct Slider<U, T> {
  unifier: U,
  number_of_buckets: u32,
  retention: RetentionQueue<T>,
  current: Option<Bucket<T>>,
  capabilities: Capabilities,
  spin: Duration,
  output_port: DefaultOutputPort<T>,
  _tuple: PhantomData<fn(T)>,
}

impl<U, T> Slider<U, T>
where
  U: Unifier<T>,
  T: Clone + Send + 'static,
{
  /// Wraps `unifier` so that it aggregates over `number_of_buckets` windows.
  ///
  /// Fails if `number_of_buckets` is zero or the unifier does not expose
  /// exactly one output port.
  pub fn new(mut unifier: U, number_of_buckets: u32) -> Result<Self, SliderError> {
    if number_of_buckets == 0 {
      return Err(SliderError::InvalidBucketCount);
    }
    sole_output_port::<T, U>(&unifier)?;
    let capabilities = Capabilities::probe(&mut unifier);
    Ok(Self {
      unifier,
      number_of_buckets,
      retention: RetentionQueue::new(number_of_buckets as usize - 1),
      current: None,
      capabilities,
      spin: Duration::from_millis(u64::from(DEFAULT_SPIN_MILLIS)),
      output_port: DefaultOutputPort::new(),
      _tuple: PhantomData,
    })
  }

  /// Wraps `unifier` using `config`.
  pub fn from_config(unifier: U, config: &SliderConfig) -> Result<Self, SliderError> {
    Self::new(unifier, config.number_of_buckets)
  }

  /// Returns the delegate.
  pub fn unifier(&self) -> &U {
    &self.unifier
  }

  /// Returns the delegate mutably.
  pub fn unifier_mut(&mut self) -> &mut U {
    &mut self.unifier
  }

  /// Width of the trailing window.
  pub fn number_of_buckets(&self) -> u32 {
    self.number_of_buckets
  }

  /// Capabilities detected on the delegate.
  pub fn capabilities(&self) -> Capabilities {
    self.capabilities
  }

  /// Retained windows, oldest first.
  pub fn retention(&self) -> &RetentionQueue<T> {
    &self.retention
  }

  /// Port downstream consumers connect to.
  pub fn output_port(&self) -> &DefaultOutputPort<T> {
    &self.output_port
  }

  /// Idle pause read from the operator context at setup.
  pub fn spin(&self) -> Duration {
    self.spin
  }

  /// Serializes the retained windows for a checkpoint.
  pub fn snapshot(&self) -> Result<Vec<u8>, SliderError>
  where
    T: Serialize,
  {
    let snapshot = SliderSnapshot {
      number_of_buckets: self.number_of_buckets,
      buckets: self.retention.to_vec(),
    };
    Ok(serde_json::to_vec(&snapshot)?)
  }

  /// Restores retained windows from [`snapshot`](Self::snapshot) output. When
  /// the snapshot holds more windows than this slider retains, only the newest
  /// are kept.
  pub fn restore(&mut self, data: &[u8]) -> Result<(), SliderError>
  where
    T: DeserializeOwned,
  {
    let snapshot: SliderSnapshot<T> = serde_json::from_slice(data)?;
    if snapshot.number_of_buckets != self.number_of_buckets {
      warn!(
        stored = snapshot.number_of_buckets,
        configured = self.number_of_buckets,
        "restoring sliding window state taken with a different width"
      );
    }
    self.retention.replace(snapshot.buckets);
    self.current = None;
    Ok(())
  }
}

impl<U, T> Operator for Slider<U, T>
where
  U: Unifier<T>,
  T: Clone + Send + 'static,
{
  fn setup(&mut self, context: &OperatorContext) -> Result<(), OperatorError> {
    sole_output_port::<T, U>(&self.unifier)?.set_sink(self.output_port.forwarder());
    self.unifier.setup(context)?;
    self.spin = Duration::from_millis(u64::from(context.spin_millis));
    debug!(
      operator_id = %context.id,
      number_of_buckets = self.number_of_buckets,
      capabilities = ?self.capabilities,
      "sliding unifier set up"
    );
    Ok(())
  }

  fn begin_window(&mut self, window_id: WindowId) {
    self.unifier.begin_window(window_id);
    let mut replayed = 0usize;
    for tuple in self.retention.replay() {
      self.unifier.process(tuple.clone());
      replayed += 1;
    }
    trace!(%window_id, buckets = self.retention.len(), replayed, "replayed retained windows");
    self.current = Some(Bucket::new());
  }

  fn end_window(&mut self) {
    self.unifier.end_window();
    let bucket = self.current.take().unwrap_or_else(|| {
      warn!("end_window without begin_window; retaining an empty bucket");
      Bucket::new()
    });
    if let Some(evicted) = self.retention.push(bucket) {
      trace!(evicted = evicted.len(), "evicted oldest window");
    }
  }

  fn teardown(&mut self) {
    self.unifier.teardown();
    self.retention.clear();
    self.current = None;
  }

  fn as_idle_time_handler(&mut self) -> Option<&mut dyn IdleTimeHandler> {
    Some(self)
  }

  fn as_activation_listener(&mut self) -> Option<&mut dyn ActivationListener> {
    Some(self)
  }

  fn as_stats_listener(&mut self) -> Option<&mut dyn StatsListener> {
    Some(self)
  }

  fn as_checkpoint_listener(&mut self) -> Option<&mut dyn CheckpointListener> {
    Some(self)
  }
}

impl<U, T> Unifier<T> for Slider<U, T>
where
  U: Unifier<T>,
  T: Clone + Send + 'static,
{
  fn process(&mut self, tuple: T) {
    match self.current.as_mut() {
      Some(bucket) => {
        self.unifier.process(tuple.clone());
        bucket.push(tuple);
      }
      None => {
        warn!("tuple processed outside of a window is not retained");
        self.unifier.process(tuple);
      }
    }
  }

  fn output_ports(&self) -> Vec<&DefaultOutputPort<T>> {
    vec![&self.output_port]
  }
}

impl<U, T> IdleTimeHandler for Slider<U, T>
where
  U: Unifier<T>,
  T: Clone + Send + 'static,
{
  fn handle_idle_time(&mut self) {
    if self.capabilities.idle_time {
      if let Some(handler) = self.unifier.as_idle_time_handler() {
        handler.handle_idle_time();
        return;
      }
    }
    std::thread::sleep(self.spin);
  }
}

impl<U, T> ActivationListener for Slider<U, T>
where
  U: Unifier<T>,
  T: Clone + Send + 'static,
{
  fn activate(&mut self, context: &OperatorContext) {
    if !self.capabilities.activation {
      return;
    }
    if let Some(listener) = self.unifier.as_activation_listener() {
      listener.activate(context);
    }
  }

  fn deactivate(&mut self) {
    if !self.capabilities.activation {
      return;
    }
    if let Some(listener) = self.unifier.as_activation_listener() {
      listener.deactivate();
    }
  }
}

impl<U, T> StatsListener for Slider<U, T>
where
  U: Unifier<T>,
  T: Clone + Send + 'static,
{
  fn process_stats(&mut self, stats: &BatchedOperatorStats) -> Option<StatsResponse> {
    if !self.capabilities.stats {
      return None;
    }
    self
      .unifier
      .as_stats_listener()
      .and_then(|listener| listener.process_stats(stats))
  }
}

impl<U, T> CheckpointListener for Slider<U, T>
where
  U: Unifier<T>,
  T: Clone + Send + 'static,
{
  fn checkpointed(&mut self, window_id: WindowId) {
    if !self.capabilities.checkpoint {
      return;
    }
    if let Some(listener) = self.unifier.as_checkpoint_listener() {
      listener.checkpointed(window_id);
    }
  }

  fn committed(&mut self, window_id: WindowId) {
    if !self.capabilities.checkpoint {
      return;
    }
    if let Some(listener) = self.unifier.as_checkpoint_listener() {
      listener.committed(window_id);
    }
  }
}
