//! Operator lifecycle and optional capabilities.
//!
//! Every windowed operator implements [`Operator`]: `setup` once, then
//! `begin_window` / `end_window` per window, then `teardown`. A [`Unifier`]
//! additionally accepts tuples and exposes its output ports.
//!
//! Beyond the lifecycle, an operator may opt into four capabilities, each a
//! separate trait:
//!
//! - [`IdleTimeHandler`]: called when the scheduler has no work for it.
//! - [`ActivationListener`]: told when processing starts and stops.
//! - [`StatsListener`]: receives batched statistics and may answer.
//! - [`CheckpointListener`]: told when a window was checkpointed or committed.
//!
//! An operator advertises a capability by overriding the matching `as_*`
//! accessor on [`Operator`]. Absence is never an error.

use crate::port::DefaultOutputPort;
use crate::window::WindowId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default pause, in milliseconds, when an operator has no idle handler.
pub const DEFAULT_SPIN_MILLIS: u32 = 10;

/// Errors raised by operators.
#[derive(Debug, Error)]
pub enum OperatorError {
  /// The operator exposes no output port.
  #[error("unifier exposes no output port")]
  MissingOutputPort,
  /// The operator exposes more than one output port.
  #[error("unifier exposes {0} output ports, expected exactly one")]
  AmbiguousOutputPort(usize),
  /// Setup failed.
  #[error("setup failed: {0}")]
  Setup(String),
}

/// Execution context handed to operators at setup and activation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorContext {
  /// Operator identity.
  pub id: String,
  /// Pause, in milliseconds, used when an operator is idle.
  pub spin_millis: u32,
}

impl Default for OperatorContext {
  fn default() -> Self {
    Self {
      id: String::new(),
      spin_millis: DEFAULT_SPIN_MILLIS,
    }
  }
}

impl OperatorContext {
  /// Creates a context for operator `id`.
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      ..Self::default()
    }
  }

  /// Sets the idle pause.
  #[must_use]
  pub fn with_spin_millis(mut self, spin_millis: u32) -> Self {
    self.spin_millis = spin_millis;
    self
  }
}

/// Statistics collected for an operator over a batch of windows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchedOperatorStats {
  /// Operator identity.
  pub operator_id: String,
  /// Latest window covered by the batch.
  pub current_window_id: WindowId,
  /// Tuples processed in the batch.
  pub tuples_processed: u64,
  /// Tuples emitted in the batch.
  pub tuples_emitted: u64,
  /// Average end-to-end latency in milliseconds.
  pub latency_millis: u64,
}

/// Answer of a [`StatsListener`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
  /// Ask the engine to repartition the operator.
  pub repartition_required: bool,
  /// Load relative to the desired range: negative under, positive over.
  pub load_indicator: i32,
  /// Free-form hint for the engine's logs.
  pub hint: Option<String>,
}

/// Handles scheduler idle time.
pub trait IdleTimeHandler {
  /// Called when there is no input to process.
  fn handle_idle_time(&mut self);
}

/// Notified when processing starts and stops.
pub trait ActivationListener {
  /// Processing is about to start.
  fn activate(&mut self, context: &OperatorContext);
  /// Processing has stopped.
  fn deactivate(&mut self);
}

/// Receives operator statistics.
pub trait StatsListener {
  /// Inspects `stats`; may ask the engine for a change.
  fn process_stats(&mut self, stats: &BatchedOperatorStats) -> Option<StatsResponse>;
}

/// Notified about checkpoints.
pub trait CheckpointListener {
  /// State up to `window_id` has been checkpointed.
  fn checkpointed(&mut self, window_id: WindowId);
  /// Checkpoint at `window_id` is committed everywhere.
  fn committed(&mut self, window_id: WindowId);
}

/// Windowed operator lifecycle.
pub trait Operator: Send {
  /// Called once before the first window.
  fn setup(&mut self, _context: &OperatorContext) -> Result<(), OperatorError> {
    Ok(())
  }

  /// Opens window `window_id`.
  fn begin_window(&mut self, window_id: WindowId);

  /// Closes the open window.
  fn end_window(&mut self);

  /// Called once after the last window.
  fn teardown(&mut self) {}

  /// Idle capability, if implemented.
  fn as_idle_time_handler(&mut self) -> Option<&mut dyn IdleTimeHandler> {
    None
  }

  /// Activation capability, if implemented.
  fn as_activation_listener(&mut self) -> Option<&mut dyn ActivationListener> {
    None
  }

  /// Stats capability, if implemented.
  fn as_stats_listener(&mut self) -> Option<&mut dyn StatsListener> {
    None
  }

  /// Checkpoint capability, if implemented.
  fn as_checkpoint_listener(&mut self) -> Option<&mut dyn CheckpointListener> {
    None
  }
}

/// Window-scoped operator that merges tuples into one output.
pub trait Unifier<T>: Operator {
  /// Accepts one tuple of the open window.
  fn process(&mut self, tuple: T);

  /// Output ports of the unifier. A unifier used behind a
  /// [`Slider`](crate::slider::Slider) must expose exactly one.
  fn output_ports(&self) -> Vec<&DefaultOutputPort<T>>;
}

/// Returns the single output port of `unifier`.
pub fn sole_output_port<T, U>(unifier: &U) -> Result<&DefaultOutputPort<T>, OperatorError>
where
  U: Unifier<T> + ?Sized,
{
  let mut ports = unifier.output_ports();
  match ports.len() {
    0 => Err(OperatorError::MissingOutputPort),
    1 => Ok(ports.remove(0)),
    n => Err(OperatorError::AmbiguousOutputPort(n)),
  }
}
