//! Output ports and sinks.
//!
//! An operator emits through a [`DefaultOutputPort`]. Whatever is connected to
//! the port implements [`Sink`]. Ports are cheap handles over a shared sink
//! slot, so a port can be rebound after the operator that owns it was built;
//! this is how a wrapping operator redirects its delegate's output into its own
//! port.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Receiver of items emitted on a port.
pub trait Sink<T>: Send {
  /// Accepts one item.
  fn put(&mut self, item: T);
}

struct Slot<T> {
  sink: Option<Box<dyn Sink<T>>>,
  // Bumped on every set_sink/clear_sink.
  generation: u64,
  // Generation of the sink currently lent out to an emit call.
  lent: Option<u64>,
  // Items emitted while the sink was lent out.
  pending: VecDeque<T>,
}

/// Single output port of an operator.
///
/// Clones share the same connection and emission counter. The sink runs
/// without the port's lock held, so a sink may emit on, rebind, or clear the
/// port it is connected to. Such re-entrant emissions are queued and delivered
/// after the item being delivered, in emission order.
pub struct DefaultOutputPort<T> {
  slot: Arc<Mutex<Slot<T>>>,
  emitted: Arc<AtomicU64>,
}

impl<T: Send + 'static> DefaultOutputPort<T> {
  /// Creates an unconnected port.
  pub fn new() -> Self {
    Self {
      slot: Arc::new(Mutex::new(Slot {
        sink: None,
        generation: 0,
        lent: None,
        pending: VecDeque::new(),
      })),
      emitted: Arc::new(AtomicU64::new(0)),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Slot<T>> {
    lock_slot(&self.slot)
  }

  /// Connects the port to `sink`, replacing any previous connection.
  pub fn set_sink<S: Sink<T> + 'static>(&self, sink: S) {
    let mut slot = self.lock();
    slot.sink = Some(Box::new(sink));
    slot.generation += 1;
  }

  /// Disconnects the port. Items still queued behind a delivery in progress
  /// are dropped.
  pub fn clear_sink(&self) {
    let mut slot = self.lock();
    slot.sink = None;
    slot.generation += 1;
  }

  /// Returns true if a sink is connected.
  pub fn is_connected(&self) -> bool {
    let slot = self.lock();
    slot.sink.is_some() || slot.lent == Some(slot.generation)
  }

  /// Emits `item` to the connected sink. Items emitted on an unconnected port
  /// are dropped.
  pub fn emit(&self, item: T) {
    self.emitted.fetch_add(1, Ordering::Relaxed);
    let mut slot = self.lock();
    if slot.lent.is_some() {
      slot.pending.push_back(item);
      return;
    }
    let Some(mut sink) = slot.sink.take() else {
      trace!("dropping tuple emitted on unconnected port");
      return;
    };
    let mut generation = slot.generation;
    slot.lent = Some(generation);
    let _release = LendGuard { slot: &self.slot };
    let mut item = item;
    loop {
      drop(slot);
      sink.put(item);
      slot = self.lock();
      if slot.generation != generation {
        match slot.sink.take() {
          Some(rebound) => {
            sink = rebound;
            generation = slot.generation;
            slot.lent = Some(generation);
          }
          None => {
            trace!(dropped = slot.pending.len(), "port cleared during delivery");
            slot.pending.clear();
            slot.lent = None;
            return;
          }
        }
      }
      match slot.pending.pop_front() {
        Some(next) => item = next,
        None => break,
      }
    }
    slot.sink = Some(sink);
    slot.lent = None;
  }

  /// Number of items emitted since creation.
  pub fn emitted_count(&self) -> u64 {
    self.emitted.load(Ordering::Relaxed)
  }

  /// Sink that re-emits everything it receives on this port.
  pub fn forwarder(&self) -> PortForwarder<T> {
    PortForwarder {
      target: self.clone(),
    }
  }
}

impl<T: Send + 'static> Default for DefaultOutputPort<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for DefaultOutputPort<T> {
  fn clone(&self) -> Self {
    Self {
      slot: Arc::clone(&self.slot),
      emitted: Arc::clone(&self.emitted),
    }
  }
}

impl<T> fmt::Debug for DefaultOutputPort<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DefaultOutputPort")
      .field("emitted", &self.emitted.load(Ordering::Relaxed))
      .finish()
  }
}

fn lock_slot<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
  slot.lock().unwrap_or_else(PoisonError::into_inner)
}

// Returns a lent slot to the idle state if the sink panics mid-delivery.
struct LendGuard<'a, T> {
  slot: &'a Mutex<Slot<T>>,
}

impl<T> Drop for LendGuard<'_, T> {
  fn drop(&mut self) {
    if std::thread::panicking() {
      let mut slot = lock_slot(self.slot);
      slot.lent = None;
      slot.pending.clear();
    }
  }
}

/// Sink that forwards into another port.
pub struct PortForwarder<T> {
  target: DefaultOutputPort<T>,
}

impl<T: Send + 'static> Sink<T> for PortForwarder<T> {
  fn put(&mut self, item: T) {
    self.target.emit(item);
  }
}

/// Sink that records everything it receives. Clones share the same buffer.
pub struct CollectingSink<T> {
  items: Arc<Mutex<Vec<T>>>,
}

impl<T> CollectingSink<T> {
  /// Creates an empty collector.
  pub fn new() -> Self {
    Self {
      items: Arc::new(Mutex::new(Vec::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Vec<T>> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Removes and returns everything collected so far.
  pub fn drain(&self) -> Vec<T> {
    std::mem::take(&mut *self.lock())
  }

  /// Number of collected items.
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  /// Returns true if nothing has been collected.
  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}

impl<T: Clone> CollectingSink<T> {
  /// Copy of everything collected so far.
  pub fn items(&self) -> Vec<T> {
    self.lock().clone()
  }
}

impl<T> Default for CollectingSink<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for CollectingSink<T> {
  fn clone(&self) -> Self {
    Self {
      items: Arc::clone(&self.items),
    }
  }
}

impl<T: Send> Sink<T> for CollectingSink<T> {
  fn put(&mut self, item: T) {
    self.lock().push(item);
  }
}
