//! Fixed-capacity retention of completed windows.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tuples observed during exactly one window.
pub type Bucket<T> = Vec<T>;

/// Ring of the most recent completed-window buckets, oldest first.
///
/// The queue never holds more than `capacity` buckets; pushing into a full
/// queue evicts the oldest bucket. A capacity of zero retains nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionQueue<T> {
  buckets: VecDeque<Bucket<T>>,
  capacity: usize,
}

impl<T> RetentionQueue<T> {
  /// Creates an empty queue holding at most `capacity` buckets.
  pub fn new(capacity: usize) -> Self {
    Self {
      buckets: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Maximum number of retained buckets.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of retained buckets.
  pub fn len(&self) -> usize {
    self.buckets.len()
  }

  /// Returns true if nothing is retained.
  pub fn is_empty(&self) -> bool {
    self.buckets.is_empty()
  }

  /// Appends the newest bucket, returning the bucket evicted to make room (or
  /// `bucket` itself when the capacity is zero).
  pub fn push(&mut self, bucket: Bucket<T>) -> Option<Bucket<T>> {
    if self.capacity == 0 {
      return Some(bucket);
    }
    let evicted = if self.buckets.len() == self.capacity {
      self.buckets.pop_front()
    } else {
      None
    };
    self.buckets.push_back(bucket);
    evicted
  }

  /// Retained buckets, oldest first.
  pub fn buckets(&self) -> impl Iterator<Item = &[T]> + '_ {
    self.buckets.iter().map(Vec::as_slice)
  }

  /// Every retained tuple in replay order: oldest bucket first, arrival order
  /// within a bucket.
  pub fn replay(&self) -> impl Iterator<Item = &T> + '_ {
    self.buckets.iter().flatten()
  }

  /// Drops every retained bucket.
  pub fn clear(&mut self) {
    self.buckets.clear();
  }

  /// Replaces the contents with `buckets` (oldest first), keeping only the
  /// newest `capacity` of them.
  pub fn replace(&mut self, buckets: Vec<Bucket<T>>) {
    let skip = buckets.len().saturating_sub(self.capacity);
    self.buckets = buckets.into_iter().skip(skip).collect();
  }

  /// Copies the retained buckets out, oldest first.
  pub fn to_vec(&self) -> Vec<Bucket<T>>
  where
    T: Clone,
  {
    self.buckets.iter().cloned().collect()
  }
}
