//! # Partitioning Serializer Contract
//!
//! Data tuples leave a node through a [`PartitioningSerializer`]. For every
//! payload the serializer answers two questions:
//!
//! - **Partition key**: optional bytes the buffer server uses to route the
//!   payload to one consumer shard. `None` means the payload is not
//!   partitioned and travels as simple data.
//! - **Encoding**: the payload bytes placed in the frame.
//!
//! Control tuples never reach the serializer.
//!
//! ## Usage
//!
//! ```rust
//! use slideweave::partitioning::{partition_by_key, PartitionKey, PartitioningSerializer};
//!
//! #[derive(serde::Serialize)]
//! struct Click {
//!     user_id: u64,
//! }
//!
//! let serde = partition_by_key(|click: &Click| Some(PartitionKey::from(click.user_id.to_be_bytes().to_vec())));
//! let click = Click { user_id: 7 };
//! assert!(serde.partition(&click).is_some());
//! ```

use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Partition key that determines which consumer shard receives a payload.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PartitionKey(pub Bytes);

impl PartitionKey {
  /// Creates a new partition key from raw bytes.
  pub fn new(bytes: impl Into<Bytes>) -> Self {
    Self(bytes.into())
  }

  /// Returns the key bytes.
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  /// Consumes the key and returns its bytes.
  pub fn into_bytes(self) -> Bytes {
    self.0
  }
}

impl From<Bytes> for PartitionKey {
  fn from(bytes: Bytes) -> Self {
    Self(bytes)
  }
}

impl From<Vec<u8>> for PartitionKey {
  fn from(bytes: Vec<u8>) -> Self {
    Self(Bytes::from(bytes))
  }
}

impl From<String> for PartitionKey {
  fn from(s: String) -> Self {
    Self(Bytes::from(s))
  }
}

impl From<&str> for PartitionKey {
  fn from(s: &str) -> Self {
    Self(Bytes::copy_from_slice(s.as_bytes()))
  }
}

/// Error raised when a payload cannot be encoded.
#[derive(Debug, Error)]
pub enum SerializationError {
  /// JSON encoding failed.
  #[error("json encoding failed: {0}")]
  Json(#[from] serde_json::Error),
  /// Serializer-specific failure.
  #[error("serialization failed: {0}")]
  Other(String),
}

/// Contract the output stream requires from the payload serializer.
pub trait PartitioningSerializer<P>: Send {
  /// Returns the partition key for `payload`, or `None` to send it as simple
  /// data.
  fn partition(&self, payload: &P) -> Option<PartitionKey>;

  /// Encodes `payload` into frame bytes.
  fn to_bytes(&self, payload: &P) -> Result<Bytes, SerializationError>;
}

impl<P, S> PartitioningSerializer<P> for Box<S>
where
  S: PartitioningSerializer<P> + ?Sized,
{
  fn partition(&self, payload: &P) -> Option<PartitionKey> {
    (**self).partition(payload)
  }

  fn to_bytes(&self, payload: &P) -> Result<Bytes, SerializationError> {
    (**self).to_bytes(payload)
  }
}

type KeyExtractor<P> = Box<dyn Fn(&P) -> Option<PartitionKey> + Send + Sync>;

/// JSON serializer with an optional key extractor.
///
/// Without an extractor every payload is simple data.
pub struct JsonSerializer<P> {
  key_extractor: Option<KeyExtractor<P>>,
  _payload: PhantomData<fn(&P)>,
}

impl<P> JsonSerializer<P> {
  /// Creates a serializer that never partitions.
  pub fn new() -> Self {
    Self {
      key_extractor: None,
      _payload: PhantomData,
    }
  }

  /// Sets the key extractor.
  #[must_use]
  pub fn with_key_extractor<F>(mut self, extractor: F) -> Self
  where
    F: Fn(&P) -> Option<PartitionKey> + Send + Sync + 'static,
  {
    self.key_extractor = Some(Box::new(extractor));
    self
  }
}

impl<P> Default for JsonSerializer<P> {
  fn default() -> Self {
    Self::new()
  }
}

impl<P> fmt::Debug for JsonSerializer<P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JsonSerializer")
      .field("partitioned", &self.key_extractor.is_some())
      .finish()
  }
}

impl<P: Serialize> PartitioningSerializer<P> for JsonSerializer<P> {
  fn partition(&self, payload: &P) -> Option<PartitionKey> {
    self.key_extractor.as_ref().and_then(|extract| extract(payload))
  }

  fn to_bytes(&self, payload: &P) -> Result<Bytes, SerializationError> {
    Ok(Bytes::from(serde_json::to_vec(payload)?))
  }
}

/// Creates a [`JsonSerializer`] that partitions payloads with `extractor`.
pub fn partition_by_key<P, F>(extractor: F) -> JsonSerializer<P>
where
  F: Fn(&P) -> Option<PartitionKey> + Send + Sync + 'static,
{
  JsonSerializer::new().with_key_extractor(extractor)
}
