//! Configuration for output streams and sliding unifiers.
//!
//! Both structs deserialize from JSON with defaults for omitted fields and
//! offer `with_*` builders for programmatic use.
//!
//! ```rust
//! use slideweave::config::{SliderConfig, StreamConfig};
//!
//! let slider = SliderConfig::from_json(r#"{ "number_of_buckets": 3 }"#).unwrap();
//! assert_eq!(slider.number_of_buckets, 3);
//!
//! let stream = StreamConfig::default().with_node_id("agg-1");
//! assert_eq!(stream.node_id, "agg-1");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node identity stamped on window frames when none is configured.
pub const DEFAULT_NODE_ID: &str = "SOS";

/// Error raised when configuration cannot be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// JSON could not be parsed.
  #[error("invalid json: {0}")]
  Json(#[from] serde_json::Error),
  /// A value is out of range.
  #[error("invalid configuration: {0}")]
  Invalid(String),
}

/// Configuration for a [`BufferServerOutputStream`](crate::stream::BufferServerOutputStream).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
  /// Identity written into `BEGIN_WINDOW` and `END_WINDOW` frames.
  pub node_id: String,
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self {
      node_id: DEFAULT_NODE_ID.to_string(),
    }
  }
}

impl StreamConfig {
  /// Sets the node identity.
  #[must_use]
  pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
    self.node_id = node_id.into();
    self
  }

  /// Parses a config from JSON.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    if config.node_id.is_empty() {
      return Err(ConfigError::Invalid("node_id must not be empty".to_string()));
    }
    Ok(config)
  }
}

/// Configuration for a [`Slider`](crate::slider::Slider).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderConfig {
  /// Width of the trailing window in whole windows. 1 disables sliding.
  pub number_of_buckets: u32,
}

impl Default for SliderConfig {
  fn default() -> Self {
    Self {
      number_of_buckets: 1,
    }
  }
}

impl SliderConfig {
  /// Sets the number of buckets.
  #[must_use]
  pub fn with_number_of_buckets(mut self, number_of_buckets: u32) -> Self {
    self.number_of_buckets = number_of_buckets;
    self
  }

  /// Parses a config from JSON.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    if config.number_of_buckets == 0 {
      return Err(ConfigError::Invalid(
        "number_of_buckets must be at least 1".to_string(),
      ));
    }
    Ok(config)
  }
}
