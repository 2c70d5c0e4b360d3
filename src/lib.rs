//! # slideweave
//!
//! Windowed data transport and sliding-window aggregation for a streaming
//! dataflow engine.
//!
//! Tuples move between nodes window by window. This crate covers the two
//! pieces that decide ordering, replay and retention:
//!
//! - **Transport**: the window-control vocabulary ([`tuple`]), the stream
//!   invariants ([`protocol`]), the wire frames ([`frame`]) and the
//!   [`BufferServerOutputStream`] that encodes tuples, partitioned or not, for a
//!   buffering [`Transport`].
//! - **Sliding aggregation**: the [`Slider`], which wraps a window-scoped
//!   [`Unifier`] and replays retained windows into it so it aggregates over a
//!   trailing window of N windows.
//!
//! ## Quick Start
//!
//! ```rust
//! use slideweave::config::StreamConfig;
//! use slideweave::partitioning::JsonSerializer;
//! use slideweave::stream::{BufferServerOutputStream, StreamContext};
//! use slideweave::transport::BufferedTransport;
//! use slideweave::tuple::Tuple;
//! use slideweave::window::WindowId;
//!
//! let mut stream = BufferServerOutputStream::new(
//!     StreamConfig::default(),
//!     JsonSerializer::<u32>::new(),
//!     BufferedTransport::new(),
//! );
//! stream.activate(&StreamContext::new("node.out", "stream-1")).unwrap();
//! stream.sink(Tuple::begin_window(WindowId::new(0, 1))).unwrap();
//! stream.sink(Tuple::Data(7)).unwrap();
//! stream.sink(Tuple::end_window(WindowId::new(0, 1))).unwrap();
//! assert_eq!(stream.transport().frames_sent(), 3);
//! ```

#![deny(missing_docs)]

/// Configuration structs for streams and sliders.
pub mod config;
/// Window emitter for the publishing side of a stream.
pub mod emitter;
/// Wire frames and their codec.
pub mod frame;
/// Operator lifecycle and optional capabilities.
pub mod operator;
/// Partitioning serializer contract.
pub mod partitioning;
/// Output ports and sinks.
pub mod port;
/// Window-control protocol tracking.
pub mod protocol;
/// Sliding-window unifier.
pub mod slider;
/// Buffer server output stream.
pub mod stream;
/// Transports beneath the framing layer.
pub mod transport;
/// Tuple and window-control vocabulary.
pub mod tuple;
/// Window identifiers and the window clock.
pub mod window;

#[cfg(test)]
mod transport_test;

pub use frame::{Frame, FrameBody, FrameCodec};
pub use operator::{Operator, OperatorContext, Unifier};
pub use partitioning::{PartitionKey, PartitioningSerializer};
pub use slider::Slider;
pub use stream::{BufferServerOutputStream, StreamContext, StreamError};
pub use transport::Transport;
pub use tuple::{ControlTuple, Tuple, TupleKind};
pub use window::WindowId;
