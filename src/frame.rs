//! # Buffer Server Wire Frames
//!
//! One [`Frame`] is sent per tuple. Frames are length-delimited on the wire:
//!
//! ```text
//! frame       := len:u32 body
//! body        := kind:u8 window_id:u64 kind_body
//! begin       := node:str
//! end         := node:str tuple_count:u32
//! reset       := interval_millis:u32        (base_seconds << 32 in window_id)
//! end_stream  := (empty)
//! simple      := payload:bytes
//! partitioned := partition_key:bytes payload:bytes
//! str, bytes  := len:u32 raw
//! ```
//!
//! All integers are big-endian. [`FrameCodec`] implements the tokio-util
//! [`Encoder`] and [`Decoder`] traits so frames can be pushed through any
//! `Framed` transport.
//!
//! # Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use slideweave::frame::{Frame, FrameBody, FrameCodec};
//! use slideweave::window::WindowId;
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let frame = Frame::new(WindowId::new(1, 2), FrameBody::BeginWindow { node: "n1".into() });
//! let mut buf = BytesMut::new();
//! FrameCodec::default().encode(frame.clone(), &mut buf).unwrap();
//! let decoded = FrameCodec::default().decode(&mut buf).unwrap();
//! assert_eq!(decoded, Some(frame));
//! ```

use crate::tuple::TupleKind;
use crate::window::WindowId;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound for one frame body.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;
const HEADER_LEN: usize = 1 + 8;

const TAG_BEGIN_WINDOW: u8 = 1;
const TAG_END_WINDOW: u8 = 2;
const TAG_END_STREAM: u8 = 3;
const TAG_RESET_WINDOW: u8 = 4;
const TAG_SIMPLE_DATA: u8 = 5;
const TAG_PARTITIONED_DATA: u8 = 6;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
  /// Underlying I/O failure.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  /// Unknown kind tag on the wire.
  #[error("unknown frame kind {0}")]
  UnknownKind(u8),
  /// Frame body ended before all fields were read.
  #[error("truncated frame")]
  Truncated,
  /// Frame body had bytes left after its last field.
  #[error("{0} trailing bytes after frame body")]
  TrailingBytes(usize),
  /// Node identity was not valid UTF-8.
  #[error("node identity is not valid utf-8")]
  InvalidUtf8,
  /// Frame exceeds the configured limit.
  #[error("frame of {0} bytes exceeds limit")]
  FrameTooLarge(usize),
}

/// Kind-specific part of a frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameBody {
  /// Start of window, with the emitting node's identity.
  BeginWindow {
    /// Emitting node.
    node: String,
  },
  /// End of window, with the number of data frames sent inside it.
  EndWindow {
    /// Emitting node.
    node: String,
    /// Data tuples emitted between the matching begin and this end.
    tuple_count: u32,
  },
  /// End of stream.
  EndStream,
  /// Epoch reset. The epoch itself travels in the frame's window id.
  ResetWindow {
    /// Width of one window in milliseconds.
    interval_millis: u32,
  },
  /// Unpartitioned payload.
  SimpleData {
    /// Encoded payload.
    payload: Bytes,
  },
  /// Payload routed by key.
  PartitionedData {
    /// Partition key bytes.
    partition_key: Bytes,
    /// Encoded payload.
    payload: Bytes,
  },
}

/// One self-contained wire unit, corresponding to exactly one tuple.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
  /// Window id slot.
  pub window_id: WindowId,
  /// Kind-specific body.
  pub body: FrameBody,
}

impl Frame {
  /// Creates a new frame.
  pub fn new(window_id: WindowId, body: FrameBody) -> Self {
    Self { window_id, body }
  }

  /// Tuple kind this frame represents.
  pub fn kind(&self) -> TupleKind {
    match self.body {
      FrameBody::BeginWindow { .. } => TupleKind::BeginWindow,
      FrameBody::EndWindow { .. } => TupleKind::EndWindow,
      FrameBody::EndStream => TupleKind::EndStream,
      FrameBody::ResetWindow { .. } => TupleKind::ResetWindow,
      FrameBody::SimpleData { .. } => TupleKind::SimpleData,
      FrameBody::PartitionedData { .. } => TupleKind::PartitionedData,
    }
  }

  fn tag(&self) -> u8 {
    match self.body {
      FrameBody::BeginWindow { .. } => TAG_BEGIN_WINDOW,
      FrameBody::EndWindow { .. } => TAG_END_WINDOW,
      FrameBody::EndStream => TAG_END_STREAM,
      FrameBody::ResetWindow { .. } => TAG_RESET_WINDOW,
      FrameBody::SimpleData { .. } => TAG_SIMPLE_DATA,
      FrameBody::PartitionedData { .. } => TAG_PARTITIONED_DATA,
    }
  }

  /// Length of the body (everything after the length prefix).
  pub fn body_len(&self) -> usize {
    HEADER_LEN
      + match &self.body {
        FrameBody::BeginWindow { node } => 4 + node.len(),
        FrameBody::EndWindow { node, .. } => 4 + node.len() + 4,
        FrameBody::EndStream => 0,
        FrameBody::ResetWindow { .. } => 4,
        FrameBody::SimpleData { payload } => 4 + payload.len(),
        FrameBody::PartitionedData {
          partition_key,
          payload,
        } => 4 + partition_key.len() + 4 + payload.len(),
      }
  }

  /// Encodes the frame, including its length prefix, into a new buffer.
  ///
  /// Fails with [`FrameError::FrameTooLarge`] when the body exceeds
  /// [`MAX_FRAME_LENGTH`].
  pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::new();
    self.encode_into(&mut buf, MAX_FRAME_LENGTH)?;
    Ok(buf.freeze())
  }

  fn encode_into(&self, dst: &mut BytesMut, max_frame_length: usize) -> Result<(), FrameError> {
    let body_len = self.body_len();
    let prefix = match u32::try_from(body_len) {
      Ok(prefix) if body_len <= max_frame_length => prefix,
      _ => return Err(FrameError::FrameTooLarge(body_len)),
    };
    dst.reserve(LENGTH_PREFIX + body_len);
    dst.put_u32(prefix);
    self.write_body(dst);
    Ok(())
  }

  // Callers have bounded the body to u32::MAX, so every chunk fits its prefix.
  fn write_body(&self, dst: &mut BytesMut) {
    dst.put_u8(self.tag());
    dst.put_u64(self.window_id.as_u64());
    match &self.body {
      FrameBody::BeginWindow { node } => put_chunk(dst, node.as_bytes()),
      FrameBody::EndWindow { node, tuple_count } => {
        put_chunk(dst, node.as_bytes());
        dst.put_u32(*tuple_count);
      }
      FrameBody::EndStream => {}
      FrameBody::ResetWindow { interval_millis } => dst.put_u32(*interval_millis),
      FrameBody::SimpleData { payload } => put_chunk(dst, payload),
      FrameBody::PartitionedData {
        partition_key,
        payload,
      } => {
        put_chunk(dst, partition_key);
        put_chunk(dst, payload);
      }
    }
  }

  fn read_body(mut body: Bytes) -> Result<Self, FrameError> {
    let tag = take_u8(&mut body)?;
    let window_id = WindowId(take_u64(&mut body)?);
    let frame_body = match tag {
      TAG_BEGIN_WINDOW => FrameBody::BeginWindow {
        node: take_str(&mut body)?,
      },
      TAG_END_WINDOW => FrameBody::EndWindow {
        node: take_str(&mut body)?,
        tuple_count: take_u32(&mut body)?,
      },
      TAG_END_STREAM => FrameBody::EndStream,
      TAG_RESET_WINDOW => FrameBody::ResetWindow {
        interval_millis: take_u32(&mut body)?,
      },
      TAG_SIMPLE_DATA => FrameBody::SimpleData {
        payload: take_chunk(&mut body)?,
      },
      TAG_PARTITIONED_DATA => FrameBody::PartitionedData {
        partition_key: take_chunk(&mut body)?,
        payload: take_chunk(&mut body)?,
      },
      other => return Err(FrameError::UnknownKind(other)),
    };
    if body.has_remaining() {
      return Err(FrameError::TrailingBytes(body.remaining()));
    }
    Ok(Frame::new(window_id, frame_body))
  }
}

fn put_chunk(dst: &mut BytesMut, chunk: &[u8]) {
  dst.put_u32(chunk.len() as u32);
  dst.put_slice(chunk);
}

fn take_u8(src: &mut Bytes) -> Result<u8, FrameError> {
  if src.remaining() < 1 {
    return Err(FrameError::Truncated);
  }
  Ok(src.get_u8())
}

fn take_u32(src: &mut Bytes) -> Result<u32, FrameError> {
  if src.remaining() < 4 {
    return Err(FrameError::Truncated);
  }
  Ok(src.get_u32())
}

fn take_u64(src: &mut Bytes) -> Result<u64, FrameError> {
  if src.remaining() < 8 {
    return Err(FrameError::Truncated);
  }
  Ok(src.get_u64())
}

fn take_chunk(src: &mut Bytes) -> Result<Bytes, FrameError> {
  let len = take_u32(src)? as usize;
  if src.remaining() < len {
    return Err(FrameError::Truncated);
  }
  Ok(src.split_to(len))
}

fn take_str(src: &mut Bytes) -> Result<String, FrameError> {
  let chunk = take_chunk(src)?;
  String::from_utf8(chunk.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}

/// Length-delimited codec for [`Frame`]s.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
  max_frame_length: usize,
}

impl FrameCodec {
  /// Creates a codec that rejects bodies longer than `max_frame_length`.
  pub fn new(max_frame_length: usize) -> Self {
    Self { max_frame_length }
  }

  /// Maximum accepted body length.
  pub fn max_frame_length(&self) -> usize {
    self.max_frame_length
  }
}

impl Default for FrameCodec {
  fn default() -> Self {
    Self::new(MAX_FRAME_LENGTH)
  }
}

impl Encoder<Frame> for FrameCodec {
  type Error = FrameError;

  fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
    frame.encode_into(dst, self.max_frame_length)
  }
}

impl Decoder for FrameCodec {
  type Item = Frame;
  type Error = FrameError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    if src.len() < LENGTH_PREFIX {
      return Ok(None);
    }
    let body_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if body_len > self.max_frame_length {
      return Err(FrameError::FrameTooLarge(body_len));
    }
    if src.len() < LENGTH_PREFIX + body_len {
      src.reserve(LENGTH_PREFIX + body_len - src.len());
      return Ok(None);
    }
    src.advance(LENGTH_PREFIX);
    let body = src.split_to(body_len).freeze();
    Frame::read_body(body).map(Some)
  }
}
