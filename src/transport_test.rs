//! # Transport Test Suite

use crate::frame::{Frame, FrameBody, FrameCodec};
use crate::transport::*;
use crate::window::WindowId;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

fn registration() -> Registration {
  Registration {
    source_id: "op.out".into(),
    sink_id: "stream-1".into(),
    starting_window_id: WindowId::new(1, 0),
  }
}

fn data_frame(payload: &'static [u8]) -> Frame {
  Frame::new(
    WindowId::new(1, 1),
    FrameBody::SimpleData {
      payload: Bytes::from_static(payload),
    },
  )
}

// ============================================================================
// BufferedTransport Tests
// ============================================================================

#[test]
fn test_buffered_transport_records_registration() {
  let mut transport = BufferedTransport::new();
  assert!(transport.registration().is_none());
  transport.publish(&registration()).unwrap();
  assert_eq!(transport.registration(), Some(&registration()));
}

#[test]
fn test_buffered_transport_frames_decode_in_order() {
  let mut transport = BufferedTransport::new();
  transport.send(data_frame(b"1")).unwrap();
  transport.send(data_frame(b"2")).unwrap();
  assert_eq!(transport.frames_sent(), 2);

  let mut pending = BytesMut::from(&transport.take_pending()[..]);
  assert!(transport.pending().is_empty());

  let mut codec = FrameCodec::default();
  assert_eq!(codec.decode(&mut pending).unwrap(), Some(data_frame(b"1")));
  assert_eq!(codec.decode(&mut pending).unwrap(), Some(data_frame(b"2")));
  assert_eq!(codec.decode(&mut pending).unwrap(), None);
}

#[test]
fn test_buffered_transport_rejects_oversized_frame() {
  let mut transport = BufferedTransport::with_codec(FrameCodec::new(8));
  let err = transport.send(data_frame(b"too large")).unwrap_err();
  assert!(matches!(err, TransportError::Frame(_)));
  assert_eq!(transport.frames_sent(), 0);
  assert!(transport.pending().is_empty());
}

// ============================================================================
// ChannelTransport Tests
// ============================================================================

#[tokio::test]
async fn test_channel_transport_delivers_in_order() {
  let (mut transport, mut receiver) = ChannelTransport::new();
  transport.publish(&registration()).unwrap();
  transport.send(data_frame(b"1")).unwrap();

  assert_eq!(
    receiver.recv().await,
    Some(TransportMessage::Publish(registration()))
  );
  assert_eq!(
    receiver.recv().await,
    Some(TransportMessage::Frame(data_frame(b"1")))
  );
}

#[tokio::test]
async fn test_channel_transport_closed_receiver() {
  let (mut transport, receiver) = ChannelTransport::new();
  drop(receiver);
  let err = transport.send(data_frame(b"1")).unwrap_err();
  assert!(matches!(err, TransportError::Closed));
}
