//! # Slider Test Suite
//!
//! Covers replay order, retention bounds, delegate wiring, capability
//! forwarding, idle handling, and snapshot/restore of retained windows.

use super::*;
use crate::port::CollectingSink;
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

// ============================================================================
// Test Unifiers
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Event {
  Begin(WindowId),
  Process(char),
  End,
}

/// Records every call it receives and emits the tuples of each window.
#[derive(Default)]
struct Recorder {
  events: Arc<Mutex<Vec<Event>>>,
  window: Vec<char>,
  output: DefaultOutputPort<char>,
}

impl Recorder {
  fn events(&self) -> Arc<Mutex<Vec<Event>>> {
    self.events.clone()
  }
}

impl Operator for Recorder {
  fn begin_window(&mut self, window_id: WindowId) {
    self.window.clear();
    self.events.lock().unwrap().push(Event::Begin(window_id));
  }

  fn end_window(&mut self) {
    self.events.lock().unwrap().push(Event::End);
    for tuple in self.window.drain(..) {
      self.output.emit(tuple);
    }
  }
}

impl Unifier<char> for Recorder {
  fn process(&mut self, tuple: char) {
    self.events.lock().unwrap().push(Event::Process(tuple));
    self.window.push(tuple);
  }

  fn output_ports(&self) -> Vec<&DefaultOutputPort<char>> {
    vec![&self.output]
  }
}

#[derive(Default)]
struct Sum {
  total: i64,
  output: DefaultOutputPort<i64>,
}

impl Operator for Sum {
  fn begin_window(&mut self, _window_id: WindowId) {
    self.total = 0;
  }

  fn end_window(&mut self) {
    self.output.emit(self.total);
  }
}

impl Unifier<i64> for Sum {
  fn process(&mut self, tuple: i64) {
    self.total += tuple;
  }

  fn output_ports(&self) -> Vec<&DefaultOutputPort<i64>> {
    vec![&self.output]
  }
}

/// Unifier implementing every optional capability.
#[derive(Default)]
struct Capable {
  output: DefaultOutputPort<i64>,
  idle: Arc<AtomicU32>,
  activations: u32,
  deactivations: u32,
  checkpointed: Vec<WindowId>,
  committed: Vec<WindowId>,
  stats_seen: u32,
}

impl Operator for Capable {
  fn begin_window(&mut self, _window_id: WindowId) {}

  fn end_window(&mut self) {}

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

impl Unifier<i64> for Capable {
  fn process(&mut self, _tuple: i64) {}

  fn output_ports(&self) -> Vec<&DefaultOutputPort<i64>> {
    vec![&self.output]
  }
}

impl IdleTimeHandler for Capable {
  fn handle_idle_time(&mut self) {
    self.idle.fetch_add(1, Ordering::SeqCst);
  }
}

impl ActivationListener for Capable {
  fn activate(&mut self, _context: &OperatorContext) {
    self.activations += 1;
  }

  fn deactivate(&mut self) {
    self.deactivations += 1;
  }
}

impl StatsListener for Capable {
  fn process_stats(&mut self, stats: &BatchedOperatorStats) -> Option<StatsResponse> {
    self.stats_seen += 1;
    Some(StatsResponse {
      repartition_required: stats.tuples_processed > 100,
      load_indicator: 1,
      hint: None,
    })
  }
}

impl CheckpointListener for Capable {
  fn checkpointed(&mut self, window_id: WindowId) {
    self.checkpointed.push(window_id);
  }

  fn committed(&mut self, window_id: WindowId) {
    self.committed.push(window_id);
  }
}

/// Unifier that counts how often its capabilities are asked for and has none.
#[derive(Default)]
struct Bare {
  output: DefaultOutputPort<i64>,
  asked: Arc<AtomicU32>,
}

impl Operator for Bare {
  fn begin_window(&mut self, _window_id: WindowId) {}

  fn end_window(&mut self) {}

  fn as_idle_time_handler(&mut self) -> Option<&mut dyn IdleTimeHandler> {
    self.asked.fetch_add(1, Ordering::SeqCst);
    None
  }

  fn as_activation_listener(&mut self) -> Option<&mut dyn ActivationListener> {
    self.asked.fetch_add(1, Ordering::SeqCst);
    None
  }

  fn as_stats_listener(&mut self) -> Option<&mut dyn StatsListener> {
    self.asked.fetch_add(1, Ordering::SeqCst);
    None
  }

  fn as_checkpoint_listener(&mut self) -> Option<&mut dyn CheckpointListener> {
    self.asked.fetch_add(1, Ordering::SeqCst);
    None
  }
}

impl Unifier<i64> for Bare {
  fn process(&mut self, _tuple: i64) {}

  fn output_ports(&self) -> Vec<&DefaultOutputPort<i64>> {
    vec![&self.output]
  }
}

/// Unifier with a configurable number of output ports.
struct Ports(Vec<DefaultOutputPort<i64>>);

impl Operator for Ports {
  fn begin_window(&mut self, _window_id: WindowId) {}

  fn end_window(&mut self) {}
}

impl Unifier<i64> for Ports {
  fn process(&mut self, _tuple: i64) {}

  fn output_ports(&self) -> Vec<&DefaultOutputPort<i64>> {
    self.0.iter().collect()
  }
}

fn run_windows<U: Unifier<T>, T>(operator: &mut U, windows: &[Vec<T>])
where
  T: Clone,
{
  for (seq, window) in windows.iter().enumerate() {
    operator.begin_window(WindowId::new(0, seq as u32));
    for tuple in window {
      operator.process(tuple.clone());
    }
    operator.end_window();
  }
}

fn sums(number_of_buckets: u32, values: &[i64]) -> Vec<i64> {
  let mut slider = Slider::new(Sum::default(), number_of_buckets).unwrap();
  let sink = CollectingSink::new();
  slider.output_port().set_sink(sink.clone());
  slider.setup(&OperatorContext::new("sum")).unwrap();
  let windows: Vec<Vec<i64>> = values.iter().map(|v| vec![*v]).collect();
  run_windows(&mut slider, &windows);
  sink.items()
}

// ============================================================================
// Replay Tests
// ============================================================================

#[test]
fn test_replays_trailing_windows_before_live_tuples() {
  let recorder = Recorder::default();
  let events = recorder.events();
  let mut slider = Slider::new(recorder, 3).unwrap();
  slider.setup(&OperatorContext::new("rec")).unwrap();

  run_windows(&mut slider, &[vec!['a'], vec!['b'], vec!['c']]);
  events.lock().unwrap().clear();

  slider.begin_window(WindowId::new(0, 3));
  slider.process('d');
  slider.end_window();

  assert_eq!(
    *events.lock().unwrap(),
    vec![
      Event::Begin(WindowId::new(0, 3)),
      Event::Process('b'),
      Event::Process('c'),
      Event::Process('d'),
      Event::End,
    ]
  );
}

#[test]
fn test_single_bucket_behaves_like_delegate() {
  let recorder = Recorder::default();
  let events = recorder.events();
  let mut slider = Slider::new(recorder, 1).unwrap();
  slider.setup(&OperatorContext::new("rec")).unwrap();

  run_windows(&mut slider, &[vec!['a'], vec!['b', 'c']]);

  assert!(slider.retention().is_empty());
  assert_eq!(
    *events.lock().unwrap(),
    vec![
      Event::Begin(WindowId::new(0, 0)),
      Event::Process('a'),
      Event::End,
      Event::Begin(WindowId::new(0, 1)),
      Event::Process('b'),
      Event::Process('c'),
      Event::End,
    ]
  );
  assert_eq!(sums(1, &[1, 10, 100]), vec![1, 10, 100]);
}

#[test]
fn test_sliding_sums() {
  assert_eq!(sums(2, &[1, 10, 100, 1000]), vec![1, 11, 110, 1100]);
  assert_eq!(sums(3, &[1, 10, 100, 1000]), vec![1, 11, 111, 1110]);
}

#[test]
fn test_empty_windows_are_retained() {
  let recorder = Recorder::default();
  let events = recorder.events();
  let mut slider = Slider::new(recorder, 3).unwrap();
  run_windows(&mut slider, &[vec!['a'], vec![], vec![]]);
  events.lock().unwrap().clear();

  slider.begin_window(WindowId::new(0, 3));
  assert_eq!(
    *events.lock().unwrap(),
    vec![Event::Begin(WindowId::new(0, 3))]
  );
}

#[test]
fn test_end_window_without_begin_retains_empty_bucket() {
  let mut slider = Slider::new(Sum::default(), 3).unwrap();
  slider.end_window();
  assert_eq!(slider.retention().len(), 1);
  assert!(slider.retention().replay().next().is_none());
}

#[test]
fn test_tuples_outside_window_are_not_retained() {
  let mut slider = Slider::new(Sum::default(), 3).unwrap();
  slider.process(5);
  assert!(slider.retention().is_empty());
  assert_eq!(slider.unifier().total, 5);
}

#[test]
fn test_teardown_clears_retention() {
  let mut slider = Slider::new(Sum::default(), 3).unwrap();
  run_windows(&mut slider, &[vec![1], vec![2]]);
  assert_eq!(slider.retention().len(), 2);
  slider.teardown();
  assert!(slider.retention().is_empty());
}

proptest! {
  #[test]
  fn prop_retention_holds_last_k_minus_one_windows(
    number_of_buckets in 1u32..6,
    windows in proptest::collection::vec(proptest::collection::vec(-1000i64..1000, 0..4), 0..12),
  ) {
    let mut slider = Slider::new(Sum::default(), number_of_buckets).unwrap();
    run_windows(&mut slider, &windows);

    let keep = (number_of_buckets as usize - 1).min(windows.len());
    prop_assert_eq!(slider.retention().len(), keep);
    let expected: Vec<Vec<i64>> = windows[windows.len() - keep..].to_vec();
    prop_assert_eq!(slider.retention().to_vec(), expected);
  }

  #[test]
  fn prop_replay_is_deterministic(
    windows in proptest::collection::vec(proptest::collection::vec(-1000i64..1000, 0..4), 1..8),
  ) {
    let mut first = Slider::new(Sum::default(), 3).unwrap();
    let mut second = Slider::new(Sum::default(), 3).unwrap();
    run_windows(&mut first, &windows);
    run_windows(&mut second, &windows);
    let a: Vec<i64> = first.retention().replay().copied().collect();
    let b: Vec<i64> = second.retention().replay().copied().collect();
    prop_assert_eq!(a, b);
  }
}

// ============================================================================
// Wiring Tests
// ============================================================================

#[test]
fn test_zero_buckets_rejected() {
  let result = Slider::new(Sum::default(), 0);
  assert!(matches!(result, Err(SliderError::InvalidBucketCount)));
}

#[test]
fn test_from_config() {
  let config = SliderConfig::default().with_number_of_buckets(4);
  let slider = Slider::from_config(Sum::default(), &config).unwrap();
  assert_eq!(slider.number_of_buckets(), 4);
  assert_eq!(slider.retention().capacity(), 3);
}

#[test]
fn test_missing_output_port_rejected() {
  let result = Slider::new(Ports(Vec::new()), 2);
  assert!(matches!(
    result,
    Err(SliderError::Operator(OperatorError::MissingOutputPort))
  ));
}

#[test]
fn test_ambiguous_output_port_rejected() {
  let ports = Ports(vec![DefaultOutputPort::new(), DefaultOutputPort::new()]);
  let result = Slider::new(ports, 2);
  assert!(matches!(
    result,
    Err(SliderError::Operator(OperatorError::AmbiguousOutputPort(2)))
  ));
}

#[test]
fn test_setup_rebinds_delegate_output() {
  let mut slider = Slider::new(Sum::default(), 2).unwrap();
  let sink = CollectingSink::new();
  slider.output_port().set_sink(sink.clone());

  run_windows(&mut slider, &[vec![1]]);
  assert!(sink.is_empty());

  slider.setup(&OperatorContext::new("sum")).unwrap();
  run_windows(&mut slider, &[vec![2]]);
  assert_eq!(sink.items(), vec![3]);
  assert!(slider.unifier().output.is_connected());
  assert_eq!(slider.output_port().emitted_count(), 1);
}

#[test]
fn test_sliders_nest() {
  let inner = Slider::new(Sum::default(), 2).unwrap();
  let mut outer = Slider::new(inner, 2).unwrap();
  let sink = CollectingSink::new();
  outer.output_port().set_sink(sink.clone());
  outer.setup(&OperatorContext::new("nested")).unwrap();

  run_windows(&mut outer, &[vec![1], vec![10], vec![100]]);
  assert_eq!(sink.items(), vec![1, 12, 121]);
}

// ============================================================================
// Capability Tests
// ============================================================================

#[test]
fn test_capabilities_probed_at_construction() {
  let slider = Slider::new(Capable::default(), 2).unwrap();
  assert_eq!(
    slider.capabilities(),
    Capabilities {
      idle_time: true,
      activation: true,
      stats: true,
      checkpoint: true,
    }
  );
  let plain = Slider::new(Sum::default(), 2).unwrap();
  assert_eq!(plain.capabilities(), Capabilities::default());
}

#[test]
fn test_capabilities_forwarded_to_delegate() {
  let capable = Capable::default();
  let idle = capable.idle.clone();
  let mut slider = Slider::new(capable, 2).unwrap();
  let context = OperatorContext::new("cap");
  slider.setup(&context).unwrap();

  slider.handle_idle_time();
  ActivationListener::activate(&mut slider, &context);
  ActivationListener::deactivate(&mut slider);
  slider.checkpointed(WindowId::new(0, 4));
  slider.committed(WindowId::new(0, 4));
  let stats = BatchedOperatorStats {
    tuples_processed: 500,
    ..BatchedOperatorStats::default()
  };
  let response = slider.process_stats(&stats).unwrap();

  assert!(response.repartition_required);
  assert_eq!(idle.load(Ordering::SeqCst), 1);
  let delegate = slider.unifier();
  assert_eq!(delegate.activations, 1);
  assert_eq!(delegate.deactivations, 1);
  assert_eq!(delegate.checkpointed, vec![WindowId::new(0, 4)]);
  assert_eq!(delegate.committed, vec![WindowId::new(0, 4)]);
  assert_eq!(delegate.stats_seen, 1);
}

#[test]
fn test_absent_capabilities_are_no_ops() {
  let mut slider = Slider::new(Sum::default(), 2).unwrap();
  let context = OperatorContext::new("sum").with_spin_millis(0);
  slider.setup(&context).unwrap();

  ActivationListener::activate(&mut slider, &context);
  ActivationListener::deactivate(&mut slider);
  slider.checkpointed(WindowId::new(0, 1));
  slider.committed(WindowId::new(0, 1));
  assert_eq!(
    slider.process_stats(&BatchedOperatorStats::default()),
    None
  );
}

#[test]
fn test_absent_capabilities_asked_once() {
  let bare = Bare::default();
  let asked = bare.asked.clone();
  let mut slider = Slider::new(bare, 2).unwrap();
  assert_eq!(asked.load(Ordering::SeqCst), 4);

  let context = OperatorContext::new("bare").with_spin_millis(0);
  slider.setup(&context).unwrap();
  slider.handle_idle_time();
  ActivationListener::activate(&mut slider, &context);
  ActivationListener::deactivate(&mut slider);
  assert_eq!(
    slider.process_stats(&BatchedOperatorStats::default()),
    None
  );
  slider.checkpointed(WindowId::new(0, 1));
  slider.committed(WindowId::new(0, 1));
  assert_eq!(asked.load(Ordering::SeqCst), 4);
}

#[test]
fn test_idle_without_handler_sleeps_for_spin() {
  let mut slider = Slider::new(Sum::default(), 2).unwrap();
  slider
    .setup(&OperatorContext::new("sum").with_spin_millis(5))
    .unwrap();
  assert_eq!(slider.spin(), Duration::from_millis(5));

  let started = Instant::now();
  slider.handle_idle_time();
  assert!(started.elapsed() >= Duration::from_millis(5));
}

#[test]
fn test_wrapper_advertises_every_capability() {
  let mut slider = Slider::new(Sum::default(), 2).unwrap();
  assert!(slider.as_idle_time_handler().is_some());
  assert!(slider.as_activation_listener().is_some());
  assert!(slider.as_stats_listener().is_some());
  assert!(slider.as_checkpoint_listener().is_some());
}

// ============================================================================
// Snapshot Tests
// ============================================================================

#[test]
fn test_snapshot_restore_resumes_replay() {
  let mut original = Slider::new(Sum::default(), 3).unwrap();
  run_windows(&mut original, &[vec![1], vec![2, 3], vec![4]]);
  let snapshot = original.snapshot().unwrap();

  let mut restored = Slider::new(Sum::default(), 3).unwrap();
  restored.restore(&snapshot).unwrap();
  assert_eq!(restored.retention().to_vec(), vec![vec![2, 3], vec![4]]);

  restored.begin_window(WindowId::new(0, 3));
  assert_eq!(restored.unifier().total, 9);
}

#[test]
fn test_restore_into_narrower_slider_keeps_newest() {
  let mut original = Slider::new(Sum::default(), 4).unwrap();
  run_windows(&mut original, &[vec![1], vec![2], vec![3]]);
  let snapshot = original.snapshot().unwrap();

  let mut narrow = Slider::new(Sum::default(), 2).unwrap();
  narrow.restore(&snapshot).unwrap();
  assert_eq!(narrow.retention().to_vec(), vec![vec![3]]);
}

#[test]
fn test_restore_rejects_garbage() {
  let mut slider = Slider::new(Sum::default(), 2).unwrap();
  let result = slider.restore(b"not json");
  assert!(matches!(result, Err(SliderError::Snapshot(_))));
}

#[test]
fn test_snapshot_survives_file_roundtrip() {
  let mut original = Slider::new(Sum::default(), 3).unwrap();
  run_windows(&mut original, &[vec![7], vec![8]]);

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("slider.json");
  std::fs::write(&path, original.snapshot().unwrap()).unwrap();

  let mut restored = Slider::new(Sum::default(), 3).unwrap();
  restored.restore(&std::fs::read(&path).unwrap()).unwrap();
  assert_eq!(restored.retention().to_vec(), original.retention().to_vec());
}

#[test]
fn test_delegate_setup_failure_propagates() {
  struct Failing(DefaultOutputPort<i64>);

  impl Operator for Failing {
    fn setup(&mut self, _context: &OperatorContext) -> Result<(), OperatorError> {
      Err(OperatorError::Setup("no state store".into()))
    }
    fn begin_window(&mut self, _window_id: WindowId) {}
    fn end_window(&mut self) {}
  }

  impl Unifier<i64> for Failing {
    fn process(&mut self, _tuple: i64) {}
    fn output_ports(&self) -> Vec<&DefaultOutputPort<i64>> {
      vec![&self.0]
    }
  }

  let mut slider = Slider::new(Failing(DefaultOutputPort::new()), 2).unwrap();
  let err = slider.setup(&OperatorContext::new("failing")).unwrap_err();
  assert!(matches!(err, OperatorError::Setup(_)));
}
