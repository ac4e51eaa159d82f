//! Ring audio → capture → gate → MFCC → classifier → decision, driven tick by
//! tick with a simulated clock.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use ndarray::ArrayView4;
use parking_lot::Mutex;
use voxcue_core::buffering::{create_audio_ring, queue::window_queue, AudioProducer, Producer};
use voxcue_core::capture::CaptureBuffer;
use voxcue_core::{
    Command, EngineConfig, InferenceEngine, ModelHandle, StubModel, TickOutcome, VoicePipeline,
    VoxcueError,
};

struct FixedModel {
    output: Vec<f32>,
    calls: Arc<AtomicUsize>,
}

impl InferenceEngine for FixedModel {
    fn warm_up(&mut self) -> Result<(), VoxcueError> {
        Ok(())
    }

    fn execute(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, VoxcueError> {
        assert_eq!(input.shape(), &[1, 63, 40, 1]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

struct Rig {
    producer: AudioProducer,
    capture: CaptureBuffer,
    pipeline: VoicePipeline,
    dispatched: Arc<Mutex<Vec<Command>>>,
}

impl Rig {
    fn new(config: &EngineConfig, model: ModelHandle) -> Self {
        let (producer, consumer) = create_audio_ring();
        let (window_tx, window_rx) = window_queue(config.max_pending_windows);
        let capture = CaptureBuffer::from_consumer(
            consumer,
            config.sample_rate,
            config.capture_config(),
            window_tx,
        )
        .unwrap();
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&dispatched);
        let pipeline = VoicePipeline::new(
            config,
            model,
            window_rx,
            Box::new(move |c: Command| log.lock().push(c)),
        )
        .unwrap();
        Self {
            producer,
            capture,
            pipeline,
            dispatched,
        }
    }

    /// Feed `samples`, then run one poll + process_once at `now`.
    fn tick(&mut self, samples: &[f32], now: Instant) -> TickOutcome {
        self.producer.push_slice(samples);
        self.capture.poll();
        self.pipeline.process_once(now).unwrap()
    }
}

fn speech_like(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / 16_000.0;
            0.3 * (2.0 * std::f32::consts::PI * 300.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 1_200.0 * t).sin()
        })
        .collect()
}

#[test]
fn silence_never_reaches_the_classifier() {
    let config = EngineConfig::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let model = ModelHandle::new(FixedModel {
        output: vec![0.9, 0.02, 0.02, 0.02, 0.02, 0.02],
        calls: Arc::clone(&calls),
    });
    let mut rig = Rig::new(&config, model);

    let t0 = Instant::now();
    let hop = config.window_len() / 4;
    for step in 0..12 {
        let outcome = rig.tick(&vec![0.0; hop], t0 + Duration::from_millis(250 * step));
        assert!(matches!(outcome, TickOutcome::Idle | TickOutcome::Gated { .. }));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(rig.dispatched.lock().is_empty());
    assert!(rig.pipeline.diagnostics().snapshot().windows_gated > 0);
}

#[test]
fn confident_stop_then_cooldown_then_stop_again() {
    let config = EngineConfig::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let model = ModelHandle::new(FixedModel {
        output: vec![0.9, 0.02, 0.02, 0.02, 0.02, 0.02],
        calls: Arc::clone(&calls),
    });
    let mut rig = Rig::new(&config, model);
    let n = config.window_len();
    let t0 = Instant::now();

    let first = rig.tick(&speech_like(n), t0);
    assert_eq!(first.command(), Some(Command::Stop));

    let second = rig.tick(&speech_like(n), t0 + Duration::from_secs(1));
    assert_eq!(second.command(), None);

    let third = rig.tick(&speech_like(n), t0 + Duration::from_millis(3_000));
    assert_eq!(third.command(), Some(Command::Stop));

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(*rig.dispatched.lock(), vec![Command::Stop, Command::Stop]);
}

#[test]
fn stub_model_never_dispatches() {
    let config = EngineConfig::default();
    let mut rig = Rig::new(&config, ModelHandle::new(StubModel::new()));
    let n = config.window_len();
    let t0 = Instant::now();

    for step in 0..5 {
        let outcome = rig.tick(&speech_like(n / 2), t0 + Duration::from_millis(500 * step));
        assert_eq!(outcome.command(), None);
    }
    assert!(rig.dispatched.lock().is_empty());
    assert!(rig.pipeline.diagnostics().snapshot().windows_classified > 0);
}

#[test]
fn no_new_audio_means_no_new_window() {
    let config = EngineConfig::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let model = ModelHandle::new(FixedModel {
        output: vec![0.1, 0.1, 0.1, 0.1, 0.1, 0.5],
        calls: Arc::clone(&calls),
    });
    let mut rig = Rig::new(&config, model);
    let t0 = Instant::now();

    rig.tick(&speech_like(config.window_len()), t0);
    for step in 1..10 {
        let outcome = rig.tick(&[], t0 + Duration::from_millis(16 * step));
        assert_eq!(outcome, TickOutcome::Idle);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
