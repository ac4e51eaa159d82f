use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use ndarray::ArrayView4;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use voxcue_core::buffering::{create_audio_ring, queue::window_queue, Producer};
use voxcue_core::capture::CaptureBuffer;
use voxcue_core::engine::pipeline::{self, DriverContext};
use voxcue_core::ipc::events::CommandEvent;
use voxcue_core::{
    Command, EngineConfig, InferenceEngine, ModelHandle, VoicePipeline, VoxcueError,
};

/// Confident `go` after a fixed inference delay.
struct DelayModel {
    delay: Duration,
}

impl InferenceEngine for DelayModel {
    fn warm_up(&mut self) -> Result<(), VoxcueError> {
        Ok(())
    }

    fn execute(&mut self, _input: ArrayView4<'_, f32>) -> Result<Vec<f32>, VoxcueError> {
        thread::sleep(self.delay);
        Ok(vec![0.01, 0.01, 0.95, 0.01, 0.01, 0.01])
    }
}

fn recv_event_with_timeout(
    rx: &mut broadcast::Receiver<CommandEvent>,
    timeout: Duration,
) -> CommandEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for command event");
                }
                thread::sleep(Duration::from_millis(2));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("command channel closed unexpectedly"),
        }
    }
}

#[test]
fn first_command_latency_under_250ms() {
    let config = EngineConfig::default();
    let (mut producer, consumer) = create_audio_ring();
    let (window_tx, window_rx) = window_queue(config.max_pending_windows);
    let pipeline = VoicePipeline::new(
        &config,
        ModelHandle::new(DelayModel {
            delay: Duration::from_millis(20),
        }),
        window_rx,
        Box::new(|_: Command| {}),
    )
    .unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let (command_tx, mut command_rx) = broadcast::channel(16);
    let (activity_tx, _) = broadcast::channel(16);
    let capture_config = config.capture_config();
    let tick_interval = config.tick_interval();
    let driver_running = Arc::clone(&running);

    producer.push_slice(&vec![0.2; config.window_len()]);

    let start = Instant::now();
    let handle = thread::spawn(move || {
        let capture = CaptureBuffer::from_consumer(consumer, 16_000, capture_config, window_tx)
            .expect("capture buffer");
        pipeline::run(DriverContext {
            capture,
            pipeline,
            running: driver_running,
            tick_interval,
            command_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        });
    });

    let first = recv_event_with_timeout(&mut command_rx, Duration::from_secs(2));
    let elapsed = start.elapsed();

    running.store(false, Ordering::SeqCst);
    handle.join().expect("driver thread panicked");

    assert_eq!(first.command, Command::Go);
    assert!(
        elapsed < Duration::from_millis(250),
        "window-to-command latency too high: {elapsed:?} (target < 250ms)"
    );
}
