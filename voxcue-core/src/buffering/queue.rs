//! Bounded hand-off of windows from capture to the pipeline tick.
//!
//! When the consumer falls behind, the oldest pending window is evicted so
//! the pipeline always sees recent audio. Evictions are counted.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::warn;

use super::window::AudioWindow;

pub const DEFAULT_MAX_PENDING_WINDOWS: usize = 4;

/// Create a queue holding at most `capacity` windows (minimum 1).
pub fn window_queue(capacity: usize) -> (WindowSender, WindowReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        WindowSender {
            tx,
            evict: rx.clone(),
            dropped: Arc::clone(&dropped),
        },
        WindowReceiver { rx, dropped },
    )
}

#[derive(Debug, Clone)]
pub struct WindowSender {
    tx: Sender<AudioWindow>,
    /// Lets the producer discard the oldest entry when full.
    evict: Receiver<AudioWindow>,
    dropped: Arc<AtomicU64>,
}

impl WindowSender {
    /// Enqueue a window, evicting the oldest one if the queue is full.
    pub fn push(&self, window: AudioWindow) {
        let mut window = window;
        loop {
            match self.tx.try_send(window) {
                // `evict` keeps the channel connected for the sender's lifetime.
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    window = rejected;
                    if self.evict.try_recv().is_ok() {
                        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(dropped_total = total, "window queue full, dropped oldest window");
                    }
                }
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct WindowReceiver {
    rx: Receiver<AudioWindow>,
    dropped: Arc<AtomicU64>,
}

impl WindowReceiver {
    /// Oldest pending window, if any. Never blocks.
    pub fn try_pop(&self) -> Option<AudioWindow> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Windows evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
