//! Command decision: argmax, confidence threshold, cooldown debounce.
//!
//! ## State machine
//!
//! ```text
//!            accepted dispatch
//!   Idle ─────────────────────────► CoolingDown
//!    ▲                                   │
//!    └──── now - last_dispatch ≥ cooldown ┘   (checked lazily on each call)
//! ```
//!
//! A command arriving while cooling down is dropped, never queued.

pub mod command;

use std::time::{Duration, Instant};

use tracing::debug;

pub use command::{Command, CommandSink};

use crate::inference::ProbabilityVector;

/// Result of evaluating one probability vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Best label scored under the confidence threshold (or the vector was empty).
    BelowThreshold { best: Option<Command>, confidence: f32 },
    /// Confident, but a command was dispatched less than `cooldown` ago.
    Suppressed { command: Command, confidence: f32, remaining: Duration },
    /// Confident and outside the cooldown; the caller should dispatch it.
    Accepted { command: Command, confidence: f32 },
}

impl Decision {
    pub fn accepted(self) -> Option<Command> {
        match self {
            Decision::Accepted { command, .. } => Some(command),
            _ => None,
        }
    }
}

/// Owns the cooldown state. The only persistent mutable state of the
/// decision stage is `last_dispatch`.
#[derive(Debug, Clone)]
pub struct CommandDecision {
    confidence_threshold: f32,
    cooldown: Duration,
    last_dispatch: Option<Instant>,
}

impl CommandDecision {
    pub fn new(confidence_threshold: f32, cooldown: Duration) -> Self {
        Self {
            confidence_threshold,
            cooldown,
            last_dispatch: None,
        }
    }

    /// Returns the command to dispatch at `now`, if any.
    ///
    /// `now` is expected to be non-decreasing across calls.
    pub fn decide(&mut self, probabilities: &ProbabilityVector, now: Instant) -> Option<Command> {
        self.evaluate(probabilities, now).accepted()
    }

    /// Like [`decide`](Self::decide), but reports why nothing was dispatched.
    pub fn evaluate(&mut self, probabilities: &ProbabilityVector, now: Instant) -> Decision {
        let Some((index, confidence)) = probabilities.argmax() else {
            return Decision::BelowThreshold {
                best: None,
                confidence: 0.0,
            };
        };
        let best = Command::from_index(index);

        let command = match best {
            Some(command) if confidence >= self.confidence_threshold => command,
            _ => {
                debug!(?best, confidence, "no command with sufficient confidence");
                return Decision::BelowThreshold { best, confidence };
            }
        };

        if let Some(last) = self.last_dispatch {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                debug!(%command, confidence, ?remaining, "command suppressed by cooldown");
                return Decision::Suppressed {
                    command,
                    confidence,
                    remaining,
                };
            }
        }

        self.last_dispatch = Some(now);
        Decision::Accepted {
            command,
            confidence,
        }
    }

    /// `true` while a previous dispatch still blocks new ones at `now`.
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        self.last_dispatch
            .map(|last| now.saturating_duration_since(last) < self.cooldown)
            .unwrap_or(false)
    }

    pub fn last_dispatch(&self) -> Option<Instant> {
        self.last_dispatch
    }

    /// Forget the last dispatch, returning to idle.
    pub fn reset(&mut self) {
        self.last_dispatch = None;
    }
}
