//! Events broadcast by [`CommandEngine`](crate::engine::CommandEngine).
//!
//! | Event | Subscribe with |
//! |-------|----------------|
//! | `CommandEvent` | `subscribe_commands()` |
//! | `AudioActivityEvent` | `subscribe_activity()` |
//! | `EngineStatusEvent` | `subscribe_status()` |

use serde::{Deserialize, Serialize};

use crate::decision::Command;

/// An accepted command, emitted once per dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub command: Command,
    /// Winning class probability.
    pub confidence: f32,
    /// Milliseconds since the engine started listening.
    pub elapsed_ms: u64,
}

/// Emitted for every window the gate evaluates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    pub seq: u64,
    /// Mean absolute amplitude of the window.
    pub energy: f32,
    pub is_voiced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, or warmed up and waiting for `start()`.
    Idle,
    WarmingUp,
    Listening,
    /// Capture stopped; the engine may be restarted.
    Stopped,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_event_serializes_with_lowercase_command() {
        let event = CommandEvent {
            seq: 7,
            command: Command::Left,
            confidence: 0.91,
            elapsed_ms: 1_250,
        };

        let json = serde_json::to_value(&event).expect("serialize command event");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["command"], "left");
        assert_eq!(json["elapsedMs"], 1_250);
        let conf = json["confidence"].as_f64().expect("confidence is a number");
        assert!((conf - 0.91).abs() < 1e-5);

        let back: CommandEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.command, Command::Left);
    }

    #[test]
    fn engine_status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::WarmingUp,
            detail: Some("loading model".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "warmingup");
        assert_eq!(json["detail"], "loading model");
    }

    #[test]
    fn activity_event_uses_camel_case_fields() {
        let event = AudioActivityEvent {
            seq: 3,
            energy: 0.18,
            is_voiced: true,
        };
        let json = serde_json::to_value(&event).expect("serialize activity event");
        assert_eq!(json["isVoiced"], true);
        assert!(json.get("is_voiced").is_none());
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<EngineStatus>(r#""Listening""#).is_err());
    }
}
