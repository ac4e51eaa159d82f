//! The fixed command vocabulary and the consumer seam.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VoxcueError;

/// One recognised voice command.
///
/// Variant order is the classifier's output order: index `i` of a
/// probability vector scores `Command::ALL[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Stop,
    Left,
    Go,
    Down,
    Right,
    Up,
}

impl Command {
    /// All labels, index-aligned with the classifier output.
    pub const ALL: [Command; 6] = [
        Command::Stop,
        Command::Left,
        Command::Go,
        Command::Down,
        Command::Right,
        Command::Up,
    ];

    /// Number of labels the classifier scores.
    pub const COUNT: usize = Self::ALL.len();

    /// Label at a classifier output index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Lowercase literal handed to command consumers.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Stop => "stop",
            Command::Left => "left",
            Command::Go => "go",
            Command::Down => "down",
            Command::Right => "right",
            Command::Up => "up",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = VoxcueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| VoxcueError::Config(format!("unknown command label: {s:?}")))
    }
}

/// Receives every accepted command, once per accepted decision.
pub trait CommandSink: Send + 'static {
    fn dispatch(&mut self, command: Command);
}

impl<F> CommandSink for F
where
    F: FnMut(Command) + Send + 'static,
{
    fn dispatch(&mut self, command: Command) {
        self(command)
    }
}
