//! Serde event types broadcast to hosts (CLI output, UIs, game loops).

pub mod events;
