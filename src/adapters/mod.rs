//! Adapters module — boundaries to the outside world.
//!
//! - **CLI** — interactive and single-message command line interface
//! - **Desktop** — the operating system: processes, files, URLs, volume
//!
//! # Adding a New Channel
//!
//! 1. Create a new file (e.g., `http.rs`)
//! 2. Drive an [`Assistant`](crate::assistant::Assistant) with a session id per conversation
//! 3. List it in [`ChannelRegistry`]

pub mod cli;
pub mod desktop;

/// Channel registry — metadata about available channels.
pub struct ChannelRegistry;

impl ChannelRegistry {
    /// List all available channel names.
    pub fn available() -> &'static [&'static str] {
        &["cli"]
    }

    /// Get a human-readable description of a channel.
    pub fn description(name: &str) -> &'static str {
        match name {
            "cli" => "Interactive command line interface",
            _ => "Unknown channel",
        }
    }
}
