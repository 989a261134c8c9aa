//! Recorder configuration.

use serde::{Deserialize, Serialize};

fn default_queue_capacity() -> usize {
    10_000
}

fn default_enabled() -> bool {
    true
}

/// Where the append-only event journal lives and how large its internal
/// channel is allowed to grow before new events start getting dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub journal_path: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            journal_path: "journal.jsonl".to_string(),
            queue_capacity: default_queue_capacity(),
            enabled: default_enabled(),
        }
    }
}
