//! Non-blocking append-only JSONL event journal.
//!
//! One line per event: `oracle_price`, `book_top`, `book_price_change`,
//! `decision`, `order_attempt`, `order_result`. `record` never blocks the
//! caller — on a full queue it drops the *incoming* event, not the oldest
//! queued one, and bumps a counter.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::config::RecorderConfig;
use crate::error::PersistenceResult;

/// Returns true at the points where a drop-count warning should fire:
/// the 1st, 10th, 100th drop, and then every thousand after that.
fn should_warn_at(dropped: u64) -> bool {
    dropped == 1 || dropped == 10 || dropped == 100 || dropped % 1000 == 0
}

fn write_line(writer: &mut BufWriter<std::fs::File>, event: Value) {
    match serde_json::to_vec(&event) {
        Ok(mut line) => {
            line.push(b'\n');
            if let Err(e) = writer.write_all(&line) {
                error!(error = %e, "failed to write recorded event");
            }
        }
        Err(e) => error!(error = %e, "failed to serialize recorded event"),
    }
}

/// Handle to the single writer task. Cloning is not supported: hand the
/// same handle to every producer, `record` only needs `&self`.
pub struct EventRecorder {
    sender: Option<mpsc::Sender<Value>>,
    writer: Option<JoinHandle<()>>,
    dropped_events: Arc<AtomicU64>,
}

impl EventRecorder {
    /// Opens `config.journal_path` in append mode and spawns the writer
    /// task. When `config.enabled` is false, `record` becomes a no-op and
    /// no file is touched.
    pub fn start(config: &RecorderConfig) -> PersistenceResult<Self> {
        if !config.enabled {
            return Ok(Self {
                sender: None,
                writer: None,
                dropped_events: Arc::new(AtomicU64::new(0)),
            });
        }

        if let Some(parent) = std::path::Path::new(&config.journal_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.journal_path)?;
        let mut writer = BufWriter::new(file);

        let (tx, mut rx) = mpsc::channel::<Value>(config.queue_capacity.max(1));
        let writer_task = tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                write_line(&mut writer, first);
                while let Ok(event) = rx.try_recv() {
                    write_line(&mut writer, event);
                }
                if let Err(e) = writer.flush() {
                    error!(error = %e, "failed to flush recorder journal");
                }
            }
        });

        Ok(Self {
            sender: Some(tx),
            writer: Some(writer_task),
            dropped_events: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Enqueues `payload` (any serializable struct, or a `serde_json::json!`
    /// object) tagged with `event_type` and `ts`. Never blocks; drops the
    /// event and counts it if the writer task is behind.
    pub fn record<T: Serialize>(&self, event_type: &str, ts: i64, payload: T) {
        let Some(tx) = &self.sender else {
            return;
        };

        let mut fields = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                error!(error = %e, event_type, "failed to serialize event payload, dropping");
                return;
            }
        };
        fields.insert("type".to_string(), Value::from(event_type));
        fields.insert("ts".to_string(), Value::from(ts));

        if tx.try_send(Value::Object(fields)).is_err() {
            let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
            if should_warn_at(dropped) {
                warn!(dropped_events = dropped, "recorder queue full, dropping event");
            }
        }
    }

    /// Number of events dropped so far due to a full queue.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Closes the channel and waits for the writer task to flush and exit.
    pub async fn stop(mut self) {
        self.sender.take();
        if let Some(handle) = self.writer.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::BufRead;
    use tempfile::TempDir;

    #[test]
    fn drop_warning_thresholds_match_one_ten_hundred_then_every_thousand() {
        assert!(should_warn_at(1));
        assert!(should_warn_at(10));
        assert!(should_warn_at(100));
        assert!(should_warn_at(1000));
        assert!(should_warn_at(2000));
        assert!(!should_warn_at(2));
        assert!(!should_warn_at(999));
        assert!(!should_warn_at(1500));
    }

    #[tokio::test]
    async fn disabled_recorder_never_opens_a_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.jsonl");
        let recorder = EventRecorder::start(&RecorderConfig {
            journal_path: path.to_string_lossy().to_string(),
            queue_capacity: 10,
            enabled: false,
        })
        .unwrap();

        assert!(!recorder.enabled());
        recorder.record("oracle_price", 1, json!({"market_key": "xyz:0"}));
        recorder.stop().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn recorded_events_are_appended_as_jsonl_with_type_and_ts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.jsonl");
        let recorder = EventRecorder::start(&RecorderConfig {
            journal_path: path.to_string_lossy().to_string(),
            queue_capacity: 10,
            enabled: true,
        })
        .unwrap();

        recorder.record("oracle_price", 1_700_000_000, json!({"market_key": "xyz:0", "price": 50000.0}));
        recorder.record("order_result", 1_700_000_001, json!({"token_id": "token-a", "filled": true}));
        recorder.stop().await;

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["type"], "oracle_price");
        assert_eq!(first["ts"], 1_700_000_000);
        assert_eq!(first["market_key"], "xyz:0");

        let second: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second["type"], "order_result");
        assert_eq!(second["filled"], true);
    }

    #[tokio::test]
    async fn journal_path_is_opened_in_append_mode_across_restarts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.jsonl");
        let config = RecorderConfig {
            journal_path: path.to_string_lossy().to_string(),
            queue_capacity: 10,
            enabled: true,
        };

        let recorder = EventRecorder::start(&config).unwrap();
        recorder.record("decision", 1, json!({"watch_mode": true}));
        recorder.stop().await;

        let recorder = EventRecorder::start(&config).unwrap();
        recorder.record("decision", 2, json!({"watch_mode": false}));
        recorder.stop().await;

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2, "second run should append, not truncate");
    }
}
