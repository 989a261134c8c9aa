//! Append-only JSONL event journal (§6 "Recording journal").
//!
//! Records `oracle_price`, `book_top`, `book_price_change`, `decision`,
//! `order_attempt`, and `order_result` events for offline replay. Enqueuing
//! is non-blocking: under sustained back-pressure the recorder drops the
//! incoming event rather than the oldest queued one.

pub mod config;
pub mod error;
pub mod recorder;

pub use config::RecorderConfig;
pub use error::{PersistenceError, PersistenceResult};
pub use recorder::EventRecorder;
