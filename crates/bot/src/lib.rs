//! Up/Down hammer-window trading agent.
//!
//! Main application that orchestrates all components:
//! - Oracle/spot/fallback price feeds and per-token order books
//! - Market catalog resolution and token metadata caching
//! - Oracle/spot quorum health fusion
//! - Hammer-window strategy state machine
//! - Risk-gated order submission
//! - Event recording for offline replay

pub mod app;
pub mod config;
pub mod error;
pub mod supervisor;

pub use app::Application;
pub use config::RuntimeConfig;
pub use error::{AppError, AppResult};
