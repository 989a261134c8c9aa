//! Hammer-window strategy state machine for the Up/Down trading agent.
//!
//! Tracks a rolling 1-second price window per underlying, triggers watch
//! mode on a sufficiently large move, and scores hammer-window candidates
//! by fill-probability-weighted expected value (§4.8).

pub mod calibration;
pub mod config;
pub mod error;
pub mod fee;
pub mod signal;
pub mod state_machine;
pub mod stats;

pub use calibration::{
    load_probability_calibrator, CalibrationInput, CalibrationMethod, IdentityCalibrator,
    IsotonicCalibrator, LogisticCalibrator, ProbabilityCalibrator,
};
pub use config::StrategyConfig;
pub use error::{StrategyError, StrategyResult};
pub use fee::{resolve_fee_cost, FeeMetadata};
pub use signal::Candidate;
pub use state_machine::StrategyStateMachine;
pub use stats::RollingStats;
