//! Risk ledger for the trader: per-trade/daily/hourly/exposure caps,
//! cooldown tracking, equity caching, and atomic on-disk persistence.

pub mod config;
pub mod error;
pub mod ledger;
pub mod state;

pub use config::{EffectiveRiskCaps, RiskConfig};
pub use error::{RiskError, RiskResult};
pub use ledger::{RiskDecision, RiskLedger, TradeOutcome};
pub use state::{exposure_key, RiskState};
