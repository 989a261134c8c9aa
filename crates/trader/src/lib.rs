//! Kelly-sized single-order FOK trader (§4.10): sizing, risk-gated
//! submission, and venue-exception classification.

pub mod config;
pub mod error;
pub mod sizing;
pub mod trader;
pub mod venue;

pub use config::TraderConfig;
pub use error::{TraderError, TraderResult};
pub use sizing::{dynamic_risk_pct, effective_cost, kelly_suggestion, size_order, SizedOrder};
pub use trader::Trader;
pub use venue::{classify_submit_exception, HttpVenueClient, OrderArgs, SubmitFailure, VenueClient};
