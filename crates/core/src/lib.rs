//! Core domain types for the Up/Down hammer-window trading agent.
//!
//! This crate provides fundamental types used throughout the runtime:
//! - `MarketKey` / `Market`: slug-addressed binary Up/Down contracts
//! - `Price`, `Size`: precision-safe numeric types
//! - `TokenConstraints`: per-outcome tick size, min order size, fee rate
//! - `Direction`, `OrderType`, `TimeInForce`: trading enums
//! - `Bbo`, `BookTop`: per-token book state

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod types;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{
    format_decimal_with_constraints, Horizon, Market, MarketKey, PartialTokenConstraints,
    TokenConstraints, MAX_SIG_FIGS,
};
pub use order::{ClientOrderId, Direction, OrderType, TimeInForce};
pub use types::{
    normalize_timestamp, Bbo, BboState, BookTop, Level, PriceSource, PriceTick, TickMetadata,
};
