//! Market catalog client and TTL metadata/fee-rate caches for the Up/Down
//! hammer-window trading agent.
//!
//! - `client`: §4.5 `get_market` resolution, cached by slug until expiry.
//! - `token_cache`: §4.6 per-token tick/lot/fee constraints cache.
//! - `fee_cache`: §4.6 HTTP-backed fee-rate cache.

pub mod client;
pub mod error;
pub mod fee_cache;
pub mod token_cache;

pub use client::{CatalogConfig, MarketCatalogClient};
pub use error::{CatalogError, CatalogResult};
pub use fee_cache::FeeRateCache;
pub use token_cache::TokenMetadataCache;
