//! Feed clients and quorum health fusion for the Up/Down hammer-window
//! trading agent.
//!
//! - `oracle`: execution-authoritative oracle stream (§4.1)
//! - `spot`: second-venue quorum-only stream (§4.2)
//! - `fallback`: HTTP liveness polling used while the oracle stream is stale (§4.3)
//! - `book`, `book_state`: per-token order book events and state (§4.4)
//! - `quorum`: oracle/spot divergence fusion (§4.7)

pub mod book;
pub mod book_state;
pub mod error;
pub mod fallback;
pub mod oracle;
pub mod parse;
pub mod quorum;
pub mod spot;

pub use book::{apply_event, parse_frame as parse_book_frame, BookEvent, DropReason};
pub use book_state::BookState;
pub use error::{FeedError, FeedResult};
pub use fallback::{FallbackFeedClient, FallbackFeedConfig};
pub use oracle::{OracleFeedClient, OracleFeedConfig};
pub use quorum::{QuorumConfig, QuorumDecision, QuorumHealth};
pub use spot::{SpotFeedClient, SpotFeedConfig};
