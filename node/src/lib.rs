//! The Chratos consensus and propagation core.
//!
//! Turns a stream of unordered, possibly-conflicting, possibly-missing
//! blocks received from peers into a single agreed ledger state:
//!
//! - [`block_processor`] — serialized block intake feeding the ledger oracle.
//! - [`vote_processor`] — serialized vote intake with replay detection.
//! - [`block_arrival`] / [`gap_cache`] — arrival dedup and missing-dependency
//!   tracking.
//! - [`network`] — outbound message plumbing and broadcast disciplines.
//! - [`alarm`] — the shared timer service.
//! - [`node`] — the coordinator wiring everything together.

pub mod alarm;
pub mod block_arrival;
pub mod block_processor;
pub mod config;
pub mod error;
pub mod gap_cache;
pub mod logging;
pub mod network;
pub mod node;
pub mod observers;
pub mod stats;
pub mod vote_processor;

pub use alarm::Alarm;
pub use block_arrival::BlockArrival;
pub use block_processor::{BlockItem, BlockProcessor};
pub use config::{NetworkKind, NodeConfig};
pub use error::NodeError;
pub use gap_cache::GapCache;
pub use logging::{init_logging, LogFormat};
pub use network::Network;
pub use node::Node;
pub use observers::{BlockEvent, Observers, VoteEvent};
pub use stats::{Direction, StatDetail, StatType, Stats};
pub use vote_processor::{VoteCode, VoteProcessor};
