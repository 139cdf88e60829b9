//! LoanFi chain collaborators.
//!
//! This crate provides the external seams the risk engine consumes:
//! - Price oracle contract ([`PriceOracle`]) and feed answer math
//! - ERC-20 style token ledger ([`TokenLedger`]) with host journaling
//! - In-memory implementations for simulation and tests

pub mod oracle;
pub mod token;

pub use oracle::{OracleError, PriceData, PriceOracle, StaticPriceFeeds, DEFAULT_FEED_DECIMALS};
pub use token::{InMemoryTokenLedger, SnapshotId, TokenLedger, TransferError};
