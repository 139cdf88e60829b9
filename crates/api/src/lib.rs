//! LoanFi swap adapters.
//!
//! This crate provides the exact-input swap seam used by protocol-forced
//! liquidation to convert seized collateral into the debt token and the
//! automation funding token.

pub mod swap;

pub use swap::{OracleSwapRouter, SwapAdapter, SwapError, SwapParams};
