//! spore-forge - batch issuance of spore records on CKB
//!
//! The crate builds balanced, fee-correct transactions that mint, replace or
//! transfer spore cells, and drives batches of them through a step log so an
//! interrupted run can be resumed without submitting anything twice.

pub mod address;
pub mod codec;
pub mod config;
pub mod dna;
pub mod errors;
pub mod metrics;
pub mod observability;
pub mod rpc;
pub mod schemas;
pub mod selector;
pub mod service;
pub mod structured_logging;
pub mod tx_builder;
pub mod types;
pub mod wallet;
pub mod workflow;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use errors::{ForgeError, ForgeResult};
pub use service::{RecordRequest, SporeService};
