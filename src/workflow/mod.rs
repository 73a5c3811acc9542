//! Resumable batch issuance
//!
//! - [`step_log`]: write-once records keyed by step
//! - [`confirm`]: commitment polling
//! - [`driver`]: the step state machine over clusters and mint batches
//! - [`mint_list`]: recipients and cluster metadata on disk

pub mod confirm;
pub mod driver;
pub mod mint_list;
pub mod step_log;

pub use confirm::ConfirmationPoller;
pub use driver::{BatchDriver, BatchReport, ClusterRecord, MintRecord, StepOutcome, StepState};
pub use mint_list::{load_cluster_spec, MintItem, MintList};
pub use step_log::{FileStepLog, MemoryStepLog, SledStepLog, StepLog, StepRecord};
