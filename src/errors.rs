//! Error taxonomy for spore issuance
//!
//! Every failure of the core surfaces as a [`ForgeError`]. The variants split
//! into three groups:
//! - Request errors (`MalformedInput`, `OccupancyViolation`): rejected before
//!   any chain interaction, never retried.
//! - Funding errors (`NoSpendableCell`, `InsufficientInput`): the balancer could
//!   not fund the skeleton with the cells available right now.
//! - Collaborator errors (`Rpc`, `Signing`, `Submission`, `StepLog`, ...):
//!   raised by the node, the signer or the step-log store.
//!
//! `StepAlreadyCompleted` is informational; the batch driver logs it and moves
//! on instead of propagating it.

use thiserror::Error;

use crate::rpc::RpcError;
use crate::types::OutPoint;

/// Result alias used across the crate
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

#[derive(Error, Debug)]
pub enum ForgeError {
    /// Bad address, hex string, height or request shape
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The collector returned no usable value cells and none were supplied
    #[error("No spendable cell: {0}")]
    NoSpendableCell(String),

    /// Inputs cannot cover outputs plus fee even after collecting every cell
    #[error("Insufficient input capacity: needed {needed} shannons, available {available} shannons")]
    InsufficientInput {
        /// Capacity still missing when the collector ran dry
        needed: u64,
        /// Capacity of all inputs that could be gathered
        available: u64,
    },

    /// An output carries less capacity than it occupies
    #[error("Output #{index} holds {capacity} shannons but occupies {occupied} shannons")]
    OccupancyViolation {
        index: usize,
        capacity: u64,
        occupied: u64,
    },

    /// A referenced cell is not live on chain
    #[error("Cell not found or already spent: {0}")]
    CellNotFound(OutPoint),

    /// The node refused the transaction
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// Informational: the step already has a record and was skipped
    #[error("Step already completed: {0}")]
    StepAlreadyCompleted(String),

    /// The submitted transaction did not reach a terminal status in time
    #[error("Transaction {tx_hash} not committed after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    /// Signing collaborator failure
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Node or indexer communication failure
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Step-log store failure
    #[error("Step log error: {0}")]
    StepLog(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped error from external crates
    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl ForgeError {
    /// Whether re-running the same operation later might succeed
    ///
    /// Funding errors are retryable because new value cells may arrive.
    /// Submission errors are not: a rejected transaction is rejected for a
    /// reason that rerunning the batch has to resolve.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoSpendableCell(_) => true,
            Self::InsufficientInput { .. } => true,
            Self::ConfirmationTimeout { .. } => true,
            Self::Rpc(e) => e.is_retryable(),
            Self::StepLog(_) => true,

            Self::MalformedInput(_) => false,
            Self::OccupancyViolation { .. } => false,
            Self::CellNotFound(_) => false,
            Self::Submission(_) => false,
            Self::StepAlreadyCompleted(_) => false,
            Self::Signing(_) => false,
            Self::Internal(_) => false,
            Self::External(_) => false,
        }
    }

    /// Error category for metrics labels and log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "input",
            Self::NoSpendableCell(_) => "funding",
            Self::InsufficientInput { .. } => "funding",
            Self::OccupancyViolation { .. } => "occupancy",
            Self::CellNotFound(_) => "cell",
            Self::Submission(_) => "submission",
            Self::StepAlreadyCompleted(_) => "step",
            Self::ConfirmationTimeout { .. } => "confirmation",
            Self::Signing(_) => "signing",
            Self::Rpc(_) => "rpc",
            Self::StepLog(_) => "step_log",
            Self::Internal(_) => "internal",
            Self::External(_) => "external",
        }
    }

    /// True for the informational skip signal
    pub fn is_already_completed(&self) -> bool {
        matches!(self, Self::StepAlreadyCompleted(_))
    }
}

// Convenience constructors
impl ForgeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput(reason.into())
    }

    pub fn no_spendable(reason: impl Into<String>) -> Self {
        Self::NoSpendableCell(reason.into())
    }

    pub fn submission(reason: impl Into<String>) -> Self {
        Self::Submission(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    pub fn step_log(reason: impl Into<String>) -> Self {
        Self::StepLog(reason.into())
    }
}
