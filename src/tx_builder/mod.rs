//! Transaction building
//!
//! Building a transaction is a pipeline of pure stages over an immutable
//! [`TransactionSkeleton`]:
//!
//! 1. **assemble**: a builder lays out inputs and outputs
//!    ([`RecordTxBuilder`], [`ClusterTxBuilder`]).
//! 2. **balance**: [`CapacityBalancer`] pulls value cells and appends change
//!    until `inputs == outputs + fee`.
//! 3. **finalize**: the builder fills type ids derived from the first input.
//!
//! [`TransferTxBuilder`] is self-funding and skips the balancer.

pub mod balancer;
pub mod cluster;
pub mod output;
pub mod record;
pub mod skeleton;
pub mod transfer;

pub use balancer::{BalanceReport, BalancingState, CapacityBalancer};
pub use cluster::{ClusterSpec, ClusterTxBuilder};
pub use output::RecordSubmission;
pub use record::{BuildMode, RecordPlan, RecordTxBuilder};
pub use skeleton::{fee_for_size, type_id_args, InputSource, SkeletonInput, TransactionSkeleton};
pub use transfer::TransferTxBuilder;
