//! Structured log events of the issuance pipeline

use crate::errors::ForgeError;
use crate::tx_builder::skeleton::TransactionSkeleton;

/// Structured logger for workflow events, tagged with the run's correlation id
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
        }
    }

    pub fn log_step_skipped(&self, step_key: &str) {
        tracing::info!(
            context_id = %self.context_id,
            step_key = %step_key,
            "Step already completed, skipping"
        );
    }

    pub fn log_step_started(&self, step_key: &str) {
        tracing::info!(
            context_id = %self.context_id,
            step_key = %step_key,
            "Step started"
        );
    }

    pub fn log_step_completed(&self, step_key: &str, tx_hash: &str, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            step_key = %step_key,
            tx_hash = %tx_hash,
            latency_ms = %latency_ms,
            "Step completed"
        );
    }

    pub fn log_submission(&self, tx_hash: &str, inputs: usize, outputs: usize, fee: u64) {
        tracing::info!(
            context_id = %self.context_id,
            tx_hash = %tx_hash,
            inputs = %inputs,
            outputs = %outputs,
            fee = %fee,
            "Transaction submitted"
        );
    }

    /// Everything an operator needs to reconcile a failed submission by hand
    pub fn log_submission_failure(&self, skeleton: &TransactionSkeleton, error: &ForgeError) {
        let inputs: Vec<String> = skeleton.inputs.iter().map(|i| i.out_point.to_string()).collect();
        tracing::error!(
            context_id = %self.context_id,
            error = %error,
            category = error.category(),
            inputs = ?inputs,
            outputs = skeleton.outputs.len(),
            output_capacity = skeleton.output_capacity().ok(),
            "Submission failed"
        );
    }

    /// Submitted but not recorded: the next run would resubmit this step
    pub fn log_record_write_failure(&self, step_key: &str, tx_hash: &str, error: &ForgeError) {
        tracing::error!(
            context_id = %self.context_id,
            step_key = %step_key,
            tx_hash = %tx_hash,
            error = %error,
            "Transaction submitted but step record not written; reconcile before rerunning"
        );
    }
}
