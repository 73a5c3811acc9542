//! Run and step correlation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

/// Correlation ID for tracking one operator invocation across steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Context of one driver run
///
/// Every step executed in the run is logged inside [`RunContext::span`], so
/// log lines of one batch can be grouped by `run_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub correlation_id: CorrelationId,
    /// e.g. `mint-batch`, `mint-cluster`
    pub operation: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(operation: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            correlation_id: CorrelationId::new(),
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Same correlation id, fresh run id
    pub fn child(&self, operation: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            correlation_id: self.correlation_id.clone(),
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            correlation_id = %self.correlation_id,
            operation = %self.operation,
        )
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new("default")
    }
}
