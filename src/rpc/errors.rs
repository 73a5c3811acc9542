use thiserror::Error;

/// Node and indexer communication errors
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// JSON-RPC error object returned by the server
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: i64,
    },

    /// The node refused a submitted transaction
    #[error("Transaction rejected: {message} (code: {code})")]
    Rejected { message: String, code: i64 },

    /// Response body did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Timeout { .. } => true,
            // JSON-RPC internal error range
            RpcError::RpcResponse { code, .. } => (-32099..=-32000).contains(code) || *code == -32603,

            RpcError::Rejected { .. } => false,
            RpcError::Decode(_) => false,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcError::Transport { endpoint, .. } => Some(endpoint),
            RpcError::Timeout { endpoint, .. } => Some(endpoint),
            RpcError::RpcResponse { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Classify a reqwest failure against `endpoint`
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            RpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else if err.is_decode() {
            RpcError::Decode(err.to_string())
        } else {
            RpcError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transport = RpcError::Transport {
            endpoint: "http://node".into(),
            message: "connection reset".into(),
        };
        assert!(transport.is_retryable());
        assert_eq!(transport.endpoint(), Some("http://node"));

        let rejected = RpcError::Rejected {
            message: "PoolRejectedDuplicatedTransaction".into(),
            code: -1107,
        };
        assert!(!rejected.is_retryable());

        let invalid_params = RpcError::RpcResponse {
            endpoint: "http://node".into(),
            message: "Invalid params".into(),
            code: -32602,
        };
        assert!(!invalid_params.is_retryable());
    }
}
