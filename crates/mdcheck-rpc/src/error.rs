//! Error taxonomy and its JSON-RPC / HTTP / CLI code mappings.

use mdcheck_llm::LlmError;
use mdcheck_store::StoreError;
use mdcheck_workflow::WorkflowError;
use thiserror::Error;

/// JSON-RPC 2.0 error codes, including the application-specific range.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub const VALIDATION_FAILED: i64 = -32000;
    pub const RESOURCE_NOT_FOUND: i64 = -32001;
    pub const UNAUTHORIZED: i64 = -32002;
    pub const RATE_LIMITED: i64 = -32003;
    pub const TIMEOUT: i64 = -32004;
}

/// Typed failure of a dispatched method.
///
/// Every variant carries the user-visible, one-sentence message. Client
/// adapters retry only the transient kinds ([`RpcError::is_transient`]).
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::NotFound(_) => codes::RESOURCE_NOT_FOUND,
            Self::Timeout(_) => codes::TIMEOUT,
            Self::ValidationFailed(_) => codes::VALIDATION_FAILED,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Reconstruct the typed error from a JSON-RPC error object, as client
    /// adapters do.
    pub fn from_code(code: i64, message: String) -> Self {
        match code {
            codes::INVALID_REQUEST => Self::InvalidRequest(message),
            codes::METHOD_NOT_FOUND => Self::MethodNotFound(message),
            codes::INVALID_PARAMS => Self::InvalidParams(message),
            codes::RESOURCE_NOT_FOUND => Self::NotFound(message),
            codes::TIMEOUT => Self::Timeout(message),
            codes::VALIDATION_FAILED => Self::ValidationFailed(message),
            _ => Self::Internal(message),
        }
    }

    /// HTTP status an external transport maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::InvalidParams(_) => 400,
            Self::MethodNotFound(_) | Self::NotFound(_) => 404,
            Self::Timeout(_) => 504,
            Self::ValidationFailed(_) => 422,
            Self::Internal(_) => 500,
        }
    }

    /// Exit code a CLI front-end maps this error to.
    pub fn cli_exit_code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) | Self::InvalidParams(_) => 2,
            Self::MethodNotFound(_) | Self::NotFound(_) => 3,
            Self::Timeout(_) => 4,
            Self::ValidationFailed(_) => 5,
            Self::Internal(_) => 1,
        }
    }

    /// Transient errors are safe to retry with backoff; domain errors are
    /// not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Internal(_))
    }
}

impl From<StoreError> for RpcError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::NotFound(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<LlmError> for RpcError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout { .. } => Self::Timeout(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<WorkflowError> for RpcError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::NotFound { .. } => Self::NotFound(e.to_string()),
            WorkflowError::InvalidType(_)
            | WorkflowError::MissingParam(_)
            | WorkflowError::InvalidTransition { .. }
            | WorkflowError::DeleteRunning { .. } => Self::InvalidParams(e.to_string()),
            WorkflowError::Store(inner) => Self::from(inner),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_mappings() {
        let err = RpcError::InvalidParams("missing x".to_string());
        assert_eq!(err.code(), codes::INVALID_PARAMS);
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.cli_exit_code(), 2);
        assert!(!err.is_transient());

        let err = RpcError::Timeout("LLM request timed out after 30s".to_string());
        assert_eq!(err.code(), codes::TIMEOUT);
        assert_eq!(err.http_status(), 504);
        assert_eq!(err.cli_exit_code(), 4);
        assert!(err.is_transient());

        let err = RpcError::Internal("boom".to_string());
        assert_eq!(err.code(), codes::INTERNAL_ERROR);
        assert!(err.is_transient());
    }

    #[test]
    fn round_trip_through_code() {
        let original = RpcError::NotFound("Validation x not found".to_string());
        let rebuilt = RpcError::from_code(original.code(), original.to_string());
        assert_eq!(rebuilt.code(), codes::RESOURCE_NOT_FOUND);
        assert_eq!(rebuilt.to_string(), "Validation x not found");
    }

    #[test]
    fn store_not_found_maps_to_resource_not_found() {
        let err: RpcError = StoreError::NotFound {
            entity: "Validation",
            id: "abc".to_string(),
        }
        .into();
        assert_eq!(err.code(), codes::RESOURCE_NOT_FOUND);
        assert_eq!(err.to_string(), "Validation abc not found");
    }

    #[test]
    fn llm_timeout_maps_to_timeout() {
        let err: RpcError = LlmError::Timeout { seconds: 30 }.into();
        assert_eq!(err.code(), codes::TIMEOUT);
    }
}
