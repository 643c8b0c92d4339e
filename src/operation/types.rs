//! Tagged response and error envelopes for operations.
//!
//! Success, business failure, transport failure, and self-determined
//! redundancy are explicit variants; the engine dispatches on the tag, never
//! on payload shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status string the backend places on successful envelopes
pub const SUCCESS_STATUS: &str = "success";

/// The single result an operation yields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OperationResponse {
    /// Backend accepted the request. `status` other than `"success"` is a
    /// business-level rejection carried on a 2xx envelope.
    Success {
        status: String,
        #[serde(default)]
        payload: Value,
    },
    /// HTTP-level failure
    Error(TransportFailure),
    /// The operation determined it was redundant or superseded and did not
    /// touch the backend
    Skipped,
}

impl OperationResponse {
    pub fn success(payload: Value) -> Self {
        Self::Success {
            status: SUCCESS_STATUS.to_string(),
            payload,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { status, .. } if status == SUCCESS_STATUS)
    }
}

/// An HTTP-level failure envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    /// Raw response body, retained for diagnostics
    #[serde(default)]
    pub payload: Value,
}

/// Classification of a transport failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// RFC 7807 problem-details body
    ProblemDetails(ProblemDetails),
    /// 5xx without a structured body
    ServerError(u16),
    /// Anything else (4xx, malformed body, connection reset mid-response)
    Other(u16),
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProblemDetails(details) => write!(f, "problem details: {}", details.title),
            Self::ServerError(code) => write!(f, "server error ({code})"),
            Self::Other(code) => write!(f, "http error ({code})"),
        }
    }
}

/// Structured problem-details body (RFC 7807 subset the backend emits)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    pub status: u16,
    #[serde(default, rename = "type")]
    pub type_uri: Option<String>,
}

/// Code-level failures raised while executing an operation, distinct from a
/// structured HTTP error response. Known fingerprints get bespoke user
/// messaging in the engine.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The payment provider SDK rejected the request
    #[error("payment provider '{provider}' rejected the request: {message}")]
    PaymentProvider { provider: String, message: String },

    /// The backend refused to bind against a stale quote; a fresh
    /// calculation cycle is required before retrying
    #[error("bind not permitted ({code}): {message}")]
    BindNotPermitted { code: String, message: String },

    /// A named operation error surfaced by the operation implementation
    #[error("operation '{name}' failed: {message}")]
    Named { name: String, message: String },

    /// Anything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_predicate() {
        assert!(OperationResponse::success(json!({"premium": 120.5})).is_success());
        assert!(!OperationResponse::Success {
            status: "quote_expired".to_string(),
            payload: Value::Null,
        }
        .is_success());
        assert!(!OperationResponse::Skipped.is_success());
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let failure = OperationResponse::Error(TransportFailure {
            kind: TransportErrorKind::ProblemDetails(ProblemDetails {
                title: "Quote expired".to_string(),
                detail: Some("The quote is no longer valid".to_string()),
                status: 422,
                type_uri: None,
            }),
            payload: json!({"traceId": "abc"}),
        });
        let encoded = serde_json::to_string(&failure).unwrap();
        let decoded: OperationResponse = serde_json::from_str(&encoded).unwrap();
        match decoded {
            OperationResponse::Error(TransportFailure {
                kind: TransportErrorKind::ProblemDetails(details),
                ..
            }) => assert_eq!(details.status, 422),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }
}
