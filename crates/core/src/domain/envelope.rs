use serde::Serialize;

use super::query::QueryDescriptor;
use super::results::ExecutionResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// Top-level response body.
///
/// `status` reports whether translation and dispatch succeeded. Execution
/// failures live in `results.status`, so a successful envelope may still carry
/// an error result.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status: EnvelopeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_details: Option<QueryDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(descriptor: QueryDescriptor, results: ExecutionResult) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            query_details: Some(descriptor),
            results: Some(results),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            query_details: None,
            results: None,
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == EnvelopeStatus::Error
    }

    /// True when either orchestration or execution failed.
    pub fn has_failure(&self) -> bool {
        self.is_error() || self.results.as_ref().is_some_and(ExecutionResult::is_error)
    }
}
