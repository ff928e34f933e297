use std::time::Duration;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use wprelay_common::ConfigError;

use crate::upstream_client::{UpstreamFailure, UpstreamTransportErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    InvalidRequest,
    UpstreamBlocked,
    UpstreamFormat,
    UpstreamTimeout,
    UpstreamFetch,
    MissingParameter,
    InvalidUrl,
    ForbiddenOrigin,
    MethodNotAllowed,
    Relay,
}

impl ErrorKind {
    /// Stable machine-readable code written to the `error` field.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::UpstreamBlocked => "upstream_blocked",
            ErrorKind::UpstreamFormat => "upstream_format_error",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamFetch => "upstream_fetch_error",
            ErrorKind::MissingParameter => "missing_parameter",
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::ForbiddenOrigin => "forbidden_origin",
            ErrorKind::MethodNotAllowed => "method_not_allowed",
            ErrorKind::Relay => "relay_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay configuration incomplete: {0}")]
    Configuration(#[from] ConfigError),
    #[error("invalid graphql request: {0}")]
    InvalidRequest(String),
    #[error("upstream answered with a bot-protection challenge (rule {rule})")]
    UpstreamBlocked { rule: &'static str },
    #[error("upstream returned an unusable body (status {status}, content-type {content_type})")]
    UpstreamFormat {
        status: u16,
        content_type: String,
        preview: String,
    },
    #[error("upstream did not respond within {}ms", .timeout.as_millis())]
    UpstreamTimeout { timeout: Duration },
    #[error("upstream fetch failed with status {status}")]
    UpstreamFetch { status: StatusCode },
    #[error("missing query parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("origin not allowed: {0}")]
    ForbiddenOrigin(String),
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("upstream request failed: {0}")]
    Relay(String),
}

impl RelayError {
    /// Maps a transport failure; timeouts only count as such when the relay
    /// set a deadline for the call.
    pub fn from_upstream_failure(failure: UpstreamFailure, deadline: Option<Duration>) -> Self {
        match (failure.kind, deadline) {
            (UpstreamTransportErrorKind::Timeout, Some(timeout)) => {
                RelayError::UpstreamTimeout { timeout }
            }
            _ => RelayError::Relay(failure.message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Configuration(_) => ErrorKind::Configuration,
            RelayError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            RelayError::UpstreamBlocked { .. } => ErrorKind::UpstreamBlocked,
            RelayError::UpstreamFormat { .. } => ErrorKind::UpstreamFormat,
            RelayError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            RelayError::UpstreamFetch { .. } => ErrorKind::UpstreamFetch,
            RelayError::MissingParameter(_) => ErrorKind::MissingParameter,
            RelayError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            RelayError::ForbiddenOrigin(_) => ErrorKind::ForbiddenOrigin,
            RelayError::MethodNotAllowed(_) => ErrorKind::MethodNotAllowed,
            RelayError::Relay(_) => ErrorKind::Relay,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Configuration(_)
            | RelayError::UpstreamFormat { .. }
            | RelayError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::InvalidRequest(_)
            | RelayError::MissingParameter(_)
            | RelayError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamBlocked { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::UpstreamFetch { status } => *status,
            RelayError::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Caller-facing text. Transport details and configuration field names
    /// stay in the logs.
    pub fn message(&self) -> String {
        match self {
            RelayError::Configuration(_) => "Server configuration error".to_string(),
            RelayError::InvalidRequest(detail) => format!(
                "Request body must be {{\"query\": string, \"variables\"?: object}}: {detail}"
            ),
            RelayError::UpstreamBlocked { .. } => "The content backend answered with a \
                bot-protection challenge instead of data"
                .to_string(),
            RelayError::UpstreamFormat { .. } => {
                "The content backend returned a response that is not valid JSON".to_string()
            }
            RelayError::UpstreamTimeout { .. } => {
                "The content backend did not respond in time".to_string()
            }
            RelayError::UpstreamFetch { status } => {
                format!("Failed to fetch image: {}", status.as_u16())
            }
            RelayError::MissingParameter(name) => format!("`{name}` parameter is required"),
            RelayError::InvalidUrl(_) => "Invalid URL".to_string(),
            RelayError::ForbiddenOrigin(_) => "Domain not allowed".to_string(),
            RelayError::MethodNotAllowed(method) => {
                format!("Method {method} is not allowed on this route")
            }
            RelayError::Relay(_) => "Failed to reach the content backend".to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let details = match self {
            RelayError::UpstreamFormat { preview, .. } => Some(preview.clone()),
            _ => None,
        };
        ErrorEnvelope {
            error: self.kind().code().to_string(),
            message: Some(self.message()),
            details,
        }
    }
}

/// JSON error body: `{"error": code, "message"?: text, "details"?: preview}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
