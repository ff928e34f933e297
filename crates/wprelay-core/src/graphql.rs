use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Map, Value};
use tracing::{info, warn};
use wprelay_common::{ConfigError, GraphqlUpstream, GraphqlUpstreamSettings};

use crate::challenge::{ChallengeDetector, MarkerChallengeDetector};
use crate::error::RelayError;
use crate::headers::{Headers, header_get, header_set, is_json_content_type};
use crate::upstream_client::{HttpMethod, UpstreamClient, UpstreamHttpRequest};

/// Upper bound on the raw-body preview attached to format errors.
pub const MAX_BODY_PREVIEW_BYTES: usize = 512;

/// Inbound GraphQL operation. `operationName` is tolerated because standard
/// GraphQL HTTP clients send it; anything else is rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

impl GraphqlRequest {
    pub fn parse(body: &[u8]) -> Result<Self, RelayError> {
        let request: GraphqlRequest = serde_json::from_slice(body)
            .map_err(|err| RelayError::InvalidRequest(err.to_string()))?;
        if request.query.trim().is_empty() {
            return Err(RelayError::InvalidRequest(
                "`query` must not be empty".to_string(),
            ));
        }
        Ok(request)
    }

    pub fn operation_label(&self) -> &str {
        self.operation_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("anonymous")
    }
}

/// Validated upstream JSON, forwarded byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphqlReply {
    pub status: StatusCode,
    pub body: Bytes,
}

pub struct GraphqlRelay {
    upstream: Result<GraphqlUpstream, ConfigError>,
    client: Arc<dyn UpstreamClient>,
    detector: Arc<dyn ChallengeDetector>,
}

impl GraphqlRelay {
    pub fn new(settings: &GraphqlUpstreamSettings, client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream: settings.resolve(),
            client,
            detector: Arc::new(MarkerChallengeDetector::default()),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn ChallengeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.upstream.is_ok()
    }

    pub async fn forward(&self, body: Bytes) -> Result<GraphqlReply, RelayError> {
        let upstream = match &self.upstream {
            Ok(upstream) => upstream,
            Err(err) => {
                warn!(event = "graphql_config_missing", error = %err);
                return Err(RelayError::Configuration(err.clone()));
            }
        };
        let request = GraphqlRequest::parse(&body)?;
        let op = request.operation_label().to_string();

        let mut headers = Headers::new();
        header_set(&mut headers, "content-type", "application/json");
        header_set(&mut headers, "accept", "application/json");
        header_set(
            &mut headers,
            "authorization",
            upstream.credential.basic_auth_header(),
        );
        header_set(&mut headers, "cache-control", "no-cache");
        header_set(&mut headers, "pragma", "no-cache");

        let started_at = Instant::now();
        let response = self
            .client
            .send(UpstreamHttpRequest {
                method: HttpMethod::Post,
                url: upstream.url.clone(),
                headers,
                body: Some(body),
                timeout: Some(upstream.timeout),
                is_stream: false,
            })
            .await
            .map_err(|failure| {
                warn!(
                    event = "graphql_upstream_failed",
                    op = %op,
                    kind = ?failure.kind,
                    error = %failure.message,
                    elapsed_ms = started_at.elapsed().as_millis()
                );
                RelayError::from_upstream_failure(failure, Some(upstream.timeout))
            })?;

        let content_type = header_get(&response.headers, "content-type").map(str::to_string);
        let body = response
            .body
            .collect()
            .await
            .map_err(|err| RelayError::Relay(err.to_string()))?;
        info!(
            event = "graphql_upstream_responded",
            op = %op,
            status = response.status,
            content_type = ?content_type,
            bytes = body.len(),
            elapsed_ms = started_at.elapsed().as_millis()
        );

        let result = classify_upstream_response(
            self.detector.as_ref(),
            response.status,
            content_type.as_deref(),
            body,
        );
        if let Err(err) = &result {
            warn!(event = "graphql_upstream_rejected", op = %op, error = %err);
        }
        result
    }
}

/// Inspects the upstream body as text before committing to a JSON parse.
pub fn classify_upstream_response(
    detector: &dyn ChallengeDetector,
    status: u16,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<GraphqlReply, RelayError> {
    if let Some(rule) = detector.detect(content_type, &String::from_utf8_lossy(&body)) {
        return Err(RelayError::UpstreamBlocked { rule });
    }

    if is_json_content_type(content_type) && serde_json::from_slice::<IgnoredAny>(&body).is_ok() {
        let status = StatusCode::from_u16(status)
            .map_err(|_| RelayError::Relay(format!("invalid upstream status {status}")))?;
        return Ok(GraphqlReply { status, body });
    }

    Err(RelayError::UpstreamFormat {
        status,
        content_type: content_type.unwrap_or("<none>").to_string(),
        preview: body_preview(&String::from_utf8_lossy(&body), MAX_BODY_PREVIEW_BYTES),
    })
}

/// First `limit` bytes of `text`, cut back to a char boundary.
pub fn body_preview(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
