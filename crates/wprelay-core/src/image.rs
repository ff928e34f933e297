use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use tracing::{info, warn};
use url::Url;
use wprelay_common::{AllowList, ImageRelaySettings};

use crate::error::RelayError;
use crate::headers::{Headers, header_get, header_set};
use crate::upstream_client::{
    HttpMethod, UpstreamBody, UpstreamClient, UpstreamHttpRequest, UpstreamHttpResponse,
};

pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/jpeg";
pub const MAX_IMAGE_REDIRECTS: usize = 5;

#[derive(Debug)]
pub struct ImageReply {
    pub content_type: String,
    /// Upstream `Content-Length`, when it sent a valid one.
    pub content_length: Option<u64>,
    pub body: UpstreamBody,
}

pub struct ImageRelay {
    allow_list: AllowList,
    user_agent: String,
    client: Arc<dyn UpstreamClient>,
}

impl ImageRelay {
    pub fn new(settings: &ImageRelaySettings, client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            allow_list: settings.allow_list.clone(),
            user_agent: settings.user_agent.clone(),
            client,
        }
    }

    /// Validates `raw` and fetches it over plain HTTP. The body is streamed
    /// on success; no deadline beyond the client's connect and idle timeouts
    /// applies. Redirects are followed only while every hop stays on the
    /// allow-list.
    pub async fn fetch(&self, raw: Option<&str>) -> Result<ImageReply, RelayError> {
        let mut target = validate_image_target(raw, &self.allow_list)?;
        let started_at = Instant::now();
        let mut hops = 0;

        let response = loop {
            let response = self.get(&target).await?;
            let location = is_redirect(response.status)
                .then(|| header_get(&response.headers, "location").map(str::to_string))
                .flatten();
            let Some(location) = location else {
                break response;
            };
            if hops == MAX_IMAGE_REDIRECTS {
                warn!(event = "image_redirect_limit", url = %target, hops);
                return Err(RelayError::Relay(format!(
                    "more than {MAX_IMAGE_REDIRECTS} redirects"
                )));
            }
            let next = target
                .join(&location)
                .map_err(|err| RelayError::InvalidUrl(err.to_string()))?;
            let next = validate_image_target(Some(next.as_str()), &self.allow_list)?;
            info!(
                event = "image_upstream_redirected",
                from = %target,
                to = %next,
                status = response.status
            );
            target = next;
            hops += 1;
        };

        if !(200..300).contains(&response.status) {
            warn!(
                event = "image_upstream_rejected",
                url = %target,
                status = response.status
            );
            let status = StatusCode::from_u16(response.status)
                .unwrap_or(StatusCode::BAD_GATEWAY);
            return Err(RelayError::UpstreamFetch { status });
        }

        let content_type = header_get(&response.headers, "content-type")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
            .to_string();
        let content_length = header_get(&response.headers, "content-length")
            .and_then(|value| value.trim().parse::<u64>().ok());
        info!(
            event = "image_upstream_responded",
            url = %target,
            status = response.status,
            content_type = %content_type,
            content_length = ?content_length,
            redirects = hops,
            elapsed_ms = started_at.elapsed().as_millis()
        );

        Ok(ImageReply {
            content_type,
            content_length,
            body: response.body,
        })
    }

    async fn get(&self, target: &Url) -> Result<UpstreamHttpResponse, RelayError> {
        let mut headers = Headers::new();
        header_set(&mut headers, "user-agent", self.user_agent.as_str());

        self.client
            .send(UpstreamHttpRequest {
                method: HttpMethod::Get,
                url: target.to_string(),
                headers,
                body: None,
                timeout: None,
                is_stream: true,
            })
            .await
            .map_err(|failure| {
                warn!(
                    event = "image_upstream_failed",
                    url = %target,
                    kind = ?failure.kind,
                    error = %failure.message
                );
                RelayError::from_upstream_failure(failure, None)
            })
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Presence, then parse, then allow-list; the returned URL is downgraded to
/// `http` because the origin serves no TLS.
pub fn validate_image_target(raw: Option<&str>, allow_list: &AllowList) -> Result<Url, RelayError> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(RelayError::MissingParameter("url"))?;

    let mut url = Url::parse(raw).map_err(|err| RelayError::InvalidUrl(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RelayError::InvalidUrl(format!(
            "unsupported scheme `{}`",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| RelayError::InvalidUrl("missing host".to_string()))?
        .to_ascii_lowercase();
    if !allow_list.contains(&host) {
        return Err(RelayError::ForbiddenOrigin(host));
    }

    if url.scheme() == "https" {
        url.set_scheme("http")
            .map_err(|_| RelayError::InvalidUrl("cannot downgrade scheme".to_string()))?;
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list() -> AllowList {
        AllowList::new(["cms.example.com"])
    }

    #[test]
    fn missing_or_blank_parameter() {
        for raw in [None, Some(""), Some("   ")] {
            assert!(matches!(
                validate_image_target(raw, &allow_list()),
                Err(RelayError::MissingParameter("url"))
            ));
        }
    }

    #[test]
    fn unparsable_and_unsupported_urls() {
        for raw in ["not-a-url", "/wp-content/uploads/a.jpg", "ftp://cms.example.com/a.jpg"] {
            assert!(
                matches!(
                    validate_image_target(Some(raw), &allow_list()),
                    Err(RelayError::InvalidUrl(_))
                ),
                "{raw}"
            );
        }
    }

    #[test]
    fn only_location_bearing_statuses_redirect() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status), "{status}");
        }
        for status in [200, 204, 304, 404, 500] {
            assert!(!is_redirect(status), "{status}");
        }
    }

    #[test]
    fn foreign_hosts_are_forbidden() {
        let err = validate_image_target(Some("https://evil.example.com/x.jpg"), &allow_list())
            .unwrap_err();
        assert!(matches!(err, RelayError::ForbiddenOrigin(host) if host == "evil.example.com"));
    }

    #[test]
    fn https_is_downgraded_and_rest_preserved() {
        let url = validate_image_target(
            Some("https://CMS.example.com:8443/wp-content/uploads/2024/05/beach.jpg?ver=2"),
            &allow_list(),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://cms.example.com:8443/wp-content/uploads/2024/05/beach.jpg?ver=2"
        );

        let url = validate_image_target(Some("http://cms.example.com/a.png"), &allow_list())
            .unwrap();
        assert_eq!(url.as_str(), "http://cms.example.com/a.png");
    }
}
