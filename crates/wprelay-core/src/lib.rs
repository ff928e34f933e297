//! Relay logic for the content relay.
//!
//! This crate does **not** depend on axum. Relays take plain bytes/strings,
//! perform the single upstream call through an [`UpstreamClient`], and return
//! typed results; the router crate turns them into HTTP responses.

pub mod challenge;
pub mod error;
pub mod graphql;
pub mod headers;
pub mod image;
pub mod proxied_url;
pub mod upstream_client;

pub use challenge::{ChallengeDetector, MarkerChallengeDetector};
pub use error::{ErrorEnvelope, ErrorKind, RelayError};
pub use graphql::{GraphqlRelay, GraphqlReply, GraphqlRequest};
pub use headers::{Headers, header_get, header_set, is_json_content_type};
pub use image::{ImageRelay, ImageReply, validate_image_target};
pub use proxied_url::{IMAGE_RELAY_PATH, PLACEHOLDER_IMAGE_PATH, proxied_image_url};
pub use upstream_client::{
    HttpMethod, UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamFailure,
    UpstreamHttpRequest, UpstreamHttpResponse, UpstreamTransportErrorKind, WreqUpstreamClient,
};
