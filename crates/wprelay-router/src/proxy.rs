use std::sync::Arc;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;
use wprelay_common::RelayConfig;
use wprelay_core::{GraphqlRelay, IMAGE_RELAY_PATH, ImageRelay, RelayError, UpstreamClient};

use crate::cors::CORS_ALLOW_METHODS;
use crate::response::{finish_graphql, graphql_error, graphql_reply, image_error, image_reply};
use crate::trace::request_trace;

pub const GRAPHQL_RELAY_PATH: &str = "/api/graphql/proxy";

/// Inbound GraphQL bodies above this size are rejected as invalid requests.
pub const MAX_GRAPHQL_BODY_BYTES: usize = 1024 * 1024;

const WELCOME_MESSAGE: &str = "Welcome to the wprelay content relay";
const NOT_FOUND_MESSAGE: &str = "Route not found";

#[derive(Clone)]
pub struct RelayState {
    pub graphql: Arc<GraphqlRelay>,
    pub image: Arc<ImageRelay>,
}

impl RelayState {
    pub fn new(graphql: GraphqlRelay, image: ImageRelay) -> Self {
        Self {
            graphql: Arc::new(graphql),
            image: Arc::new(image),
        }
    }

    /// Both relays share one upstream client and its connection pool.
    pub fn from_config(config: &RelayConfig, client: Arc<dyn UpstreamClient>) -> Self {
        Self::new(
            GraphqlRelay::new(&config.graphql, client.clone()),
            ImageRelay::new(&config.image, client),
        )
    }
}

#[derive(Serialize)]
struct MessageBody {
    message: &'static str,
}

pub fn relay_router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route(
            GRAPHQL_RELAY_PATH,
            post(graphql_proxy)
                .options(graphql_preflight)
                .fallback(graphql_method_not_allowed),
        )
        .route(IMAGE_RELAY_PATH, get(image_proxy))
        .fallback(route_not_found)
        .layer(middleware::from_fn(request_trace))
        .with_state(state)
}

async fn welcome() -> Json<MessageBody> {
    Json(MessageBody {
        message: WELCOME_MESSAGE,
    })
}

async fn route_not_found(method: Method, uri: Uri) -> Response {
    warn!(event = "route_not_found", method = %method, path = %uri.path());
    (
        StatusCode::NOT_FOUND,
        Json(MessageBody {
            message: NOT_FOUND_MESSAGE,
        }),
    )
        .into_response()
}

async fn graphql_proxy(State(state): State<RelayState>, body: Body) -> Response {
    let body = match axum::body::to_bytes(body, MAX_GRAPHQL_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            return graphql_error(RelayError::InvalidRequest(format!(
                "unreadable request body: {err}"
            )));
        }
    };

    match state.graphql.forward(body).await {
        Ok(reply) => graphql_reply(reply),
        Err(err) => graphql_error(err),
    }
}

async fn graphql_preflight() -> Response {
    finish_graphql(StatusCode::NO_CONTENT.into_response())
}

async fn graphql_method_not_allowed(method: Method) -> Response {
    let mut resp = graphql_error(RelayError::MethodNotAllowed(method.to_string()));
    resp.headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(CORS_ALLOW_METHODS));
    resp
}

async fn image_proxy(State(state): State<RelayState>, RawQuery(query): RawQuery) -> Response {
    let target = first_query_value(query.as_deref(), "url");
    match state.image.fetch(target.as_deref()).await {
        Ok(reply) => image_reply(reply),
        Err(err) => image_error(err),
    }
}

/// First occurrence of `name` in a raw query string, percent-decoded.
fn first_query_value(query: Option<&str>, name: &str) -> Option<String> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query?).ok()?;
    pairs
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}
