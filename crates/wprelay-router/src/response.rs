use axum::Json;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use wprelay_core::image::IMAGE_CACHE_CONTROL;
use wprelay_core::{GraphqlReply, ImageReply, RelayError, UpstreamBody};

use crate::cors::{apply_graphql_cors, apply_image_cors};

const GRAPHQL_CACHE_CONTROL: &str = "no-store";

pub(crate) fn error_response(err: &RelayError) -> Response {
    warn!(
        event = "relay_error_response",
        code = err.kind().code(),
        status = err.status().as_u16(),
        error = %err
    );
    (err.status(), Json(err.envelope())).into_response()
}

/// Every GraphQL route response passes through here.
pub(crate) fn finish_graphql(mut resp: Response) -> Response {
    apply_graphql_cors(resp.headers_mut());
    resp.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(GRAPHQL_CACHE_CONTROL),
    );
    resp
}

pub(crate) fn graphql_reply(reply: GraphqlReply) -> Response {
    let resp = Response::builder()
        .status(reply.status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(reply.body))
        .unwrap_or_else(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
        });
    finish_graphql(resp)
}

pub(crate) fn graphql_error(err: RelayError) -> Response {
    finish_graphql(error_response(&err))
}

pub(crate) fn image_reply(reply: ImageReply) -> Response {
    let body = match reply.body {
        UpstreamBody::Bytes(bytes) => Body::from(bytes),
        // A chunk error aborts the response instead of ending it cleanly.
        UpstreamBody::Stream(rx) => Body::from_stream(ReceiverStream::new(rx)),
    };

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(h) = builder.headers_mut() {
        if let Ok(value) = HeaderValue::from_str(&reply.content_type) {
            h.insert(header::CONTENT_TYPE, value);
        }
        if let Some(length) = reply.content_length {
            h.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
        h.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(IMAGE_CACHE_CONTROL),
        );
        apply_image_cors(h);
    }
    builder.body(body).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
    })
}

pub(crate) fn image_error(err: RelayError) -> Response {
    let mut resp = error_response(&err);
    apply_image_cors(resp.headers_mut());
    resp
}
