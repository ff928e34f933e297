use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, info, info_span};

pub const REQUEST_ID_HEADER: &str = "x-wprelay-request-id";

/// Tags each request with a v7 id, echoed back in [`REQUEST_ID_HEADER`].
pub(crate) async fn request_trace(req: Request<Body>, next: Next) -> Response {
    let trace_id = uuid::Uuid::now_v7().to_string();
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let started_at = Instant::now();

    info!(
        event = "downstream_received",
        trace_id = %trace_id,
        method = %method,
        path = %path
    );

    let span = info_span!("request", trace_id = %trace_id);
    let mut resp = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        resp.headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    info!(
        event = "downstream_responded",
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis()
    );
    resp
}
