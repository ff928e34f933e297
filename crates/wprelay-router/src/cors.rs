use axum::http::{HeaderMap, HeaderValue, header};

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "POST, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";
pub const CORS_MAX_AGE: &str = "86400";

/// Fixed policy for the GraphQL route. Applied to every response it
/// produces, preflight and errors included.
pub(crate) fn apply_graphql_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(CORS_MAX_AGE),
    );
}

pub(crate) fn apply_image_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_policy_sets_all_four_headers() {
        let mut headers = HeaderMap::new();
        apply_graphql_cors(&mut headers);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    }

    #[test]
    fn image_policy_only_opens_the_origin() {
        let mut headers = HeaderMap::new();
        apply_image_cors(&mut headers);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
