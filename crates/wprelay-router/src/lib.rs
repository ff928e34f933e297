mod cors;
mod proxy;
mod response;
mod trace;

pub use cors::{CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_ALLOW_ORIGIN, CORS_MAX_AGE};
pub use proxy::{GRAPHQL_RELAY_PATH, MAX_GRAPHQL_BODY_BYTES, RelayState, relay_router};
pub use trace::REQUEST_ID_HEADER;
