use url::Url;
use wprelay_common::AllowList;

pub const IMAGE_RELAY_PATH: &str = "/api/image-proxy";
pub const PLACEHOLDER_IMAGE_PATH: &str = "/images/placeholder.jpg";

/// Rewrites an image reference so browsers load allow-listed images through
/// the image relay. Idempotent: URLs already pointing at the relay, foreign
/// URLs and relative paths come back unchanged.
pub fn proxied_image_url(original: Option<&str>, allow_list: &AllowList) -> String {
    let Some(original) = original.map(str::trim).filter(|value| !value.is_empty()) else {
        return PLACEHOLDER_IMAGE_PATH.to_string();
    };
    if points_at_relay(original) {
        return original.to_string();
    }
    let Ok(url) = Url::parse(original) else {
        return original.to_string();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return original.to_string();
    }
    match url.host_str() {
        Some(host) if allow_list.contains(host) => {
            format!("{IMAGE_RELAY_PATH}?url={}", urlencoding::encode(original))
        }
        _ => original.to_string(),
    }
}

fn points_at_relay(candidate: &str) -> bool {
    if let Some(rest) = candidate.strip_prefix(IMAGE_RELAY_PATH) {
        return rest.is_empty() || rest.starts_with('?');
    }
    Url::parse(candidate)
        .map(|url| url.path() == IMAGE_RELAY_PATH)
        .unwrap_or(false)
}
