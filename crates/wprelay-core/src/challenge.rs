use crate::headers::is_json_content_type;

/// Classifies an upstream response as a bot-protection challenge page.
///
/// Heuristic and best-effort. Implementations return the name of the rule
/// that matched so it can be logged.
pub trait ChallengeDetector: Send + Sync {
    fn detect(&self, content_type: Option<&str>, body: &str) -> Option<&'static str>;
}

/// Substring markers of the JavaScript cookie challenge served by free
/// WordPress hosts, plus HTML served under a JSON content-type.
#[derive(Debug, Clone)]
pub struct MarkerChallengeDetector {
    markers: Vec<(&'static str, &'static str)>,
}

impl MarkerChallengeDetector {
    pub fn new(markers: Vec<(&'static str, &'static str)>) -> Self {
        Self { markers }
    }
}

impl Default for MarkerChallengeDetector {
    fn default() -> Self {
        Self::new(vec![
            ("slow_aes_decrypt", "slowAES.decrypt"),
            ("aes_loader_script", "src=\"/aes.js\""),
        ])
    }
}

impl ChallengeDetector for MarkerChallengeDetector {
    fn detect(&self, content_type: Option<&str>, body: &str) -> Option<&'static str> {
        if let Some((rule, _)) = self
            .markers
            .iter()
            .find(|(_, marker)| body.contains(marker))
        {
            return Some(*rule);
        }
        if is_json_content_type(content_type) && looks_like_html_document(body) {
            return Some("html_in_json_response");
        }
        None
    }
}

pub fn looks_like_html_document(body: &str) -> bool {
    let head = body.trim_start();
    starts_with_ignore_case(head, "<!doctype html") || starts_with_ignore_case(head, "<html")
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
