pub type Headers = Vec<(String, String)>;

pub fn header_set(headers: &mut Headers, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    let key = name.to_ascii_lowercase();
    if let Some((_, v)) = headers
        .iter_mut()
        .find(|(k, _)| k.to_ascii_lowercase() == key)
    {
        *v = value;
        return;
    }
    headers.push((name, value));
}

pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    let key = name.to_ascii_lowercase();
    headers
        .iter()
        .find(|(k, _)| k.to_ascii_lowercase() == key)
        .map(|(_, v)| v.as_str())
}

/// `application/json` or any `application/*+json`, parameters ignored.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    let Some(value) = content_type else {
        return false;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}
