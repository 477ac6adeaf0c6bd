use reqwest::Url;

/// Host of a story link without a leading `www.`, for the thread header.
/// Example: "https://www.github.com/foo/bar" -> Some("github.com")
pub fn story_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    match host.is_empty() {
        true => None,
        false => Some(host.to_string()),
    }
}
