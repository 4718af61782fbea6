use std::collections::BTreeMap;

use crate::config::ChatApiConfig;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Build a deterministic header map for chat backend requests.
///
/// The `Authorization` header is attached only when a non-empty token is
/// configured; the backend accepts unauthenticated requests during login.
pub fn build_headers(config: &ChatApiConfig) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(HEADER_ACCEPT.to_owned(), "text/plain, application/json".to_owned());

    let token = config.access_token.trim();
    if !token.is_empty() {
        headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {token}"));
    }

    if let Some(user_agent) = config.user_agent.as_deref().map(str::trim) {
        if !user_agent.is_empty() {
            headers.insert(HEADER_USER_AGENT.to_owned(), user_agent.to_owned());
        }
    }

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_requires_non_empty_token() {
        let anonymous = build_headers(&ChatApiConfig::default());
        assert!(!anonymous.contains_key(HEADER_AUTHORIZATION));

        let blank = build_headers(&ChatApiConfig::new("   "));
        assert!(!blank.contains_key(HEADER_AUTHORIZATION));

        let authed = build_headers(&ChatApiConfig::new("abc.def"));
        assert_eq!(
            authed.get(HEADER_AUTHORIZATION).map(String::as_str),
            Some("Bearer abc.def")
        );
    }

    #[test]
    fn extra_headers_are_lowercased_and_merged_last() {
        let config = ChatApiConfig::default().insert_header("X-Trace-Id", " t-9 ");
        let headers = build_headers(&config);
        assert_eq!(headers.get("x-trace-id").map(String::as_str), Some("t-9"));
        assert_eq!(
            headers.get(HEADER_CONTENT_TYPE).map(String::as_str),
            Some("application/json")
        );
    }
}
