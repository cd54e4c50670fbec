// ABOUTME: Small shared helpers for truncation and cookie diagnostics
// ABOUTME: Keeps secret material out of error messages

pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }

    // Find a valid UTF-8 boundary at or before max_chars
    let mut boundary = max_chars;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    if boundary == 0 {
        return String::new();
    }

    format!("{}...", &s[..boundary])
}

/// Scheme + host of a URL, falling back to the input with any trailing
/// slash trimmed when it doesn't parse.
pub fn origin_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(u) => match u.host_str() {
            Some(host) => format!("{}://{}", u.scheme(), host),
            None => url.trim_end_matches('/').to_string(),
        },
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}

/// Describes a cookie's shape without leaking its value.
pub fn describe_cookie_shape(cookie: &str) -> String {
    if cookie.is_empty() {
        return "empty".into();
    }
    let segments = cookie.split('.').count();
    format!("{} bytes, {} dot-segment(s)", cookie.len(), segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_short() {
        assert_eq!(truncate_str("hello", 100), "hello");
    }

    #[test]
    fn test_truncate_str_long() {
        let result = truncate_str("hello world", 7);
        assert!(result.starts_with("hello"));
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_str_utf8() {
        // Multi-byte characters must not split mid-codepoint
        let text = "Hello 世界 World";
        let result = truncate_str(text, 10);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://app.jobtrail.app/boards/1"),
            "https://app.jobtrail.app"
        );
        assert_eq!(origin_of("https://app.jobtrail.app/"), "https://app.jobtrail.app");
        assert_eq!(origin_of("nonsense/"), "nonsense");
    }

    #[test]
    fn test_describe_cookie_shape_never_contains_value() {
        let desc = describe_cookie_shape("aaa.bbb.ccc");
        assert!(!desc.contains("aaa"));
        assert!(desc.contains("3 dot-segment"));
    }

    #[test]
    fn test_describe_cookie_shape_empty() {
        assert_eq!(describe_cookie_shape(""), "empty");
    }
}
