//! URL normalization used for de-duplication and domain bookkeeping.

use url::Url;

/// Canonical form of `raw` used as a de-duplication key.
///
/// Scheme and host are lower-cased, default ports and the fragment are
/// dropped, and a trailing `/` on the path is trimmed. Strings that do not
/// parse as absolute URLs are returned trimmed, unchanged otherwise.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    url.set_fragment(None);

    let mut out = url.to_string();
    // Url keeps "/" as the path of a bare host and keeps trailing slashes
    // on longer paths; both are trimmed unless a query follows.
    if url.query().is_none() {
        while out.ends_with('/') && !out.ends_with("://") {
            out.pop();
        }
    } else if let Some(pos) = out.find("/?") {
        out.remove(pos);
    }
    out
}

/// Lower-cased host of `raw` without a leading `www.`.
pub fn domain_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Whether `raw` is an absolute http(s) URL worth fetching.
pub fn is_fetchable(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_port_fragment_slash() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443/Docs/#intro"),
            "https://example.com/Docs"
        );
        assert_eq!(normalize_url("http://example.com:80/"), "http://example.com");
        assert_eq!(
            normalize_url("https://example.com/a/?q=1#x"),
            "https://example.com/a?q=1"
        );
    }

    #[test]
    fn test_normalize_equivalent_urls_collide() {
        let a = normalize_url("https://www.rust-lang.org/learn/");
        let b = normalize_url("https://WWW.rust-lang.org/learn#get-started");
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_keeps_non_default_port() {
        assert_eq!(
            normalize_url("http://localhost:8080/x/"),
            "http://localhost:8080/x"
        );
    }

    #[test]
    fn test_normalize_unparseable_passthrough() {
        assert_eq!(normalize_url("  not a url "), "not a url");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://www.Medium.com/@x/post"),
            Some("medium.com".to_string())
        );
        assert_eq!(domain_of("relative/path"), None);
    }

    #[test]
    fn test_is_fetchable() {
        assert!(is_fetchable("https://example.com/page"));
        assert!(!is_fetchable("javascript:void(0)"));
        assert!(!is_fetchable("/l/?uddg=abc"));
    }
}
