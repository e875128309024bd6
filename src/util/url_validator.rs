use thiserror::Error;
use url::Url;

/// Errors that can occur during feed URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Normalizes a feed URL to its store key: surrounding whitespace removed
/// and the whole URL lowercased.
///
/// Lowercasing the path too matches how feeds have always been keyed; two
/// registrations that differ only in case are the same feed.
///
/// # Examples
///
/// ```
/// use feedbird::util::normalize_feed_url;
///
/// assert_eq!(normalize_feed_url("  HTTPS://Example.com/RSS\n"), "https://example.com/rss");
/// ```
pub fn normalize_feed_url(url: &str) -> String {
    url.trim().to_lowercase()
}

/// Validates a URL string for registration as a feed source.
///
/// Accepts only absolute `http`/`https` URLs with a host.
///
/// # Errors
///
/// Returns [`UrlValidationError`] if the URL cannot be parsed, uses another
/// scheme, or has no host.
///
/// # Examples
///
/// ```
/// use feedbird::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlValidationError::MissingHost),
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
        assert!(validate_feed_url("http://news.example.org").is_ok());
        assert!(validate_feed_url("  https://example.com/rss  ").is_ok());
    }

    #[test]
    fn test_local_urls_accepted() {
        // Self-hosted feeds on the same machine are legitimate sources
        assert!(validate_feed_url("http://127.0.0.1:8080/feed").is_ok());
        assert!(validate_feed_url("http://localhost/feed").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_feed_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_feed_url("ftp://example.com").is_err());
        assert!(validate_feed_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_unparsable() {
        assert!(matches!(
            validate_feed_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
        assert!(validate_feed_url("").is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_feed_url("\tHTTPS://Example.COM/Feed.XML "),
            "https://example.com/feed.xml"
        );
        assert_eq!(normalize_feed_url("https://a.b/c"), "https://a.b/c");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC{0,64}") {
            let once = normalize_feed_url(&s);
            prop_assert_eq!(normalize_feed_url(&once), once);
        }
    }
}
