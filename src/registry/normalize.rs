use crate::UrlError;
use url::Url;

/// Normalizes a page URL into the form used as a registry and queue key
///
/// # Normalization Steps
///
/// 1. If the URL has no scheme/host, resolve it against `base`
/// 2. Reject anything that is not http or https
/// 3. Lowercase scheme and host (done by the parser)
/// 4. Remove the fragment
///
/// Paths, trailing slashes and query strings are kept as written so that
/// lookups stay exact string matches.
///
/// # Examples
///
/// ```
/// use critpath::registry::normalize_url;
/// use url::Url;
///
/// let base = Url::parse("https://Example.com").unwrap();
/// assert_eq!(normalize_url(&base, "/about/").unwrap(), "https://example.com/about/");
/// assert_eq!(
///     normalize_url(&base, "HTTPS://EXAMPLE.COM/#top").unwrap(),
///     "https://example.com/"
/// );
/// ```
pub fn normalize_url(base: &Url, url_str: &str) -> Result<String, UrlError> {
    let mut url = match Url::parse(url_str) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .join(url_str)
            .map_err(|e| UrlError::Parse(format!("{}: {}", url_str, e)))?,
        Err(e) => return Err(UrlError::Parse(format!("{}: {}", url_str, e))),
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost(url_str.to_string()));
    }

    url.set_fragment(None);

    Ok(url.to_string())
}
