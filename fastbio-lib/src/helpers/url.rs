use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

use crate::{ErrorKind, Result};

/// Characters kept as they are when a URL is made safe.
///
/// Besides the unreserved characters (`_ . - ~`), these are the delimiters
/// callers use to assemble query strings themselves, so escaping them would
/// change the meaning of the URL.
const SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'&')
    .remove(b'$')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'?')
    .remove(b'@')
    .remove(b'#');

/// Percent-encode every character of `url` outside of the safe set.
///
/// Scheme and authority are kept as they are, so IPv6 hosts such as
/// `http://[::1]:8080` keep their brackets. Note that `%` is not safe, so
/// already encoded input is encoded again.
///
/// # Examples
///
/// ```
/// use fastbio_lib::helpers::url::make_safe_url;
///
/// let url = make_safe_url("https://rest.kegg.jp/find/genes/shiga toxin");
/// assert_eq!(url, "https://rest.kegg.jp/find/genes/shiga%20toxin");
///
/// let url = make_safe_url("https://x/q?ids=1017,1018&fields=symbol;name#top");
/// assert_eq!(url, "https://x/q?ids=1017,1018&fields=symbol;name#top");
/// ```
#[must_use]
pub fn make_safe_url(url: &str) -> String {
    let (origin, rest) = split_origin(url);
    format!("{origin}{}", utf8_percent_encode(rest, SAFE))
}

/// Split `scheme://authority` off the rest of `url`
fn split_origin(url: &str) -> (&str, &str) {
    let Some(scheme_end) = url.find("://") else {
        return ("", url);
    };
    let authority_start = scheme_end + "://".len();
    let origin_end = url[authority_start..]
        .find(['/', '?', '#'])
        .map_or(url.len(), |end| authority_start + end);
    url.split_at(origin_end)
}

/// Whether `url` can stand on its own, i.e. has a scheme and a host
#[must_use]
pub fn is_absolute(url: &str) -> bool {
    Url::parse(url).is_ok_and(|url| url.has_host())
}

/// Turn the URL given by a caller into the URL which is requested.
///
/// Relative URLs are appended to `base_url`, with exactly one `/` between
/// the two. The result is made safe with [`make_safe_url`].
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidUrl`] if the result is not a valid URL, e.g.
/// because `url` is relative and there is no `base_url`.
///
/// # Examples
///
/// ```
/// use fastbio_lib::helpers::url::resolve;
///
/// let url = resolve("https://mygene.info/v3/", "/gene/1017?fields=symbol").unwrap();
/// assert_eq!(url.as_str(), "https://mygene.info/v3/gene/1017?fields=symbol");
///
/// let url = resolve("https://mygene.info/v3", "https://rest.ensembl.org/info/ping").unwrap();
/// assert_eq!(url.as_str(), "https://rest.ensembl.org/info/ping");
/// ```
pub fn resolve(base_url: &str, url: &str) -> Result<Url> {
    let joined = if base_url.is_empty() || is_absolute(url) {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    };

    Url::parse(&make_safe_url(&joined)).map_err(|e| ErrorKind::InvalidUrl(url.to_string(), e))
}
