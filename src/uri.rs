//! Origin and fallback URL normalisation.

use crate::error::Error;
use reqwest::Url;

const SSL_PREFIX: &str = "ssl:";
const ERROR_REDIRECT: &str = "errorredirect";

/// Turn the scheme-less `url` parameter into an absolute origin URL.
///
/// An `ssl:` prefix selects `https`, everything else is fetched over `http`.
/// Input that already carries an `http:`/`https:` scheme is rejected.
pub fn parse_url(raw: &str) -> Result<Url, Error> {
    let raw = raw.trim();

    let candidate = if let Some(rest) = raw.strip_prefix(SSL_PREFIX) {
        format!("https://{}", rest.trim_start_matches('/'))
    } else if starts_with_ignore_case(raw, "http:") || starts_with_ignore_case(raw, "https:") {
        return Err(Error::InvalidUrl);
    } else {
        format!("http://{}", raw.trim_start_matches('/'))
    };

    let url = Url::parse(&candidate).map_err(|_| Error::InvalidUrl)?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(Error::InvalidUrl),
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Parse an `errorredirect` target and strip any nested `errorredirect` pair.
pub fn parse_error_redirect(raw: &str) -> Result<Url, Error> {
    let url = parse_url(raw).map_err(|_| Error::InvalidRedirectUrl)?;
    Ok(sanitize_error_redirect(url))
}

pub fn sanitize_error_redirect(mut url: Url) -> Url {
    let has_nested = url.query_pairs().any(|(key, _)| key == ERROR_REDIRECT);
    if !has_nested {
        return url;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != ERROR_REDIRECT)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}
