//! Header filtering and rewriting for the relay.

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST, LOCATION, ORIGIN, REFERER, SET_COOKIE,
};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Meaningful for a single connection only, never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Would reveal the relay's own network position to the ERP.
const FORWARDING: &[&str] = &[
    "forwarded",
    "via",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-port",
    "x-forwarded-proto",
    "x-real-ip",
];

/// Set by the relay or its HTTP client; a forwarded copy would conflict.
const RELAY_SET_REQUEST: &[&str] = &[
    "host",
    "origin",
    "referer",
    "content-length",
    "accept-encoding",
];

/// The body is decoded and re-framed by the relay, so the upstream's encoding
/// and length no longer describe it.
const RELAY_SET_RESPONSE: &[&str] = &["content-encoding", "content-length"];

static COOKIE_ATTR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(domain|samesite|secure)\s*(=|$)").unwrap());

/// Header names listed in a `Connection` header are hop-by-hop too.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_blocked(name: &HeaderName, lists: &[&[&str]], extra: &[String]) -> bool {
    let name = name.as_str();
    lists.iter().any(|list| list.contains(&name)) || extra.iter().any(|token| token == name)
}

/// `host[:port]` of the upstream, as it should appear in `Host`.
fn host_header(upstream: &Url) -> Option<String> {
    let host = upstream.host_str()?;
    Some(match upstream.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Builds the headers sent to the ERP: the client's headers minus the
/// blocklists, with `Host`, `Origin` and `Referer` pointing at the ERP (it
/// rejects mismatched virtual-host headers).
pub fn forward_request_headers(incoming: &HeaderMap, upstream: &Url) -> HeaderMap {
    let extra = connection_tokens(incoming);
    let mut headers = HeaderMap::with_capacity(incoming.len());

    for (name, value) in incoming {
        if is_blocked(name, &[HOP_BY_HOP, FORWARDING, RELAY_SET_REQUEST], &extra) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let origin = upstream.origin().ascii_serialization();
    if let Some(host) = host_header(upstream).and_then(|h| HeaderValue::from_str(&h).ok()) {
        headers.insert(HOST, host);
    }
    if let Ok(value) = HeaderValue::from_str(&origin) {
        headers.insert(ORIGIN, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{}/", origin)) {
        headers.insert(REFERER, value);
    }

    headers
}

/// Builds the headers sent back to the browser.
///
/// Every `Set-Cookie` loses its `Domain` so the browser files it under the
/// relay's origin. With `cross_site` the cookie is also marked
/// `SameSite=None; Secure`, which browsers require for cross-site cookies but
/// which breaks plain-HTTP same-site deployments, hence opt-in.
pub fn rewrite_response_headers(
    upstream_headers: &HeaderMap,
    upstream: &Url,
    mount: &str,
    cross_site: bool,
) -> HeaderMap {
    let extra = connection_tokens(upstream_headers);
    let mut headers = HeaderMap::with_capacity(upstream_headers.len());

    for (name, value) in upstream_headers {
        if is_blocked(name, &[HOP_BY_HOP, RELAY_SET_RESPONSE], &extra) {
            continue;
        }

        let rewritten = if *name == SET_COOKIE {
            value
                .to_str()
                .ok()
                .map(|cookie| rewrite_set_cookie(cookie, cross_site))
        } else if *name == LOCATION {
            value
                .to_str()
                .ok()
                .and_then(|location| relative_location(location, upstream, mount))
        } else {
            None
        };

        match rewritten.and_then(|v| HeaderValue::from_str(&v).ok()) {
            Some(value) => headers.append(name.clone(), value),
            None => headers.append(name.clone(), value.clone()),
        };
    }

    headers
}

/// Drops the `Domain` attribute of a `Set-Cookie` value, and in cross-site
/// mode replaces `SameSite`/`Secure` with `SameSite=None; Secure`.
pub fn rewrite_set_cookie(cookie: &str, cross_site: bool) -> String {
    let mut parts = cookie.split(';');
    let mut rewritten = parts.next().unwrap_or_default().trim().to_string();

    for attr in parts {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        if let Some(caps) = COOKIE_ATTR_REGEX.captures(attr) {
            let name = caps[1].to_ascii_lowercase();
            if name == "domain" || cross_site {
                continue;
            }
        }
        rewritten.push_str("; ");
        rewritten.push_str(attr);
    }

    if cross_site {
        rewritten.push_str("; SameSite=None; Secure");
    }

    rewritten
}

/// Turns an absolute redirect to the ERP into a path on the relay. Returns
/// `None` for anything else (relative or foreign locations pass unchanged).
fn relative_location(location: &str, upstream: &Url, mount: &str) -> Option<String> {
    let target = Url::parse(location).ok()?;
    if target.origin() != upstream.origin() {
        return None;
    }

    let upstream_path = upstream.path();
    let path = match target.path().strip_prefix(upstream_path) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{}{}", mount, rest),
        _ => target.path().to_string(),
    };

    // A root mount maps the entry script itself to "/"
    let path = if path.is_empty() { "/".to_string() } else { path };

    let relative = match target.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    debug!(from = %location, to = %relative, "Rewrote upstream redirect");
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> Url {
        Url::parse("https://upstream.example.com/index.php").unwrap()
    }

    #[test]
    fn test_domain_is_stripped() {
        assert_eq!(
            rewrite_set_cookie("session=abc; Domain=upstream.example.com", false),
            "session=abc"
        );
        assert_eq!(
            rewrite_set_cookie("PHPSESSID=x; path=/; domain=.example.com; HttpOnly", false),
            "PHPSESSID=x; path=/; HttpOnly"
        );
    }

    #[test]
    fn test_cross_site_cookie() {
        assert_eq!(
            rewrite_set_cookie("_csrf=t; Path=/; Secure; SameSite=Lax; Domain=a.b", true),
            "_csrf=t; Path=/; SameSite=None; Secure"
        );
    }

    #[test]
    fn test_request_headers_filtered_and_rewritten() {
        let mut incoming = HeaderMap::new();
        incoming.insert("cookie", HeaderValue::from_static("PHPSESSID=x"));
        incoming.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        incoming.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        incoming.insert("accept-encoding", HeaderValue::from_static("gzip"));
        incoming.insert("content-length", HeaderValue::from_static("12"));
        incoming.insert("connection", HeaderValue::from_static("keep-alive, x-custom"));
        incoming.insert("x-custom", HeaderValue::from_static("1"));
        incoming.insert("host", HeaderValue::from_static("relay.local:3000"));
        incoming.insert("origin", HeaderValue::from_static("http://relay.local:3000"));

        let headers = forward_request_headers(&incoming, &upstream());

        assert_eq!(headers.get("cookie").unwrap(), "PHPSESSID=x");
        assert!(headers.get("x-forwarded-for").is_none());
        assert!(headers.get("x-real-ip").is_none());
        assert!(headers.get("accept-encoding").is_none());
        assert!(headers.get("content-length").is_none());
        assert!(headers.get("connection").is_none());
        assert!(headers.get("x-custom").is_none());
        assert_eq!(headers.get(HOST).unwrap(), "upstream.example.com");
        assert_eq!(headers.get(ORIGIN).unwrap(), "https://upstream.example.com");
        assert_eq!(headers.get(REFERER).unwrap(), "https://upstream.example.com/");
    }

    #[test]
    fn test_host_header_keeps_port() {
        let url = Url::parse("http://127.0.0.1:8080/index.php").unwrap();
        let headers = forward_request_headers(&HeaderMap::new(), &url);
        assert_eq!(headers.get(HOST).unwrap(), "127.0.0.1:8080");
    }

    #[test]
    fn test_response_headers_rewritten() {
        let mut upstream_headers = HeaderMap::new();
        upstream_headers.append(SET_COOKIE, HeaderValue::from_static("a=1; Domain=upstream.example.com"));
        upstream_headers.append(SET_COOKIE, HeaderValue::from_static("b=2; Path=/"));
        upstream_headers.insert("content-encoding", HeaderValue::from_static("gzip"));
        upstream_headers.insert("content-length", HeaderValue::from_static("100"));
        upstream_headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        upstream_headers.insert("content-type", HeaderValue::from_static("text/html"));
        upstream_headers.insert(
            LOCATION,
            HeaderValue::from_static("https://upstream.example.com/index.php?r=site%2Findex"),
        );

        let headers = rewrite_response_headers(&upstream_headers, &upstream(), "/erp", false);

        let cookies: Vec<_> = headers.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2; Path=/"]);
        assert!(headers.get("content-encoding").is_none());
        assert!(headers.get("content-length").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("content-type").unwrap(), "text/html");
        assert_eq!(headers.get(LOCATION).unwrap(), "/erp?r=site%2Findex");
    }

    #[test]
    fn test_root_mount_location_keeps_leading_slash() {
        assert_eq!(
            relative_location(
                "https://upstream.example.com/index.php?r=site%2Findex",
                &upstream(),
                ""
            ),
            Some("/?r=site%2Findex".to_string())
        );
        assert_eq!(
            relative_location("https://upstream.example.com/index.php/captcha", &upstream(), ""),
            Some("/captcha".to_string())
        );
    }

    #[test]
    fn test_foreign_location_untouched() {
        assert_eq!(
            relative_location("https://sso.example.org/login", &upstream(), "/index.php"),
            None
        );
        assert_eq!(
            relative_location("/index.php?r=site%2Flogin", &upstream(), "/index.php"),
            None
        );
    }
}
