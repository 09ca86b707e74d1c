//! Stateless reverse proxy in front of the ERP.
//!
//! The browser talks to the relay as if it were the ERP. The relay keeps no
//! cookies of its own; the browser's session cookies pass through in both
//! directions, re-scoped to the relay's origin.

mod headers;

pub use headers::{forward_request_headers, rewrite_response_headers, rewrite_set_cookie};

use crate::server::types::ApiErrorType;
use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

/// Where and how the relay forwards.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Full URL of the ERP entry script, e.g. `https://host/index.php`
    pub upstream: Url,
    /// Path the relay is mounted at
    pub mount: String,
    /// Mark relayed cookies `SameSite=None; Secure`
    pub cross_site_cookies: bool,
    /// Largest request body accepted, in bytes
    pub body_limit: usize,
    pub timeout: Option<Duration>,
}

pub struct Relay {
    client: Client,
    config: RelayConfig,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            // Redirects go back to the browser, which follows them through the relay
            .redirect(Policy::none())
            .gzip(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Maps a request path under the mount onto the upstream URL.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Url {
        let rest = path.strip_prefix(self.config.mount.as_str()).unwrap_or(path);

        let mut url = self.config.upstream.clone();
        if !rest.is_empty() && rest != "/" {
            let joined = format!("{}{}", url.path().trim_end_matches('/'), rest);
            url.set_path(&joined);
        }
        url.set_query(query.filter(|q| !q.is_empty()));
        url
    }

    /// Forwards one request and streams the upstream response back.
    pub async fn forward(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let target = self.upstream_url(parts.uri.path(), parts.uri.query());

        let body = match to_bytes(body, self.config.body_limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, limit = self.config.body_limit, "Rejected relay request body");
                return ApiErrorType::from((
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "Request body too large",
                    Some(e.to_string()),
                ))
                .into_response();
            }
        };

        let headers = forward_request_headers(&parts.headers, &self.config.upstream);
        let mut upstream_request = self
            .client
            .request(parts.method.clone(), target.clone())
            .headers(headers);
        if !(body.is_empty() && matches!(parts.method, Method::GET | Method::HEAD)) {
            upstream_request = upstream_request.body(body);
        }

        let upstream = match upstream_request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(method = %parts.method, url = %target, error = %e, "Relay request failed");
                return ApiErrorType::from((
                    StatusCode::BAD_GATEWAY,
                    "Failed to communicate with ERP",
                    Some(e.to_string()),
                ))
                .into_response();
            }
        };

        let status = upstream.status();
        debug!(method = %parts.method, url = %target, status = status.as_u16(), "Relayed request");

        let headers = rewrite_response_headers(
            upstream.headers(),
            &self.config.upstream,
            &self.config.mount,
            self.config.cross_site_cookies,
        );

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
