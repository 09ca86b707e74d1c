//! HTTP client for ERP operations.
//!
//! Wraps a cookie-keeping `reqwest` client. The ERP is a Yii2 application, so
//! every page is `index.php?r=<route>`; session cookies set on any response
//! (including the 302 after login) are kept by the cookie store and sent back
//! automatically.

use super::session::CaptchaChallenge;
use crate::attendance::academic::TermSelection;
use crate::error::BridgeError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Base URL of the KL University ERP.
const ERP_BASE_URL: &str = "https://newerp.kluniversity.in/index.php";

/// Routes for the ERP endpoints (value of the `r` query parameter).
const LOGIN_ROUTE: &str = "site/login";
const LOGOUT_ROUTE: &str = "site/logout";
const CAPTCHA_ROUTE: &str = "site/captcha";
const COURSE_LIST_ROUTE: &str = "studentattendance/studentdailyattendance/courselist";

/// Configuration for the ERP client.
#[derive(Debug, Clone)]
pub struct ErpConfig {
    /// The ERP's `index.php`, or the relay's mount point in front of it
    pub base_url: String,
    pub login_route: String,
    pub logout_route: String,
    pub captcha_route: String,
    pub course_list_route: String,
    /// User agent string
    pub user_agent: String,
    /// Overrides the transport's default request timeout
    pub timeout: Option<Duration>,
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            base_url: ERP_BASE_URL.to_string(),
            login_route: LOGIN_ROUTE.to_string(),
            logout_route: LOGOUT_ROUTE.to_string(),
            captcha_route: CAPTCHA_ROUTE.to_string(),
            course_list_route: COURSE_LIST_ROUTE.to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout: None,
        }
    }
}

impl ErpConfig {
    /// Default configuration pointed at a different base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// Credentials for one login attempt.
#[derive(Clone)]
pub struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub captcha: &'a str,
}

impl std::fmt::Debug for LoginForm<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("captcha", &"<redacted>")
            .finish()
    }
}

/// A page returned by the ERP.
#[derive(Debug, Clone)]
pub struct ErpPage {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    pub html: String,
}

/// Client for the ERP's login and attendance pages.
pub struct ErpClient {
    client: Client,
    config: ErpConfig,
}

impl ErpClient {
    /// Creates a new ERP client with default configuration.
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_config(ErpConfig::default())
    }

    /// Creates a new client with custom configuration.
    pub fn with_config(config: ErpConfig) -> Result<Self, BridgeError> {
        Url::parse(&config.base_url)?;

        let mut builder = Client::builder()
            .cookie_store(true)
            .redirect(Policy::limited(10))
            .user_agent(&config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| BridgeError::UpstreamUnavailable {
            message: format!("Failed to build HTTP client: {}", e),
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ErpConfig {
        &self.config
    }

    /// Builds `base_url?r=<route>` plus any extra query pairs.
    fn route_url(&self, route: &str, extra: &[(&str, &str)]) -> Result<Url, BridgeError> {
        let mut url = Url::parse(&self.config.base_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("r", route);
            for (key, value) in extra {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fetches the login page (which carries the CSRF meta tag).
    pub async fn fetch_login_page(&self, correlation_id: &str) -> Result<ErpPage, BridgeError> {
        let url = self.route_url(&self.config.login_route, &[])?;
        info!(correlation_id = %correlation_id, url = %url, "Fetching login page");

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response.text().await?;

        debug!(correlation_id = %correlation_id, status, html_len = html.len(), "Login page received");
        Ok(ErpPage {
            status,
            url: final_url,
            html,
        })
    }

    /// Fetches a fresh captcha image. The random `v` parameter defeats caching,
    /// which would otherwise hand back an image for an already used answer.
    pub async fn fetch_captcha(&self, correlation_id: &str) -> Result<CaptchaChallenge, BridgeError> {
        let buster = cache_buster();
        let url = self.route_url(&self.config.captcha_route, &[("v", buster.as_str())])?;
        info!(correlation_id = %correlation_id, "Fetching captcha");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::UnexpectedResponse {
                message: format!("captcha returned status {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let image = response.bytes().await?.to_vec();

        if image.is_empty() {
            return Err(BridgeError::UnexpectedResponse {
                message: "captcha image was empty".to_string(),
            });
        }

        Ok(CaptchaChallenge {
            image,
            content_type,
        })
    }

    /// Posts the login form. Redirects are followed, so a successful login
    /// returns the dashboard.
    pub async fn submit_login(
        &self,
        form: &LoginForm<'_>,
        csrf_token: &str,
        correlation_id: &str,
    ) -> Result<ErpPage, BridgeError> {
        let url = self.route_url(&self.config.login_route, &[])?;
        info!(correlation_id = %correlation_id, "Submitting login form");

        let response = self
            .client
            .post(url)
            .form(&[
                ("_csrf", csrf_token),
                ("LoginForm[username]", form.username),
                ("LoginForm[password]", form.password),
                ("LoginForm[rememberMe]", "0"),
                ("LoginForm[captcha]", form.captcha),
                ("login-button", ""),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response.text().await?;
        debug!(correlation_id = %correlation_id, status, html_len = html.len(), "Login response received");

        Ok(ErpPage {
            status,
            url: final_url,
            html,
        })
    }

    /// Tells the ERP to end the session.
    pub async fn submit_logout(&self, csrf_token: &str, correlation_id: &str) -> Result<(), BridgeError> {
        let url = self.route_url(&self.config.logout_route, &[])?;
        info!(correlation_id = %correlation_id, "Submitting logout");

        let response = self
            .client
            .post(url)
            .form(&[("_csrf", csrf_token)])
            .send()
            .await?;

        if !response.status().is_success() && !response.status().is_redirection() {
            warn!(
                correlation_id = %correlation_id,
                status = response.status().as_u16(),
                "Logout returned unexpected status"
            );
            return Err(BridgeError::UnexpectedResponse {
                message: format!("logout returned status {}", response.status()),
            });
        }

        Ok(())
    }

    /// Requests the attendance course list for a term.
    ///
    /// Marked as an AJAX request so Yii returns just the table fragment.
    pub async fn fetch_course_list(
        &self,
        term: &TermSelection,
        csrf_token: &str,
        correlation_id: &str,
    ) -> Result<ErpPage, BridgeError> {
        let url = self.route_url(&self.config.course_list_route, &[])?;
        info!(
            correlation_id = %correlation_id,
            year = %term.year,
            year_id = term.year_id,
            semester = %term.semester,
            semester_id = term.semester_id,
            "Fetching attendance course list"
        );

        let year_id = term.year_id.to_string();
        let semester_id = term.semester_id.to_string();
        let response = self
            .client
            .post(url)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-CSRF-Token", csrf_token)
            .form(&[
                ("_csrf", csrf_token),
                ("DynamicModel[academicyear]", year_id.as_str()),
                ("DynamicModel[semesterid]", semester_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let html = response.text().await?;
        info!(correlation_id = %correlation_id, html_len = html.len(), "Course list received");

        if !status.is_success() {
            return Err(BridgeError::UnexpectedResponse {
                message: format!("course list returned status {}", status),
            });
        }

        Ok(ErpPage {
            status: status.as_u16(),
            url: final_url,
            html,
        })
    }
}

fn cache_buster() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Generates a unique correlation ID for request tracing.
pub(crate) fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_url_encodes_route() {
        let client = ErpClient::new().unwrap();
        let url = client.route_url(LOGIN_ROUTE, &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://newerp.kluniversity.in/index.php?r=site%2Flogin"
        );

        let url = client
            .route_url(COURSE_LIST_ROUTE, &[("v", "abc")])
            .unwrap();
        assert_eq!(
            url.query(),
            Some("r=studentattendance%2Fstudentdailyattendance%2Fcourselist&v=abc")
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(ErpClient::with_config(ErpConfig::with_base_url("not a url")).is_err());
    }

    #[test]
    fn test_login_form_debug_redacts_secrets() {
        let form = LoginForm {
            username: "2300031234",
            password: "hunter2",
            captcha: "abcde",
        };
        let rendered = format!("{:?}", form);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("abcde"));
    }

    #[test]
    fn test_cache_buster_varies() {
        assert_eq!(cache_buster().len(), 8);
        assert_ne!(cache_buster(), cache_buster());
    }
}
