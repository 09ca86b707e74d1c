//! Reading ERP pages: CSRF tokens, login result classification, profile info.
//!
//! Login success can only be detected negatively (the login form is gone), so
//! every markup assumption about the login page lives in [`LOGIN_RULES`].
//! Adapting to an upstream markup change should mean editing that table.

use crate::error::BridgeError;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static CSRF_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="csrf-token"]"#).unwrap());
static LOGIN_FORM_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#login-form").unwrap());
static NAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".profile_info h2, .user-profile").unwrap());
static IMAGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".profile_pic img, img.img-circle").unwrap());

/// Phrase Yii2 uses when it rejects a CSRF token.
const CSRF_REJECTION_TEXT: &str = "Unable to verify your data submission";

/// Decorative "required field" marker rendered with `.text-danger`.
const REQUIRED_MARKER: &str = "*";

/// Extracts the CSRF token from `<meta name="csrf-token">`.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&CSRF_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Returns true if the page carries the login form.
pub fn has_login_form(html: &str) -> bool {
    Html::parse_document(html)
        .select(&LOGIN_FORM_SELECTOR)
        .next()
        .is_some()
}

/// Returns true if an authenticated request ended up on the login page, i.e.
/// the ERP session is gone.
pub fn is_login_page(url: &str, html: &str) -> bool {
    let login_indicators = ["r=site%2Flogin", "r=site/login"];
    login_indicators.iter().any(|indicator| url.contains(indicator)) || has_login_form(html)
}

/// Result of submitting the login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    InvalidCredentials(String),
    InvalidCaptcha(String),
    CsrfExpired,
    /// Login form still present; carries a generic error message if one was shown
    Unknown(Option<String>),
}

impl LoginOutcome {
    /// Converts a failed outcome into the matching error.
    pub fn into_result(self, html_len: usize) -> Result<(), BridgeError> {
        match self {
            LoginOutcome::Authenticated => Ok(()),
            LoginOutcome::InvalidCredentials(message) => {
                Err(BridgeError::InvalidCredentials { message })
            }
            LoginOutcome::InvalidCaptcha(message) => Err(BridgeError::InvalidCaptcha { message }),
            LoginOutcome::CsrfExpired => Err(BridgeError::CsrfExpired),
            LoginOutcome::Unknown(message) => {
                Err(BridgeError::UnknownLoginFailure { message, html_len })
            }
        }
    }
}

/// How a rule looks at the response.
#[derive(Debug, Clone, Copy)]
enum Matcher {
    /// First element matching the selector with non-empty text (ignoring `*`)
    Text(&'static str),
    /// Bad Request status, or Yii's CSRF rejection phrase
    CsrfRejection,
    /// Any element matching the selector
    Present(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Verdict {
    InvalidCredentials,
    InvalidCaptcha,
    CsrfExpired,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct LoginRule {
    matcher: Matcher,
    verdict: Verdict,
}

/// Ordered, first match wins. No match means the login form is gone and we
/// landed on the dashboard.
const LOGIN_RULES: &[LoginRule] = &[
    LoginRule {
        matcher: Matcher::Text(".field-loginform-password .help-block"),
        verdict: Verdict::InvalidCredentials,
    },
    LoginRule {
        matcher: Matcher::Text(".field-loginFormCaptcha .help-block"),
        verdict: Verdict::InvalidCaptcha,
    },
    LoginRule {
        matcher: Matcher::Text(".field-loginform-captcha .help-block"),
        verdict: Verdict::InvalidCaptcha,
    },
    LoginRule {
        matcher: Matcher::CsrfRejection,
        verdict: Verdict::CsrfExpired,
    },
    LoginRule {
        matcher: Matcher::Text(".text-danger"),
        verdict: Verdict::Rejected,
    },
    LoginRule {
        matcher: Matcher::Present("#login-form"),
        verdict: Verdict::Rejected,
    },
];

/// Classifies the page returned by the login POST.
pub fn classify_login_response(status: u16, html: &str) -> LoginOutcome {
    let document = Html::parse_document(html);

    for rule in LOGIN_RULES {
        let matched: Option<Option<String>> = match rule.matcher {
            Matcher::Text(selector) => first_text(&document, selector).map(Some),
            Matcher::CsrfRejection => {
                (status == 400 || html.contains(CSRF_REJECTION_TEXT)).then_some(None)
            }
            Matcher::Present(selector) => Selector::parse(selector)
                .ok()
                .and_then(|sel| document.select(&sel).next().map(|_| None)),
        };

        if let Some(message) = matched {
            return match rule.verdict {
                Verdict::InvalidCredentials => {
                    LoginOutcome::InvalidCredentials(message.unwrap_or_default())
                }
                Verdict::InvalidCaptcha => LoginOutcome::InvalidCaptcha(message.unwrap_or_default()),
                Verdict::CsrfExpired => LoginOutcome::CsrfExpired,
                Verdict::Rejected => LoginOutcome::Unknown(message),
            };
        }
    }

    LoginOutcome::Authenticated
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty() && text != REQUIRED_MARKER)
}

/// Student details shown on the ERP dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub name: String,
    pub image: String,
}

impl Default for StudentProfile {
    fn default() -> Self {
        Self {
            name: "Student".to_string(),
            image: "/assets/default-user.png".to_string(),
        }
    }
}

/// Reads the student's name and avatar from the dashboard, falling back to
/// placeholders for whatever is missing.
pub fn parse_student_profile(html: &str) -> StudentProfile {
    let document = Html::parse_document(html);
    let mut profile = StudentProfile::default();

    if let Some(name) = document
        .select(&NAME_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
    {
        profile.name = name;
    }

    if let Some(src) = document
        .select(&IMAGE_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("src"))
        .filter(|src| !src.is_empty())
    {
        profile.image = src.to_string();
    }

    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"<html><head><meta name="csrf-token" content="tok-1"></head>
        <body><form id="login-form">
        <div class="field-loginform-username"><label>User <span class="text-danger">*</span></label><div class="help-block"></div></div>
        <div class="field-loginform-password"><div class="help-block"></div></div>
        <div class="field-loginFormCaptcha"><div class="help-block"></div></div>
        </form></body></html>"#;

    #[test]
    fn test_extract_csrf_token() {
        assert_eq!(extract_csrf_token(LOGIN_PAGE), Some("tok-1".to_string()));
        assert_eq!(extract_csrf_token("<html></html>"), None);
        assert_eq!(
            extract_csrf_token(r#"<meta name="csrf-token" content="  ">"#),
            None
        );
    }

    #[test]
    fn test_invalid_password_message_is_kept() {
        let html = r#"<form id="login-form"><div class="field-loginform-password"><div class="help-block">Invalid username or password.</div></div></form>"#;
        assert_eq!(
            classify_login_response(200, html),
            LoginOutcome::InvalidCredentials("Invalid username or password.".to_string())
        );
    }

    #[test]
    fn test_password_error_wins_over_captcha_error() {
        let html = r#"<form id="login-form">
            <div class="field-loginform-password"><div class="help-block">Bad password</div></div>
            <div class="field-loginFormCaptcha"><div class="help-block">The verification code is incorrect.</div></div>
            </form>"#;
        assert!(matches!(
            classify_login_response(200, html),
            LoginOutcome::InvalidCredentials(_)
        ));
    }

    #[test]
    fn test_invalid_captcha() {
        let html = r#"<form id="login-form"><div class="field-loginFormCaptcha"><div class="help-block">The verification code is incorrect.</div></div></form>"#;
        assert_eq!(
            classify_login_response(200, html),
            LoginOutcome::InvalidCaptcha("The verification code is incorrect.".to_string())
        );
    }

    #[test]
    fn test_lone_asterisk_is_not_an_error() {
        assert_eq!(
            classify_login_response(200, LOGIN_PAGE),
            LoginOutcome::Unknown(None)
        );
    }

    #[test]
    fn test_generic_error_block() {
        let html = r#"<form id="login-form"><span class="text-danger">*</span><p class="text-danger">Account locked</p></form>"#;
        assert_eq!(
            classify_login_response(200, html),
            LoginOutcome::Unknown(Some("Account locked".to_string()))
        );
    }

    #[test]
    fn test_csrf_rejection() {
        let html = "<h1>Bad Request (#400)</h1><p>Unable to verify your data submission.</p>";
        assert_eq!(classify_login_response(400, html), LoginOutcome::CsrfExpired);
    }

    #[test]
    fn test_dashboard_is_success() {
        let html = r#"<html><head><meta name="csrf-token" content="tok-2"></head><body><div class="profile_info"><h2>Jane Doe</h2></div></body></html>"#;
        assert_eq!(classify_login_response(200, html), LoginOutcome::Authenticated);
        assert!(!has_login_form(html));
    }

    #[test]
    fn test_is_login_page() {
        assert!(is_login_page(
            "https://erp.example/index.php?r=site%2Flogin",
            "<html></html>"
        ));
        assert!(is_login_page("https://erp.example/index.php", LOGIN_PAGE));
        assert!(!is_login_page(
            "https://erp.example/index.php?r=site%2Findex",
            "<table></table>"
        ));
    }

    #[test]
    fn test_outcome_into_result() {
        let err = LoginOutcome::Unknown(None).into_result(1234).unwrap_err();
        assert_eq!(
            err,
            BridgeError::UnknownLoginFailure {
                message: None,
                html_len: 1234
            }
        );
        assert!(LoginOutcome::Authenticated.into_result(0).is_ok());
    }

    #[test]
    fn test_parse_student_profile() {
        let html = r#"<div class="profile_pic"><img src="/img/u.png"></div><div class="profile_info"><h2> Jane Doe </h2></div>"#;
        let profile = parse_student_profile(html);
        assert_eq!(profile.name, "Jane Doe");
        assert_eq!(profile.image, "/img/u.png");

        assert_eq!(parse_student_profile("<p></p>"), StudentProfile::default());
    }
}
