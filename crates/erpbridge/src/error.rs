//! Error types for the ERP bridge.

use thiserror::Error;

/// Errors that can occur while talking to the ERP or interpreting its pages.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    /// The ERP rejected the username/password
    #[error("{message}")]
    InvalidCredentials { message: String },

    /// The ERP rejected the captcha answer
    #[error("Invalid captcha: {message}")]
    InvalidCaptcha { message: String },

    /// The login page came back without an error we recognize
    #[error("Login failed. Please check your credentials.")]
    UnknownLoginFailure {
        message: Option<String>,
        html_len: usize,
    },

    /// The ERP no longer accepts the CSRF token
    #[error("CSRF token expired, a new token was requested")]
    CsrfExpired,

    /// The attendance page had no rows we could parse
    #[error("Failed to find any subjects in table (html length: {html_len})")]
    NoDataFound { html_len: usize },

    /// Year/semester combination isn't in the mapping table
    #[error("Invalid year ({year}) or semester ({semester}) selected")]
    InvalidSelection { year: String, semester: String },

    /// Network/transport failure reaching the ERP
    #[error("ERP unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// The ERP sent us back to the login form
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Another login attempt is still pending for this session
    #[error("A login attempt is already in progress")]
    LoginInProgress,

    /// A newer request replaced this one before it finished
    #[error("Request was superseded by a newer one")]
    Superseded,

    /// The operation isn't valid in the session's current state
    #[error("Expected session state {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// No CSRF token could be found in the page
    #[error("No CSRF token found in page")]
    MissingCsrfToken,

    /// The ERP answered with something we can't use
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// Reading or writing client state failed
    #[error("Client store error: {message}")]
    Store { message: String },
}

impl BridgeError {
    /// Returns true if the user can fix this by re-entering something.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidCredentials { .. }
                | BridgeError::InvalidCaptcha { .. }
                | BridgeError::UnknownLoginFailure { .. }
                | BridgeError::CsrfExpired
                | BridgeError::InvalidSelection { .. }
        )
    }

    /// Returns true if this error is potentially transient and retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::UpstreamUnavailable { .. } | BridgeError::UnexpectedResponse { .. }
        )
    }

    /// Returns true if the session has to be re-established.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            BridgeError::SessionExpired | BridgeError::MissingCsrfToken
        )
    }

    /// Returns true for login failures, after which the captcha must be replaced.
    pub fn is_login_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidCredentials { .. }
                | BridgeError::InvalidCaptcha { .. }
                | BridgeError::UnknownLoginFailure { .. }
                | BridgeError::CsrfExpired
        )
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::UpstreamUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        BridgeError::UnexpectedResponse {
            message: format!("invalid URL: {}", err),
        }
    }
}

impl From<rusqlite::Error> for BridgeError {
    fn from(err: rusqlite::Error) -> Self {
        BridgeError::Store {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Store {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_message_is_verbatim() {
        let err = BridgeError::InvalidCredentials {
            message: "Invalid username or password.".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid username or password.");
        assert!(err.is_user_actionable());
        assert!(err.is_login_failure());
    }

    #[test]
    fn test_classification_helpers() {
        let upstream = BridgeError::UpstreamUnavailable {
            message: "connection refused".to_string(),
        };
        assert!(upstream.is_retryable());
        assert!(!upstream.is_user_actionable());

        assert!(BridgeError::SessionExpired.needs_reauth());
        assert!(!BridgeError::NoDataFound { html_len: 10 }.is_retryable());
    }
}
