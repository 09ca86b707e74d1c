//! Session state machine for one ERP connection.
//!
//! ```text
//! Init --token--> TokenAcquired --captcha--> CaptchaReady --login--> Authenticated
//!                      ^                          |                      |
//!                      +----- failed login -------+        logout/expiry -> Init
//! ```
//!
//! Every request that changes state takes a ticket (the current generation)
//! when it starts and can only apply its result if no newer request has
//! started since. A slow, stale response is dropped instead of overwriting
//! fresher state.

use crate::error::BridgeError;

/// A captcha image issued by the ERP for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub image: Vec<u8>,
    pub content_type: Option<String>,
}

/// Where a session is in the login handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Init,
    TokenAcquired {
        csrf_token: String,
    },
    CaptchaReady {
        csrf_token: String,
        captcha: CaptchaChallenge,
    },
    Authenticated {
        csrf_token: String,
        dashboard_html: String,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Init => "Init",
            SessionState::TokenAcquired { .. } => "TokenAcquired",
            SessionState::CaptchaReady { .. } => "CaptchaReady",
            SessionState::Authenticated { .. } => "Authenticated",
        }
    }

    pub fn csrf_token(&self) -> Option<&str> {
        match self {
            SessionState::Init => None,
            SessionState::TokenAcquired { csrf_token }
            | SessionState::CaptchaReady { csrf_token, .. }
            | SessionState::Authenticated { csrf_token, .. } => Some(csrf_token),
        }
    }

    /// Dashboard HTML of an authenticated session.
    pub fn dashboard_html(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { dashboard_html, .. } => Some(dashboard_html),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

/// Proof that a request was started at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// One ERP session: its state plus the request generation counter.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Starts a new request, invalidating any request still in flight.
    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        Ticket(self.generation)
    }

    fn check(&self, ticket: Ticket) -> Result<(), BridgeError> {
        if ticket.0 == self.generation {
            Ok(())
        } else {
            Err(BridgeError::Superseded)
        }
    }

    /// A CSRF token was read from the login page. Any captcha tied to the old
    /// token is dropped.
    pub fn token_acquired(&mut self, ticket: Ticket, csrf_token: String) -> Result<(), BridgeError> {
        self.check(ticket)?;
        self.state = SessionState::TokenAcquired { csrf_token };
        Ok(())
    }

    /// Token to use for a captcha request. Valid once a token is known and
    /// before login has succeeded.
    pub fn captcha_token(&self) -> Result<String, BridgeError> {
        match &self.state {
            SessionState::TokenAcquired { csrf_token }
            | SessionState::CaptchaReady { csrf_token, .. } => Ok(csrf_token.clone()),
            other => Err(BridgeError::InvalidState {
                expected: "TokenAcquired",
                actual: other.name(),
            }),
        }
    }

    /// A fresh captcha arrived. Replaces whatever captcha was showing.
    pub fn captcha_ready(
        &mut self,
        ticket: Ticket,
        captcha: CaptchaChallenge,
    ) -> Result<(), BridgeError> {
        self.check(ticket)?;
        let csrf_token = self.captcha_token()?;
        self.state = SessionState::CaptchaReady {
            csrf_token,
            captcha,
        };
        Ok(())
    }

    /// Takes the token for a login attempt. The captcha is consumed: whatever
    /// happens, it can't be submitted again.
    pub fn start_login(&mut self) -> Result<(Ticket, String), BridgeError> {
        let csrf_token = match &self.state {
            SessionState::CaptchaReady { csrf_token, .. } => csrf_token.clone(),
            other => {
                return Err(BridgeError::InvalidState {
                    expected: "CaptchaReady",
                    actual: other.name(),
                })
            }
        };

        self.state = SessionState::TokenAcquired {
            csrf_token: csrf_token.clone(),
        };
        Ok((self.begin(), csrf_token))
    }

    /// Login succeeded. The dashboard's own token replaces the login page's
    /// when it has one.
    pub fn authenticated(
        &mut self,
        ticket: Ticket,
        csrf_token: String,
        dashboard_html: String,
    ) -> Result<(), BridgeError> {
        self.check(ticket)?;
        self.state = SessionState::Authenticated {
            csrf_token,
            dashboard_html,
        };
        Ok(())
    }

    /// Restores a session from a previously saved dashboard.
    pub fn restore(&mut self, csrf_token: String, dashboard_html: String) {
        self.begin();
        self.state = SessionState::Authenticated {
            csrf_token,
            dashboard_html,
        };
    }

    /// Logout or expiry. Returns the previous state so the caller can still
    /// use its token to end the server-side session.
    pub fn reset(&mut self) -> SessionState {
        self.begin();
        std::mem::take(&mut self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captcha() -> CaptchaChallenge {
        CaptchaChallenge {
            image: vec![0x89, 0x50],
            content_type: Some("image/png".to_string()),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut session = Session::new();
        assert_eq!(session.state().name(), "Init");

        let t = session.begin();
        session.token_acquired(t, "tok".to_string()).unwrap();
        assert_eq!(session.state().name(), "TokenAcquired");

        let t = session.begin();
        session.captcha_ready(t, captcha()).unwrap();
        assert_eq!(session.state().name(), "CaptchaReady");

        let (t, token) = session.start_login().unwrap();
        assert_eq!(token, "tok");
        session
            .authenticated(t, "dash-tok".to_string(), "<html></html>".to_string())
            .unwrap();
        assert!(session.state().is_authenticated());
        assert_eq!(session.state().csrf_token(), Some("dash-tok"));
    }

    #[test]
    fn test_stale_captcha_is_dropped() {
        let mut session = Session::new();
        let t = session.begin();
        session.token_acquired(t, "tok".to_string()).unwrap();

        let slow = session.begin();
        let fast = session.begin();
        session.captcha_ready(fast, captcha()).unwrap();
        assert_eq!(
            session.captcha_ready(slow, captcha()),
            Err(BridgeError::Superseded)
        );
    }

    #[test]
    fn test_login_consumes_captcha() {
        let mut session = Session::new();
        let t = session.begin();
        session.token_acquired(t, "tok".to_string()).unwrap();
        let t = session.begin();
        session.captcha_ready(t, captcha()).unwrap();

        session.start_login().unwrap();
        assert_eq!(session.state().name(), "TokenAcquired");
        assert!(matches!(
            session.start_login(),
            Err(BridgeError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_login_requires_captcha() {
        let mut session = Session::new();
        assert_eq!(
            session.start_login(),
            Err(BridgeError::InvalidState {
                expected: "CaptchaReady",
                actual: "Init"
            })
        );
    }

    #[test]
    fn test_reset_returns_previous_state() {
        let mut session = Session::new();
        session.restore("tok".to_string(), "<html></html>".to_string());

        let previous = session.reset();
        assert_eq!(previous.csrf_token(), Some("tok"));
        assert_eq!(session.state(), &SessionState::Init);
    }

    #[test]
    fn test_reset_invalidates_in_flight_login() {
        let mut session = Session::new();
        let t = session.begin();
        session.token_acquired(t, "tok".to_string()).unwrap();
        let t = session.begin();
        session.captcha_ready(t, captcha()).unwrap();

        let (ticket, _) = session.start_login().unwrap();
        session.reset();
        assert_eq!(
            session.authenticated(ticket, "tok".to_string(), String::new()),
            Err(BridgeError::Superseded)
        );
    }
}
