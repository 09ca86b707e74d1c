//! The session bridge: drives the login handshake and attendance fetches for
//! one ERP session and keeps the client store in sync.

use super::client::{generate_correlation_id, ErpClient, ErpPage, LoginForm};
use super::pages::{
    classify_login_response, extract_csrf_token, has_login_form, is_login_page,
    parse_student_profile, StudentProfile,
};
use super::session::{CaptchaChallenge, Session, SessionState, Ticket};
use crate::attendance::academic::TermSelection;
use crate::attendance::weighting::WeightTable;
use crate::attendance::{extract_subjects, AttendanceReport};
use crate::error::BridgeError;
use crate::store::{ClientStore, StoreKey};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Bridge between the dashboard and one ERP session.
///
/// The session state is only locked briefly around transitions, never across
/// a network call, so a newer captcha request can overtake an older one.
pub struct ErpBridge {
    client: ErpClient,
    session: Mutex<Session>,
    store: Arc<dyn ClientStore>,
    weights: WeightTable,
    remember_username: bool,
    login_in_flight: AtomicBool,
}

/// Clears the in-flight login flag when the attempt ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ErpBridge {
    pub fn new(client: ErpClient, store: Arc<dyn ClientStore>, weights: WeightTable) -> Self {
        Self {
            client,
            session: Mutex::new(Session::new()),
            store,
            weights,
            remember_username: false,
            login_in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a successful login should save the username for next time.
    pub fn remember_username(mut self, remember: bool) -> Self {
        self.remember_username = remember;
        self
    }

    /// Snapshot of the current session state.
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state().clone()
    }

    /// Fetches the login page and takes its CSRF token (`Init` -> `TokenAcquired`).
    pub async fn start(&self) -> Result<(), BridgeError> {
        let correlation_id = generate_correlation_id();
        let ticket = self.session.lock().await.begin();

        let page = self.client.fetch_login_page(&correlation_id).await?;
        let csrf_token = extract_csrf_token(&page.html).ok_or_else(|| {
            warn!(
                correlation_id = %correlation_id,
                html_len = page.html.len(),
                "Login page has no CSRF token"
            );
            BridgeError::MissingCsrfToken
        })?;

        self.session.lock().await.token_acquired(ticket, csrf_token)?;
        info!(correlation_id = %correlation_id, "CSRF token acquired");
        Ok(())
    }

    /// Replaces the current captcha with a fresh one, acquiring a token first
    /// if the session has none. If a newer refresh starts before this one
    /// finishes, this one returns [`BridgeError::Superseded`].
    pub async fn refresh_captcha(&self) -> Result<CaptchaChallenge, BridgeError> {
        if matches!(self.state().await, SessionState::Init) {
            self.start().await?;
        }

        let correlation_id = generate_correlation_id();
        let ticket = {
            let mut session = self.session.lock().await;
            session.captcha_token()?;
            session.begin()
        };

        let captcha = self.client.fetch_captcha(&correlation_id).await?;
        self.session
            .lock()
            .await
            .captcha_ready(ticket, captcha.clone())?;

        debug!(
            correlation_id = %correlation_id,
            bytes = captcha.image.len(),
            "Captcha ready"
        );
        Ok(captcha)
    }

    /// Submits credentials with the current captcha.
    ///
    /// # Returns
    /// * `Ok(String)` - The dashboard HTML
    /// * `Err(BridgeError)` - `InvalidCredentials`, `InvalidCaptcha`,
    ///   `UnknownLoginFailure` or `CsrfExpired`, after which a fresh captcha
    ///   has already been requested; or `LoginInProgress` if another attempt
    ///   is pending
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        captcha_guess: &str,
    ) -> Result<String, BridgeError> {
        if self
            .login_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejecting concurrent login attempt");
            return Err(BridgeError::LoginInProgress);
        }
        let _in_flight = InFlight(&self.login_in_flight);

        let correlation_id = generate_correlation_id();
        let user = user_fingerprint(username);
        let (ticket, csrf_token) = self.session.lock().await.start_login()?;

        info!(correlation_id = %correlation_id, user = %user, "Starting ERP login");

        let form = LoginForm {
            username,
            password,
            captcha: captcha_guess,
        };
        let page = match self.client.submit_login(&form, &csrf_token, &correlation_id).await {
            Ok(page) => page,
            Err(e) => {
                error!(correlation_id = %correlation_id, error = %e, "Login request failed");
                self.recover_after_failure(&correlation_id, false).await;
                return Err(e);
            }
        };

        let html_len = page.html.len();
        let outcome = classify_login_response(page.status, &page.html);

        if let Err(e) = outcome.into_result(html_len) {
            match &e {
                BridgeError::UnknownLoginFailure { .. } => warn!(
                    correlation_id = %correlation_id,
                    user = %user,
                    html_len,
                    "Login page returned without a recognized error"
                ),
                _ => info!(
                    correlation_id = %correlation_id,
                    user = %user,
                    error = %e,
                    "Login rejected"
                ),
            }

            let token_expired = matches!(e, BridgeError::CsrfExpired);
            self.recover_after_failure(&correlation_id, token_expired)
                .await;
            return Err(e);
        }

        let dashboard_html = self
            .complete_login(ticket, csrf_token, page, username)
            .await?;
        info!(correlation_id = %correlation_id, user = %user, "ERP login succeeded");
        Ok(dashboard_html)
    }

    async fn complete_login(
        &self,
        ticket: Ticket,
        login_token: String,
        page: ErpPage,
        username: &str,
    ) -> Result<String, BridgeError> {
        let html = page.html;
        let csrf_token = extract_csrf_token(&html).unwrap_or(login_token);

        self.session
            .lock()
            .await
            .authenticated(ticket, csrf_token, html.clone())?;

        self.store.set(StoreKey::DashboardHtml, &html)?;
        // A previous user's attendance must not show up for this one
        self.store.remove(StoreKey::SubjectSnapshot)?;
        if self.remember_username {
            self.store.set(StoreKey::RememberedUsername, username)?;
        } else {
            self.store.remove(StoreKey::RememberedUsername)?;
        }

        Ok(html)
    }

    /// After a failed login the old captcha is useless. Fetch a new one (and a
    /// new token first if the old one was rejected). Failures here are logged
    /// only; the login error is what the user needs to see.
    async fn recover_after_failure(&self, correlation_id: &str, refetch_token: bool) {
        // Logged out while the attempt was in flight
        if matches!(self.state().await, SessionState::Init) {
            return;
        }

        if refetch_token {
            if let Err(e) = self.start().await {
                warn!(correlation_id = %correlation_id, error = %e, "Failed to refetch CSRF token");
                return;
            }
        }

        if let Err(e) = self.refresh_captcha().await {
            warn!(correlation_id = %correlation_id, error = %e, "Failed to refresh captcha after login failure");
        }
    }

    /// Ends the session locally and on the ERP.
    ///
    /// Local state is cleared first. The ERP logout is attempted whenever a
    /// token is known, even if clearing the store failed; skipping it leaves
    /// a live server session that makes the next login misbehave. A store
    /// error is returned after the ERP logout has been tried.
    pub async fn logout(&self) -> Result<(), BridgeError> {
        let correlation_id = generate_correlation_id();
        let previous = self.session.lock().await.reset();

        let csrf_token = match previous {
            SessionState::Authenticated { csrf_token, .. } => Some(csrf_token),
            _ => match self.store.get(StoreKey::DashboardHtml) {
                Ok(html) => html.and_then(|html| extract_csrf_token(&html)),
                Err(e) => {
                    warn!(correlation_id = %correlation_id, error = %e, "Failed to read saved dashboard");
                    None
                }
            },
        };

        let cleared = self.clear_session_data();
        if let Err(e) = &cleared {
            error!(correlation_id = %correlation_id, error = %e, "Failed to clear session data");
        }

        match csrf_token {
            Some(token) => {
                self.client.submit_logout(&token, &correlation_id).await?;
                info!(correlation_id = %correlation_id, "ERP session destroyed");
            }
            None => {
                debug!(correlation_id = %correlation_id, "No CSRF token known, skipping ERP logout");
            }
        }

        cleared
    }

    /// Restores an authenticated session from the saved dashboard, e.g. after
    /// a restart. Returns false if there is nothing usable to restore.
    pub async fn resume(&self) -> Result<bool, BridgeError> {
        let Some(html) = self.store.get(StoreKey::DashboardHtml)? else {
            return Ok(false);
        };
        if has_login_form(&html) {
            return Ok(false);
        }
        let Some(csrf_token) = extract_csrf_token(&html) else {
            return Ok(false);
        };

        self.session.lock().await.restore(csrf_token, html);
        info!("Resumed ERP session from saved dashboard");
        Ok(true)
    }

    /// Fetches and parses attendance for an academic year and semester.
    pub async fn fetch_attendance(
        &self,
        year: &str,
        semester: &str,
    ) -> Result<AttendanceReport, BridgeError> {
        let term = TermSelection::resolve(year, semester)?;
        let correlation_id = generate_correlation_id();

        let csrf_token = match self.session.lock().await.state() {
            SessionState::Authenticated { csrf_token, .. } => csrf_token.clone(),
            other => {
                return Err(BridgeError::InvalidState {
                    expected: "Authenticated",
                    actual: other.name(),
                })
            }
        };

        let page = self
            .client
            .fetch_course_list(&term, &csrf_token, &correlation_id)
            .await?;

        if is_login_page(&page.url, &page.html) {
            warn!(correlation_id = %correlation_id, "Redirected to login, session expired");
            self.expire().await?;
            return Err(BridgeError::SessionExpired);
        }

        let subjects = extract_subjects(&page.html, &self.weights)?;
        let report = AttendanceReport {
            year: term.year,
            semester: term.semester,
            fetched_at: chrono::Utc::now(),
            subjects,
        };

        self.store
            .set(StoreKey::SubjectSnapshot, &serde_json::to_string(&report)?)?;
        Ok(report)
    }

    /// The last attendance report saved by [`fetch_attendance`](Self::fetch_attendance).
    pub fn last_report(&self) -> Result<Option<AttendanceReport>, BridgeError> {
        match self.store.get(StoreKey::SubjectSnapshot)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Username saved by the last login, if remembering was enabled.
    pub fn remembered_username(&self) -> Result<Option<String>, BridgeError> {
        self.store.get(StoreKey::RememberedUsername)
    }

    /// Student name and avatar from the current (or saved) dashboard.
    pub async fn profile(&self) -> Result<Option<StudentProfile>, BridgeError> {
        if let Some(html) = self.state().await.dashboard_html() {
            return Ok(Some(parse_student_profile(html)));
        }
        Ok(self
            .store
            .get(StoreKey::DashboardHtml)?
            .map(|html| parse_student_profile(&html)))
    }

    async fn expire(&self) -> Result<(), BridgeError> {
        self.session.lock().await.reset();
        self.clear_session_data()
    }

    /// Removes both keys even if the first removal fails.
    fn clear_session_data(&self) -> Result<(), BridgeError> {
        let dashboard = self.store.remove(StoreKey::DashboardHtml);
        let subjects = self.store.remove(StoreKey::SubjectSnapshot);
        dashboard.and(subjects)
    }
}

/// Short hash of a username, so logs can correlate attempts without holding
/// the student's ID.
fn user_fingerprint(username: &str) -> String {
    let digest = Sha256::digest(username.trim().as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}
