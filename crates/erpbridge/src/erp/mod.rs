//! ERP session bridge.
//!
//! Handles the Yii2 login handshake:
//! 1. GET the login page and read the CSRF meta tag
//! 2. GET a captcha image (same cookie session)
//! 3. POST credentials + captcha + CSRF token
//! 4. Classify the returned page (dashboard, or login form with an error)
//! 5. POST the attendance form as an AJAX request and parse the fragment

mod bridge;
mod client;
pub mod pages;
mod session;

pub use bridge::ErpBridge;
pub use client::{ErpClient, ErpConfig, ErpPage, LoginForm};
pub use pages::StudentProfile;
pub use session::{CaptchaChallenge, Session, SessionState, Ticket};
