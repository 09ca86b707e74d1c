//! Bridge between a student attendance dashboard and the KL University ERP.
//!
//! - [`erp`]: the login handshake (CSRF token, captcha, credentials) and
//!   attendance fetches for one ERP session
//! - [`attendance`]: parsing the attendance table, component weighting and
//!   75%/85% projections
//! - [`relay`]: a stateless reverse proxy that lets a browser talk to the ERP
//!   through the dashboard's origin
//! - [`server`]: the axum router tying the relay and helper endpoints together
//! - [`store`]: where the bridge keeps the dashboard, the attendance snapshot
//!   and the remembered username (in memory or in SQLite)
//!
//! The `erpbridge` binary serves only the relay and helper endpoints; the
//! browser drives the login through the relay. [`erp::ErpBridge`] together
//! with [`store::SqliteStore`] is the library entry point for a process that
//! talks to the ERP itself, e.g.:
//!
//! ```no_run
//! # async fn run() -> Result<(), erpbridge::error::BridgeError> {
//! use std::sync::Arc;
//! use erpbridge::attendance::weighting::WeightTable;
//! use erpbridge::erp::{ErpBridge, ErpClient};
//! use erpbridge::store::SqliteStore;
//!
//! let store = Arc::new(SqliteStore::open("erpbridge.db")?);
//! let bridge = ErpBridge::new(ErpClient::new()?, store, WeightTable::default());
//! if !bridge.resume().await? {
//!     let _captcha = bridge.refresh_captcha().await?;
//!     // show _captcha.image to the student, then:
//!     bridge.login("2300031234", "password", "answer").await?;
//! }
//! let report = bridge.fetch_attendance("2024-2025", "Odd").await?;
//! println!("{} subjects", report.subjects.len());
//! # Ok(())
//! # }
//! ```

pub mod attendance;
pub mod config;
pub mod erp;
pub mod error;
pub mod relay;
pub mod server;
pub mod store;
pub mod types;
