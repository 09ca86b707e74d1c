//! Runtime configuration, read from the environment.
//!
//! | Variable                 | Default                                      |
//! |--------------------------|----------------------------------------------|
//! | `ERP_RELAY_PORT`         | `3000`                                       |
//! | `ERP_UPSTREAM_URL`       | `https://newerp.kluniversity.in/index.php`   |
//! | `ERP_RELAY_MOUNT`        | `/index.php`                                 |
//! | `ERP_CROSS_SITE_COOKIES` | `false`                                      |
//! | `ERP_BODY_LIMIT`         | `20971520` (20 MiB)                          |
//! | `ERP_RELAY_TIMEOUT_SECS` | unset (transport defaults)                   |
//! | `ERP_WEIGHTS_PATH`       | unset (built-in weights)                     |

use anyhow::{anyhow, Context};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::attendance::weighting::WeightTable;
use crate::erp::ErpConfig;
use crate::relay::RelayConfig;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MOUNT: &str = "/index.php";
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub relay: RelayConfig,
    pub weights: WeightTable,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so it can be tested
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("ERP_RELAY_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .with_context(|| format!("ERP_RELAY_PORT is not a port: {}", port))?,
            None => DEFAULT_PORT,
        };

        let upstream = lookup("ERP_UPSTREAM_URL").unwrap_or_else(|| ErpConfig::default().base_url);
        let upstream = Url::parse(upstream.trim())
            .with_context(|| format!("ERP_UPSTREAM_URL is not a URL: {}", upstream))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(anyhow!("ERP_UPSTREAM_URL must be http(s): {}", upstream));
        }

        let mount = normalize_mount(&lookup("ERP_RELAY_MOUNT").unwrap_or_else(|| DEFAULT_MOUNT.to_string()));

        let cross_site_cookies = match lookup("ERP_CROSS_SITE_COOKIES") {
            Some(flag) => parse_flag(&flag)
                .ok_or_else(|| anyhow!("ERP_CROSS_SITE_COOKIES is not a boolean: {}", flag))?,
            None => false,
        };

        let body_limit = match lookup("ERP_BODY_LIMIT") {
            Some(limit) => limit
                .trim()
                .parse()
                .with_context(|| format!("ERP_BODY_LIMIT is not a byte count: {}", limit))?,
            None => DEFAULT_BODY_LIMIT,
        };

        let timeout = match lookup("ERP_RELAY_TIMEOUT_SECS") {
            Some(secs) => Some(Duration::from_secs(secs.trim().parse().with_context(|| {
                format!("ERP_RELAY_TIMEOUT_SECS is not a number: {}", secs)
            })?)),
            None => None,
        };

        let weights = match lookup("ERP_WEIGHTS_PATH") {
            Some(path) => WeightTable::load_from_file(Path::new(&path))
                .map_err(|e| anyhow!("failed to load weights from {}: {}", path, e))?,
            None => WeightTable::default(),
        };

        Ok(Self {
            port,
            relay: RelayConfig {
                upstream,
                mount,
                cross_site_cookies,
                body_limit,
                timeout,
            },
            weights,
        })
    }
}

/// `"/index.php/"` -> `"/index.php"`, `"erp"` -> `"/erp"`, `"/"` -> `""` (root).
fn normalize_mount(mount: &str) -> String {
    let trimmed = mount.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
