use chrono::{DateTime, Utc};

use crate::attendance::weighting::WeightTable;
use crate::relay::Relay;

/// State shared by every request handler.
pub struct AppState {
    pub relay: Relay,
    /// Weight table the dashboard applies, exposed so the frontend and the
    /// bridge agree on it
    pub weights: WeightTable,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(relay: Relay, weights: WeightTable) -> Self {
        Self {
            relay,
            weights,
            started_at: Utc::now(),
        }
    }
}
