//! "Must attend" / "safe to skip" projections.
//!
//! Class counts are computed with integer arithmetic on thresholds expressed
//! in basis points (hundredths of a percent), so there is no floating point
//! drift at the boundary: 30/40 is exactly 75%, not 74.99999%.

use super::weighting::{percent, round2};
use serde::{Deserialize, Serialize};

/// Answer reported when a threshold can never be reached (e.g. 100% after a
/// missed class).
pub const SEARCH_CAP: u64 = 100;

/// Below this a student is detained.
pub const DETENTION_THRESHOLD: f64 = 75.0;

/// At or above this a student is safe; in between is the condonation zone.
pub const SAFE_THRESHOLD: f64 = 85.0;

const FULL: u128 = 10_000;

/// Float noise tolerated when scaling a threshold, so 33.33 stays 3333.
const SCALE_EPSILON: f64 = 1e-9;

/// Converts a percentage into basis points, clamped to `1..=10_000`.
///
/// Rounds up: a target finer than a basis point must never be lowered, or
/// the answer could land just below it.
fn basis_points(threshold: f64) -> u128 {
    if !threshold.is_finite() {
        return FULL;
    }
    ((threshold * 100.0 - SCALE_EPSILON).ceil() as i64).clamp(1, FULL as i64) as u128
}

/// Whether `attended / total` is at least `bp` basis points.
fn meets(attended: u128, total: u128, bp: u128) -> bool {
    attended * FULL >= bp * total
}

/// Minimum number of additional classes to attend (each one conducted and
/// attended) so that the percentage reaches `threshold`.
///
/// Returns 0 if the threshold is already met, and [`SEARCH_CAP`] if it can't
/// be reached at all.
pub fn classes_needed(attended: u64, total: u64, threshold: f64) -> u64 {
    if attended >= total {
        return 0;
    }

    let bp = basis_points(threshold);
    let (a, n) = (attended as u128, total as u128);
    if meets(a, n, bp) {
        return 0;
    }
    if bp >= FULL {
        return SEARCH_CAP;
    }

    // (a + x) * FULL >= bp * (n + x)  <=>  x * (FULL - bp) >= bp * n - a * FULL
    let deficit = bp * n - a * FULL;
    let step = FULL - bp;
    let needed = deficit.div_ceil(step);
    u64::try_from(needed).unwrap_or(u64::MAX)
}

/// Maximum number of classes that can be missed while staying at or above
/// `threshold`. 0 when already below it.
pub fn classes_skippable(attended: u64, total: u64, threshold: f64) -> u64 {
    let bp = basis_points(threshold);
    let (a, n) = (attended as u128, total as u128);
    if !meets(a, n, bp) {
        return 0;
    }

    // a * FULL >= bp * (n + x)  <=>  x <= (a * FULL - bp * n) / bp
    let skippable = (a * FULL - bp * n) / bp;
    u64::try_from(skippable).unwrap_or(u64::MAX)
}

/// Where a percentage falls under the university's attendance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    /// At or above 85%
    Safe,
    /// 75% up to 85%: needs an administrative exception
    Condonation,
    /// Below 75%
    Detained,
}

impl AttendanceStatus {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= SAFE_THRESHOLD {
            AttendanceStatus::Safe
        } else if percent >= DETENTION_THRESHOLD {
            AttendanceStatus::Condonation
        } else {
            AttendanceStatus::Detained
        }
    }
}

/// Everything the dashboard shows for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub attended: u64,
    pub total: u64,
    pub percent: f64,
    pub status: AttendanceStatus,
    /// Classes to attend to get out of detention
    pub must_attend: u64,
    /// Classes to attend to reach the safe zone
    pub must_attend_for_safe: u64,
    /// Classes that can be missed without dropping below 75%
    pub can_skip: u64,
    /// Classes that can be missed without leaving the safe zone
    pub can_skip_safe: u64,
}

/// Computes the standard projection against the 75% and 85% thresholds.
///
/// Nothing conducted yet counts as safe.
pub fn project(attended: u64, total: u64) -> Projection {
    let current = percent(attended, total);
    let status = if total == 0 {
        AttendanceStatus::Safe
    } else {
        AttendanceStatus::from_percent(current)
    };

    Projection {
        attended,
        total,
        percent: round2(current),
        status,
        must_attend: classes_needed(attended, total, DETENTION_THRESHOLD),
        must_attend_for_safe: classes_needed(attended, total, SAFE_THRESHOLD),
        can_skip: classes_skippable(attended, total, DETENTION_THRESHOLD),
        can_skip_safe: classes_skippable(attended, total, SAFE_THRESHOLD),
    }
}
