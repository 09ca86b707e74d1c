/// Types for attendance data
use super::weighting::ComponentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted row of the ERP attendance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttendanceRow {
    pub course_code: String,
    pub course_title: String,
    /// Free text as shown by the ERP, e.g. "L", "Lecture", "Practical"
    pub component: String,
    pub conducted: u64,
    /// Usually <= conducted, but the ERP doesn't guarantee it
    pub attended: u64,
}

/// Attendance for one component (Lecture, Practical, ...) of a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentAttendance {
    pub label: String,
    pub kind: ComponentKind,
    pub weight: u32,
    pub conducted: u64,
    pub attended: u64,
    pub percent: f64,
}

/// A subject with all of its components merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub code: String,
    pub title: String,
    /// Component labels joined for display, e.g. "L + P"
    pub ltps: String,
    pub components: Vec<ComponentAttendance>,
    pub raw_conducted: u64,
    pub raw_attended: u64,
    pub weighted_conducted: u64,
    pub weighted_attended: u64,
    /// Weighted aggregate percentage
    pub percent: f64,
}

impl SubjectRecord {
    /// Looks up a component by its label, ignoring case.
    pub fn component(&self, label: &str) -> Option<&ComponentAttendance> {
        let label = label.trim().to_lowercase();
        self.components
            .iter()
            .find(|c| c.label.to_lowercase() == label)
    }

    /// Raw classes as "attended/conducted", which students find easier to read
    /// than the weighted totals.
    pub fn attended_display(&self) -> String {
        format!("{}/{}", self.raw_attended, self.raw_conducted)
    }
}

/// A parsed attendance listing for one academic term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub year: String,
    pub semester: String,
    pub fetched_at: DateTime<Utc>,
    pub subjects: Vec<SubjectRecord>,
}
