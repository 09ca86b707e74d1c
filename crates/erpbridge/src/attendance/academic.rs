/// Academic year and semester ids used by the ERP's attendance form
use crate::error::BridgeError;
use serde::{Deserialize, Serialize};

/// `DynamicModel[academicyear]` values, keyed by the label students see.
const YEAR_IDS: &[(&str, u32)] = &[
    ("2026-2027", 29),
    ("2025-2026", 19),
    ("2024-2025", 16),
    ("2023-2024", 15),
    ("2022-2023", 14),
    ("2021-2022", 13),
    ("2020-2021", 10),
    ("2019-2020", 9),
    ("2018-2019", 8),
];

/// `DynamicModel[semesterid]` values.
const SEMESTER_IDS: &[(&str, u32)] = &[("Odd", 1), ("Even", 2), ("Summer", 3)];

/// A year/semester pair resolved to the ERP's numeric ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSelection {
    pub year: String,
    pub semester: String,
    pub year_id: u32,
    pub semester_id: u32,
}

impl TermSelection {
    /// Resolves a selection such as `("2024-2025", "Odd")`.
    ///
    /// There is no default: an unknown pair must be re-picked by the user, since
    /// guessing would show another term's attendance.
    pub fn resolve(year: &str, semester: &str) -> Result<Self, BridgeError> {
        let year = year.trim();
        let semester = semester.trim();

        let year_id = YEAR_IDS
            .iter()
            .find(|(label, _)| *label == year)
            .map(|(_, id)| *id);
        let semester_entry = SEMESTER_IDS
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(semester));

        match (year_id, semester_entry) {
            (Some(year_id), Some((semester_label, semester_id))) => Ok(Self {
                year: year.to_string(),
                semester: semester_label.to_string(),
                year_id,
                semester_id: *semester_id,
            }),
            _ => Err(BridgeError::InvalidSelection {
                year: year.to_string(),
                semester: semester.to_string(),
            }),
        }
    }
}

/// All academic years the ERP knows about, newest first.
pub fn known_years() -> impl Iterator<Item = &'static str> {
    YEAR_IDS.iter().map(|(label, _)| *label)
}

/// Semester labels in ERP order.
pub fn semester_names() -> impl Iterator<Item = &'static str> {
    SEMESTER_IDS.iter().map(|(label, _)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_pair() {
        let term = TermSelection::resolve("2024-2025", "odd").unwrap();
        assert_eq!(term.year_id, 16);
        assert_eq!(term.semester_id, 1);
        assert_eq!(term.semester, "Odd");
    }

    #[test]
    fn test_unknown_year_is_rejected() {
        assert!(matches!(
            TermSelection::resolve("2017-2018", "Even"),
            Err(BridgeError::InvalidSelection { .. })
        ));
    }

    #[test]
    fn test_unknown_semester_is_rejected() {
        assert!(matches!(
            TermSelection::resolve("2025-2026", "Winter"),
            Err(BridgeError::InvalidSelection { .. })
        ));
    }

    #[test]
    fn test_known_years_newest_first() {
        assert_eq!(known_years().next(), Some("2026-2027"));
    }
}
