/// Attendance table scraping and weighting
pub mod academic;
pub mod projection;
mod types;
pub mod weighting;

pub use types::*;

use crate::error::BridgeError;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use weighting::{percent, ComponentKind, WeightTable};

/// Rows with fewer cells than this are not attendance rows.
pub const MIN_COLUMNS: usize = 13;

const CODE_COL: usize = 1;
const TITLE_COL: usize = 2;
const COMPONENT_COL: usize = 3;
const CONDUCTED_COL: usize = 8;
const ATTENDED_COL: usize = 9;

/// Label used for rows whose component cell is blank or "N/A".
const UNKNOWN_COMPONENT: &str = "Unknown";

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table tbody tr").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Extracts the attendance rows from the course-list fragment.
///
/// Rows of every table body are considered, since the fragment may carry
/// filter or layout tables around the grid. Short rows and rows without a
/// course code or title are skipped rather than reported.
pub fn parse_rows(html: &str) -> Vec<RawAttendanceRow> {
    let document = Html::parse_document(html);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for row in document.select(&ROW_SELECTOR) {
        match parse_row(&row) {
            Some(parsed) => rows.push(parsed),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(accepted = rows.len(), skipped, "Skipped malformed attendance rows");
    }

    rows
}

/// Parses a single `<tr>`. `None` means the row isn't usable.
fn parse_row(row: &ElementRef) -> Option<RawAttendanceRow> {
    let cells: Vec<String> = row
        .select(&CELL_SELECTOR)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect();

    if cells.len() < MIN_COLUMNS {
        return None;
    }

    let course_code = cells[CODE_COL].clone();
    let course_title = cells[TITLE_COL].clone();
    if course_code.is_empty() || course_title.is_empty() {
        return None;
    }

    Some(RawAttendanceRow {
        course_code,
        course_title,
        component: cells[COMPONENT_COL].clone(),
        conducted: parse_count(&cells[CONDUCTED_COL]),
        attended: parse_count(&cells[ATTENDED_COL]),
    })
}

/// Reads the leading digits of a cell, so "12" and "12 classes" both give 12.
/// Anything else (blank, "-", negative) is 0.
fn parse_count(text: &str) -> u64 {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[derive(Debug)]
struct ComponentTotals {
    label: String,
    conducted: u64,
    attended: u64,
}

#[derive(Debug)]
struct SubjectTotals {
    title: String,
    /// Keyed by lowercased label
    components: BTreeMap<String, ComponentTotals>,
}

/// Groups rows into subjects.
///
/// Counts are summed per (code, component) first, and only then are weights
/// and percentages derived, so the result doesn't depend on row order (apart
/// from which spelling of a title or label is seen first).
pub fn build_subjects(rows: &[RawAttendanceRow], weights: &WeightTable) -> Vec<SubjectRecord> {
    // Pass 1: accumulate raw counts
    let mut subjects: BTreeMap<String, SubjectTotals> = BTreeMap::new();

    for row in rows {
        let label = normalize_label(&row.component);
        let subject = subjects
            .entry(row.course_code.clone())
            .or_insert_with(|| SubjectTotals {
                title: row.course_title.clone(),
                components: BTreeMap::new(),
            });

        let totals = subject
            .components
            .entry(label.to_lowercase())
            .or_insert_with(|| ComponentTotals {
                label: label.to_string(),
                conducted: 0,
                attended: 0,
            });
        totals.conducted = totals.conducted.saturating_add(row.conducted);
        totals.attended = totals.attended.saturating_add(row.attended);
    }

    // Pass 2: derive
    subjects
        .into_iter()
        .map(|(code, totals)| derive_subject(code, totals, weights))
        .collect()
}

fn derive_subject(code: String, totals: SubjectTotals, weights: &WeightTable) -> SubjectRecord {
    let mut components = Vec::with_capacity(totals.components.len());
    let mut raw_conducted = 0u64;
    let mut raw_attended = 0u64;
    let mut weighted_conducted = 0u64;
    let mut weighted_attended = 0u64;

    for component in totals.components.into_values() {
        let kind = ComponentKind::from_label(&component.label);
        let weight = if component.label == UNKNOWN_COMPONENT {
            weights.weight_for(kind)
        } else {
            weights.weight_of(&component.label)
        };

        raw_conducted = raw_conducted.saturating_add(component.conducted);
        raw_attended = raw_attended.saturating_add(component.attended);
        weighted_conducted =
            weighted_conducted.saturating_add(component.conducted.saturating_mul(weight as u64));
        weighted_attended =
            weighted_attended.saturating_add(component.attended.saturating_mul(weight as u64));

        components.push(ComponentAttendance {
            percent: percent(component.attended, component.conducted),
            label: component.label,
            kind,
            weight,
            conducted: component.conducted,
            attended: component.attended,
        });
    }

    let labels: Vec<&str> = components
        .iter()
        .map(|c| c.label.as_str())
        .filter(|label| *label != UNKNOWN_COMPONENT)
        .collect();
    let ltps = if labels.is_empty() {
        "N/A".to_string()
    } else {
        labels.join(" + ")
    };

    SubjectRecord {
        code,
        title: totals.title,
        ltps,
        percent: percent(weighted_attended, weighted_conducted),
        components,
        raw_conducted,
        raw_attended,
        weighted_conducted,
        weighted_attended,
    }
}

fn normalize_label(label: &str) -> &str {
    let label = label.trim();
    if label.is_empty() || label.eq_ignore_ascii_case("n/a") {
        UNKNOWN_COMPONENT
    } else {
        label
    }
}

/// Parses the ERP attendance HTML into subject records. Never fails; malformed
/// rows are dropped.
pub fn parse_subjects(html: &str, weights: &WeightTable) -> Vec<SubjectRecord> {
    let rows = parse_rows(html);
    build_subjects(&rows, weights)
}

/// Like [`parse_subjects`], but treats an empty result from a non-empty
/// document as an error, which usually means the ERP changed its markup.
///
/// # Returns
/// * `Ok(Vec<SubjectRecord>)` - The subjects (empty only for an empty document)
/// * `Err(BridgeError::NoDataFound)` - Carrying only the document length
pub fn extract_subjects(
    html: &str,
    weights: &WeightTable,
) -> Result<Vec<SubjectRecord>, BridgeError> {
    let subjects = parse_subjects(html, weights);

    if subjects.is_empty() && !html.trim().is_empty() {
        warn!(html_len = html.len(), "No subjects found in attendance HTML");
        return Err(BridgeError::NoDataFound {
            html_len: html.len(),
        });
    }

    info!("Parsed {} subjects from attendance HTML", subjects.len());
    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_html(code: &str, title: &str, ltps: &str, conducted: &str, attended: &str) -> String {
        format!(
            "<tr><td>1</td><td>{code}</td><td>{title}</td><td>{ltps}</td>\
             <td>A</td><td>S1</td><td>F</td><td>2024</td>\
             <td>{conducted}</td><td>{attended}</td><td>0</td><td>x</td><td>y</td><td>z</td></tr>"
        )
    }

    fn table(rows: &[String]) -> String {
        format!(
            "<html><body><table><thead><tr><th>#</th></tr></thead><tbody>{}</tbody></table></body></html>",
            rows.join("")
        )
    }

    fn raw(code: &str, component: &str, conducted: u64, attended: u64) -> RawAttendanceRow {
        RawAttendanceRow {
            course_code: code.to_string(),
            course_title: format!("{code} title"),
            component: component.to_string(),
            conducted,
            attended,
        }
    }

    #[test]
    fn test_repeated_rows_accumulate() {
        let html = table(&[
            row_html("CS101", "Intro", "Lecture", "10", "8"),
            row_html("CS101", "Intro", "Lecture", "5", "5"),
        ]);
        let subjects = parse_subjects(&html, &WeightTable::default());

        assert_eq!(subjects.len(), 1);
        let lecture = subjects[0].component("Lecture").unwrap();
        assert_eq!(lecture.conducted, 15);
        assert_eq!(lecture.attended, 13);
        assert_eq!(lecture.percent, 86.67);
        assert_eq!(subjects[0].attended_display(), "13/15");
    }

    #[test]
    fn test_weighted_aggregate() {
        let weights = WeightTable::default();
        let subjects = build_subjects(
            &[raw("CS101", "Lecture", 10, 10), raw("CS101", "Practical", 8, 4)],
            &weights,
        );

        let subject = &subjects[0];
        assert_eq!(subject.weighted_conducted, 1400);
        assert_eq!(subject.weighted_attended, 1200);
        assert_eq!(subject.percent, 85.71);
        assert_eq!(subject.component("Practical").unwrap().percent, 50.0);
        assert_eq!(subject.ltps, "Lecture + Practical");
    }

    #[test]
    fn test_short_rows_and_bad_cells_are_skipped() {
        let html = table(&[
            "<tr><td>1</td><td>CS101</td><td>Intro</td></tr>".to_string(),
            row_html("", "No code", "L", "4", "4"),
            row_html("MA201", "Calculus", "L", "abc", "-2"),
        ]);
        let subjects = parse_subjects(&html, &WeightTable::default());

        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].code, "MA201");
        assert_eq!(subjects[0].raw_conducted, 0);
        assert_eq!(subjects[0].raw_attended, 0);
        assert_eq!(subjects[0].percent, 0.0);
    }

    #[test]
    fn test_order_independence() {
        let weights = WeightTable::default();
        let rows = vec![
            raw("CS101", "L", 10, 9),
            raw("MA201", "T", 4, 2),
            raw("CS101", "P", 6, 6),
            raw("CS101", "L", 2, 1),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        assert_eq!(build_subjects(&rows, &weights), build_subjects(&reversed, &weights));
    }

    #[test]
    fn test_label_grouping_ignores_case() {
        let subjects = build_subjects(
            &[raw("CS101", "Lecture", 3, 3), raw("CS101", "LECTURE", 2, 1)],
            &WeightTable::default(),
        );
        assert_eq!(subjects[0].components.len(), 1);
        assert_eq!(subjects[0].components[0].label, "Lecture");
        assert_eq!(subjects[0].components[0].conducted, 5);
    }

    #[test]
    fn test_attended_above_conducted_is_tolerated() {
        let subjects = build_subjects(&[raw("CS101", "L", 4, 5)], &WeightTable::default());
        assert_eq!(subjects[0].percent, 125.0);
    }

    #[test]
    fn test_missing_component_is_unknown() {
        let subjects = build_subjects(&[raw("CS101", "", 4, 2)], &WeightTable::default());
        assert_eq!(subjects[0].components[0].label, "Unknown");
        assert_eq!(subjects[0].components[0].weight, 1);
        assert_eq!(subjects[0].ltps, "N/A");
    }

    #[test]
    fn test_no_data_found_carries_length_only() {
        let html = "<html><body><p>Nothing to see</p></body></html>";
        match extract_subjects(html, &WeightTable::default()) {
            Err(BridgeError::NoDataFound { html_len }) => assert_eq!(html_len, html.len()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_document_is_not_an_error() {
        let subjects = extract_subjects("", &WeightTable::default()).unwrap();
        assert!(subjects.is_empty());
    }

    #[test]
    fn test_layout_table_before_grid_is_ignored() {
        let html = format!(
            "<table><tr><td>Academic Year</td><td>2024-2025</td></tr></table>\
             <table><tbody>{}{}</tbody></table>",
            row_html("CS101", "Intro", "L", "10", "8"),
            row_html("MA201", "Calculus", "L", "20", "15"),
        );

        let subjects = extract_subjects(&html, &WeightTable::default()).unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].code, "CS101");
        assert_eq!(subjects[0].percent, 80.0);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let html = table(&[
            row_html("CS101", "Intro", "L", "10", "7"),
            row_html("CS102", "Data", "P", "8", "8"),
        ]);
        let weights = WeightTable::default();
        assert_eq!(parse_subjects(&html, &weights), parse_subjects(&html, &weights));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(" 12 "), 12);
        assert_eq!(parse_count("7 classes"), 7);
        assert_eq!(parse_count("-3"), 0);
        assert_eq!(parse_count(""), 0);
    }
}
