// =============================================================================
// MATCHER MODULE
// =============================================================================
// Picks the department row (lighting / audio / video sheet) that describes a
// given show. The department sheets share no key with the show list, so rows
// are scored on loose evidence: name, venue, date text and how complete the
// row is.
//
// SCORING:
//   +4  a name-like field contains the show name
//   +3  a venue-like field contains the venue
//   +2  a date-like field contains the start year
//   +2  a date-like field contains a month-day spelling of the start date
//   +0..5  one point per five non-empty fields, capped at five
// =============================================================================

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use crate::models::{DepartmentRow, MatchTarget};

const NAME_FIELDS: &[&str] = &["Show Name", "Show", "Title", "name"];
const VENUE_FIELDS: &[&str] = &["Venue", "Location", "venue"];
const DATE_FIELDS: &[&str] = &["Dates", "Date", "date", "When", "Event Date"];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Render a loose cell as text; `None` for null.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn field_text(row: &DepartmentRow, field: &str) -> Option<String> {
    row.get(field)
        .and_then(value_text)
        .filter(|s| !s.is_empty())
}

/// The six textual spellings of a start date a sheet might use:
/// `Nov 5`, `Nov 05`, `5 Nov`, `05 Nov`, `Nov-5`, `Nov-05`.
pub fn month_day_variants(date: NaiveDate) -> [String; 6] {
    let mon = MONTHS[date.month0() as usize];
    let d = date.day();
    [
        format!("{mon} {d}"),
        format!("{mon} {d:02}"),
        format!("{d} {mon}"),
        format!("{d:02} {mon}"),
        format!("{mon}-{d}"),
        format!("{mon}-{d:02}"),
    ]
}

/// Count fields holding something other than null or blank text.
pub fn non_empty_count(row: &DepartmentRow) -> usize {
    row.values()
        .filter_map(value_text)
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// Score one candidate row against the target show.
pub fn score(row: &DepartmentRow, target: &MatchTarget) -> u32 {
    let name = target.show_name.to_lowercase();
    let venue = target.venue_label.to_lowercase();
    let contains_any = |fields: &[&str], needle: &str| {
        fields
            .iter()
            .filter_map(|f| field_text(row, f))
            .any(|v| v.to_lowercase().contains(needle))
    };

    let mut total = 0;
    if contains_any(NAME_FIELDS, &name) {
        total += 4;
    }
    if contains_any(VENUE_FIELDS, &venue) {
        total += 3;
    }

    if let Some(start) = target.start_date {
        let hay = DATE_FIELDS
            .iter()
            .map(|f| field_text(row, f).unwrap_or_default().to_lowercase())
            .collect::<Vec<_>>()
            .join(" | ");
        if hay.contains(&start.year().to_string()) {
            total += 2;
        }
        if month_day_variants(start)
            .iter()
            .any(|md| hay.contains(&md.to_lowercase()))
        {
            total += 2;
        }
    }

    total + (non_empty_count(row) / 5).min(5) as u32
}

/// Select the highest-scoring row.
///
/// Only a strictly higher score replaces the current best, so ties go to
/// the earliest row. `None` when there are no candidates.
pub fn select_best<'a>(candidates: &'a [DepartmentRow], target: &MatchTarget) -> Option<&'a DepartmentRow> {
    let mut best: Option<(&DepartmentRow, u32)> = None;
    for row in candidates {
        let s = score(row, target);
        if best.map_or(true, |(_, top)| s > top) {
            best = Some((row, s));
        }
    }
    best.map(|(row, _)| row)
}
