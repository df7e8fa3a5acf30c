// =============================================================================
// HOURS MODULE
// =============================================================================
// Monthly view over a person's timesheet endpoint: which window to ask for,
// and the roll-up shown above the table.
// =============================================================================

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{DateWindow, HoursTotals};
use crate::spaces;

/// Columns requested from the timesheet
pub const HOURS_FIELDS: &str = "Date,Events,Start Time,End Time,Total Hours,Net Hours,Status,Last Update";
pub const HOURS_LIMIT: u32 = 500;

static OFF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)off|holiday").expect("valid off regex"));
static WORKED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)work").expect("valid worked regex"));

/// Parse a `YYYY-MM` month into its calendar window.
pub fn month_window(month: &str) -> Option<DateWindow> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d").ok()?;
    Some(spaces::month(first))
}

/// Query parameters for one month of a timesheet.
pub fn request_params(window: &DateWindow, timezone: &str) -> Vec<(&'static str, String)> {
    vec![
        ("from", window.start_date.format("%Y-%m-%d").to_string()),
        ("to", window.end_date.format("%Y-%m-%d").to_string()),
        ("tz", timezone.to_string()),
        ("fields", HOURS_FIELDS.to_string()),
        ("limit", HOURS_LIMIT.to_string()),
    ]
}

fn cell<'a>(row: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Hours cells arrive as numbers or as text such as `"1,234.5"`; anything
/// else counts as zero.
fn hours(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
            cleaned.parse().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

/// Rows in date order (ISO date text sorts chronologically).
pub fn sort_rows(rows: &mut [Map<String, Value>]) {
    rows.sort_by(|a, b| cell(a, "Date").unwrap_or("").cmp(cell(b, "Date").unwrap_or("")));
}

pub fn totals(rows: &[Map<String, Value>]) -> HoursTotals {
    let status = |r: &Map<String, Value>| cell(r, "Status").unwrap_or("").to_string();
    HoursTotals {
        total_hours: rows.iter().map(|r| hours(r.get("Total Hours"))).sum(),
        days_off: rows.iter().filter(|r| OFF_RE.is_match(&status(r))).count(),
        days_worked: rows.iter().filter(|r| WORKED_RE.is_match(&status(r))).count(),
        last_update: rows
            .iter()
            .filter_map(|r| match r.get("Last Update") {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .max(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_month_window() {
        let w = month_window("2024-02").unwrap();
        assert_eq!(w.start_date.to_string(), "2024-02-01");
        assert_eq!(w.end_date.to_string(), "2024-02-29");
        assert!(month_window("February").is_none());
    }

    #[test]
    fn test_request_params() {
        let w = month_window("2025-11").unwrap();
        let params = request_params(&w, "Asia/Dubai");
        assert_eq!(params[0], ("from", "2025-11-01".to_string()));
        assert_eq!(params[1], ("to", "2025-11-30".to_string()));
        assert_eq!(params[4], ("limit", "500".to_string()));
    }

    #[test]
    fn test_totals() {
        let data = rows(json!([
            {"Date": "2025-11-02", "Total Hours": "8.5", "Status": "Worked", "Last Update": "2025-11-02 18:00"},
            {"Date": "2025-11-01", "Total Hours": 10, "Status": "Work", "Last Update": "2025-11-03 09:00"},
            {"Date": "2025-11-03", "Total Hours": "", "Status": "Day Off"},
            {"Date": "2025-11-04", "Total Hours": "n/a", "Status": "Public Holiday"},
            {"Date": "2025-11-05", "Total Hours": "1,000"},
        ]));
        let t = totals(&data);
        assert_eq!(t.total_hours, 1018.5);
        assert_eq!(t.days_off, 2);
        assert_eq!(t.days_worked, 2);
        assert_eq!(t.last_update.as_deref(), Some("2025-11-03 09:00"));
    }

    #[test]
    fn test_sort_rows() {
        let mut data = rows(json!([{"Date": "2025-11-02"}, {}, {"Date": "2025-11-01"}]));
        sort_rows(&mut data);
        let dates: Vec<Option<&str>> = data.iter().map(|r| cell(r, "Date")).collect();
        assert_eq!(dates, [None, Some("2025-11-01"), Some("2025-11-02")]);
    }
}
