// =============================================================================
// SHOWS MODULE
// =============================================================================
// The show list is the reference every other view keys off: inventory
// checkout defaults, department lookups and the show browser. The sheet
// serves either named objects or positional rows
// `[dates, title, venue, event type, _, _, _, time]`.
// =============================================================================

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{MatchTarget, ShowRecord};
use crate::spaces::extract_iso_date;

const TITLE_FIELDS: &[&str] = &["showName", "Show Name", "Title", "title", "Event", "name"];
const VENUE_FIELDS: &[&str] = &["venue", "Venue"];
const DATE_FIELDS: &[&str] = &["dates", "Dates", "Date", "date"];
const TYPE_FIELDS: &[&str] = &["eventType", "Event Type", "Type"];
const PRODUCER_FIELDS: &[&str] = &["Assigned Producer", "assignedProducer", "Producer", "producer", "Show Lead"];

static NOT_A_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d|public|internal|invited|performance|cancel").expect("valid producer regex")
});

// =============================================================================
// NORMALIZATION
// =============================================================================

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

fn pick(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(text))
}

/// A dates cell may be one string or a list of them.
fn date_cells(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(text).collect(),
        Some(other) => text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Earliest ISO date found across the date cells.
pub fn start_date(dates: &[String]) -> Option<NaiveDate> {
    dates.iter().filter_map(|d| extract_iso_date(d)).min()
}

fn is_cancelled_value(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("cancelled"),
        _ => false,
    }
}

/// `cancelled: true`, or `cancelled`/`status`/`Status` reading "cancelled".
pub fn is_cancelled(obj: &Map<String, Value>) -> bool {
    ["cancelled", "status", "Status"]
        .iter()
        .any(|k| is_cancelled_value(obj.get(*k)))
}

/// Column A of a positional row holds the producer on some tabs; anything
/// that looks like a date, audience or status note is not a name.
fn producer_from_column_a(row: &[Value]) -> Option<String> {
    let candidate = row.first().and_then(text)?;
    (candidate.chars().count() <= 40 && !NOT_A_NAME_RE.is_match(&candidate)).then_some(candidate)
}

fn from_object(obj: &Map<String, Value>, index: usize) -> ShowRecord {
    let id = obj
        .get("id")
        .and_then(text)
        .unwrap_or_else(|| format!("ROW-{}", index + 2));
    let dates = DATE_FIELDS
        .iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .map(|v| date_cells(Some(v)))
        .unwrap_or_default();
    ShowRecord {
        title: pick(obj, TITLE_FIELDS).unwrap_or_else(|| id.clone()),
        venue: pick(obj, VENUE_FIELDS).unwrap_or_default(),
        start_date: start_date(&dates),
        dates,
        event_type: pick(obj, TYPE_FIELDS).unwrap_or_default(),
        cancelled: is_cancelled(obj),
        producer: pick(obj, PRODUCER_FIELDS).unwrap_or_default(),
        id,
    }
}

fn from_positional(row: &[Value], index: usize) -> ShowRecord {
    let at = |i: usize| row.get(i).and_then(text).unwrap_or_default();
    let id = format!("ROW-{}", index + 2);
    let dates = date_cells(row.first());
    let title = at(1);
    let cancelled = row
        .iter()
        .any(|v| matches!(v, Value::String(_)) && is_cancelled_value(Some(v)));
    ShowRecord {
        title: if title.is_empty() { id.clone() } else { title },
        venue: at(2),
        start_date: start_date(&dates),
        dates,
        event_type: at(3),
        cancelled,
        producer: producer_from_column_a(row).unwrap_or_default(),
        id,
    }
}

/// The show list inside a response: a bare array, or one under
/// `shows`, `data`, `items` or `result`.
pub fn show_rows(json: &Value) -> &[Value] {
    if let Value::Array(rows) = json {
        return rows;
    }
    ["shows", "data", "items", "result"]
        .iter()
        .find_map(|k| json.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Normalize every row of a shows response. Rows that are neither objects
/// nor arrays are skipped.
pub fn normalize_shows(json: &Value) -> Vec<ShowRecord> {
    show_rows(json)
        .iter()
        .enumerate()
        .filter_map(|(i, row)| match row {
            Value::Object(obj) => Some(from_object(obj, i)),
            Value::Array(cells) => Some(from_positional(cells, i)),
            _ => None,
        })
        .collect()
}

pub fn find<'a>(shows: &'a [ShowRecord], id: &str) -> Option<&'a ShowRecord> {
    shows.iter().find(|s| s.id == id)
}

/// What the department matcher should look for.
pub fn match_target(show: &ShowRecord) -> MatchTarget {
    MatchTarget {
        show_name: show.title.clone(),
        venue_label: show.venue.clone(),
        start_date: show.start_date,
    }
}

// =============================================================================
// FILTERS
// =============================================================================

/// Show browser filters, straight from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShowFilter {
    pub q: Option<String>,
    pub venue: Option<String>,
    /// `YYYY-MM`
    pub month: Option<String>,
    pub event_type: Option<String>,
    pub upcoming: bool,
    pub hide_undated: bool,
    pub hide_cancelled: bool,
}

fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

impl ShowFilter {
    pub fn matches(&self, show: &ShowRecord, today: NaiveDate) -> bool {
        if let Some(q) = blank_to_none(&self.q) {
            let hit = [&show.title, &show.venue, &show.event_type]
                .iter()
                .any(|field| field.to_lowercase().contains(&q));
            if !hit {
                return false;
            }
        }
        if let Some(venue) = blank_to_none(&self.venue) {
            if show.venue.trim().to_lowercase() != venue {
                return false;
            }
        }
        if let Some(kind) = blank_to_none(&self.event_type) {
            if show.event_type.to_lowercase() != kind {
                return false;
            }
        }
        if let Some(month) = blank_to_none(&self.month) {
            match show.start_date {
                Some(start) if start.format("%Y-%m").to_string() == month => {}
                _ => return false,
            }
        }
        // Undated shows pass the upcoming filter; hide_undated removes them.
        if self.upcoming && show.start_date.is_some_and(|start| start < today) {
            return false;
        }
        if self.hide_undated && show.start_date.is_none() {
            return false;
        }
        !(self.hide_cancelled && show.cancelled)
    }

    pub fn apply(&self, shows: Vec<ShowRecord>, today: NaiveDate) -> Vec<ShowRecord> {
        shows.into_iter().filter(|s| self.matches(s, today)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_positional_rows() {
        let json = json!([
            ["Sarah Khan", "Hamlet", "Red Theatre", "Public Performance", "", "", "", "7pm"],
            [["2025-11-07", "2025-11-05"], "Lear", "Black Box", "Invited"],
        ]);
        let shows = normalize_shows(&json);
        assert_eq!(shows.len(), 2);

        assert_eq!(shows[0].id, "ROW-2");
        assert_eq!(shows[0].title, "Hamlet");
        assert_eq!(shows[0].producer, "Sarah Khan");
        assert_eq!(shows[0].start_date, None);

        assert_eq!(shows[1].id, "ROW-3");
        assert_eq!(shows[1].start_date, Some(d("2025-11-05")));
        assert_eq!(shows[1].producer, "");
    }

    #[test]
    fn test_named_rows_under_wrapper() {
        let json = json!({"data": [
            {"id": "S1", "Show Name": "Hamlet", "Venue": "Red Theatre", "Dates": "Opens 2025-11-05", "Producer": "Ana", "Status": "Cancelled"},
            {"showName": "Lear"}
        ]});
        let shows = normalize_shows(&json);
        assert_eq!(shows[0].id, "S1");
        assert_eq!(shows[0].venue, "Red Theatre");
        assert_eq!(shows[0].start_date, Some(d("2025-11-05")));
        assert_eq!(shows[0].producer, "Ana");
        assert!(shows[0].cancelled);
        assert_eq!(shows[1].id, "ROW-3");
        assert!(!shows[1].cancelled);
    }

    #[test]
    fn test_untitled_row_uses_id() {
        let shows = normalize_shows(&json!({"shows": [{"venue": "Lobby"}]}));
        assert_eq!(shows[0].title, "ROW-2");
    }

    #[test]
    fn test_unrecognized_shape_is_empty() {
        assert!(normalize_shows(&json!({"ok": true})).is_empty());
        assert!(normalize_shows(&json!("nope")).is_empty());
    }

    #[test]
    fn test_cancelled_flags() {
        let obj = |v: Value| v.as_object().cloned().unwrap();
        assert!(is_cancelled(&obj(json!({"cancelled": true}))));
        assert!(is_cancelled(&obj(json!({"cancelled": "Cancelled"}))));
        assert!(is_cancelled(&obj(json!({"status": " cancelled "}))));
        assert!(!is_cancelled(&obj(json!({"cancelled": false, "Status": "Confirmed"}))));
    }

    fn show(title: &str, venue: &str, start: Option<&str>, cancelled: bool) -> ShowRecord {
        ShowRecord {
            id: title.to_string(),
            title: title.to_string(),
            venue: venue.to_string(),
            dates: start.map(String::from).into_iter().collect(),
            start_date: start.map(d),
            event_type: "Public".to_string(),
            cancelled,
            producer: String::new(),
        }
    }

    #[test]
    fn test_filters() {
        let today = d("2025-11-01");
        let shows = vec![
            show("Hamlet", "Red Theatre", Some("2025-11-05"), false),
            show("Lear", "Black Box", Some("2025-10-01"), false),
            show("Tempest", "Red Theatre", None, true),
        ];
        let titles = |f: &ShowFilter| -> Vec<String> {
            f.apply(shows.clone(), today).into_iter().map(|s| s.title).collect()
        };

        assert_eq!(titles(&ShowFilter::default()).len(), 3);
        assert_eq!(
            titles(&ShowFilter { venue: Some(" red theatre ".into()), ..Default::default() }),
            ["Hamlet", "Tempest"]
        );
        assert_eq!(
            titles(&ShowFilter { upcoming: true, ..Default::default() }),
            ["Hamlet", "Tempest"]
        );
        assert_eq!(
            titles(&ShowFilter { upcoming: true, hide_undated: true, ..Default::default() }),
            ["Hamlet"]
        );
        assert_eq!(
            titles(&ShowFilter { month: Some("2025-10".into()), ..Default::default() }),
            ["Lear"]
        );
        assert_eq!(
            titles(&ShowFilter { hide_cancelled: true, q: Some("theatre".into()), ..Default::default() }),
            ["Hamlet"]
        );
    }
}
