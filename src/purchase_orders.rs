// =============================================================================
// PURCHASE ORDERS MODULE
// =============================================================================
// Free-text search and column sort over the purchase-order register.
// =============================================================================

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};

pub type PurchaseOrderRow = Map<String, Value>;

pub const DATE_RAISED: &str = "Date PO Raised";

const MILLIS_PER_DAY: f64 = 86_400_000.0;
/// Spreadsheet day zero (1899-12-30) as a unix timestamp in millis
const SHEETS_EPOCH_MILLIS: f64 = -2_209_161_600_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PurchaseOrderQuery {
    pub q: Option<String>,
    pub sort: String,
    pub dir: SortDir,
}

impl Default for PurchaseOrderQuery {
    fn default() -> Self {
        Self {
            q: None,
            sort: DATE_RAISED.to_string(),
            dir: SortDir::Desc,
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows whose joined cell values contain `query` (case-insensitive).
/// A blank query keeps everything.
pub fn search(rows: Vec<PurchaseOrderRow>, query: &str) -> Vec<PurchaseOrderRow> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            row.values()
                .map(text)
                .collect::<Vec<_>>()
                .join(" • ")
                .to_lowercase()
                .contains(&needle)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Comparable {
    Instant(f64),
    Text(String),
}

impl Comparable {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Instant(a), Comparable::Instant(b)) => a.total_cmp(b),
            (Comparable::Instant(_), Comparable::Text(_)) => Ordering::Less,
            (Comparable::Text(_), Comparable::Instant(_)) => Ordering::Greater,
            (Comparable::Text(a), Comparable::Text(b)) => a.cmp(b),
        }
    }
}

/// Millis since the unix epoch for a date cell: an ISO date or timestamp,
/// or a spreadsheet serial day number.
fn date_millis(value: &Value) -> Option<f64> {
    if let Some(serial) = value.as_f64() {
        return Some(SHEETS_EPOCH_MILLIS + serial * MILLIS_PER_DAY);
    }
    let s = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis() as f64);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis() as f64);
    }
    s.parse::<f64>()
        .ok()
        .map(|serial| SHEETS_EPOCH_MILLIS + serial * MILLIS_PER_DAY)
}

fn comparable(row: &PurchaseOrderRow, key: &str) -> Comparable {
    let value = row.get(key).unwrap_or(&Value::Null);
    if key == DATE_RAISED {
        if let Some(ms) = date_millis(value) {
            return Comparable::Instant(ms);
        }
    }
    Comparable::Text(text(value).to_lowercase())
}

/// Stable sort on one column. The date-raised column compares as a date
/// when it parses; everything else compares as lowercase text.
pub fn sort(rows: &mut [PurchaseOrderRow], key: &str, dir: SortDir) {
    rows.sort_by(|a, b| {
        let ord = comparable(a, key).compare(&comparable(b, key));
        match dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
}

pub fn apply(rows: Vec<PurchaseOrderRow>, query: &PurchaseOrderQuery) -> Vec<PurchaseOrderRow> {
    let mut rows = search(rows, query.q.as_deref().unwrap_or(""));
    sort(&mut rows, &query.sort, query.dir);
    rows
}
