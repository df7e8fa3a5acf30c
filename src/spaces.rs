// =============================================================================
// SPACES MODULE
// =============================================================================
// Space scheduling over the venue's usage sheet: one row per date, one
// free-text cell per space, e.g. `"Rehearsal, 10am-1pm; Get-in, All day"`.
//
// The operating day runs from 08:00 to 24:00. Every interval the parser
// produces is clamped into that window; a cell that cannot be read becomes a
// full-day booking instead of an error.
// =============================================================================

use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{DateWindow, Interval, Space, SpaceUsageEvent, WindowKind};

/// 08:00 in minutes from midnight
pub const DAY_START: u32 = 8 * 60;
/// 24:00 in minutes from midnight
pub const DAY_END: u32 = 24 * 60;
/// Length of a booking given only a start time
pub const DEFAULT_BLOCK_MINUTES: u32 = 120;

const BOUND: &str = r"(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s*m?\.?";
/// Range start whose meridiem may be carried over from the end (`10-12pm`)
const OPEN_BOUND: &str = r"(\d{1,2})(?::(\d{2}))?\s*(?:([ap])\.?\s*m?\.?)?";

static ALL_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*all\s*-?\s*day\s*$").expect("valid all-day regex")
});

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^\s*{OPEN_BOUND}\s*[-–—]\s*{BOUND}\s*$")).expect("valid range regex")
});

static SINGLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^\s*{BOUND}\s*$")).expect("valid single-bound regex")
});

/// `HH:MM-HH:MM Title` cells from the older 24-hour sheet layout
static LEADING_24H_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})\s*[-–]\s*(\d{1,2}):(\d{2})\s*(.*)$").expect("valid 24h regex")
});

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid ISO date regex"));

// =============================================================================
// CELL PARSING
// =============================================================================

/// Minutes from midnight for a 12-hour clock reading.
fn twelve_hour(hour: &str, minute: Option<&str>, meridiem: &str) -> Option<u32> {
    let h: u32 = hour.parse().ok()?;
    let m: u32 = minute.map_or(Some(0), |m| m.parse().ok())?;
    if !(1..=12).contains(&h) || m >= 60 {
        return None;
    }
    let h = match (h, meridiem.eq_ignore_ascii_case("p")) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    Some(h * 60 + m)
}

fn twenty_four_hour(hour: &str, minute: &str) -> Option<u32> {
    let h: u32 = hour.parse().ok()?;
    let m: u32 = minute.parse().ok()?;
    (h <= 24 && m < 60).then_some(h * 60 + m)
}

/// An end at or before its start runs past midnight: treat it as day end.
fn span(start: u32, end: u32) -> (u32, u32) {
    if end <= start {
        (start, DAY_END)
    } else {
        (start, end)
    }
}

/// Read a time expression into raw (start, end) minutes. `None` when the
/// text is not a time expression.
pub fn parse_time_expr(expr: &str) -> Option<(u32, u32)> {
    if ALL_DAY_RE.is_match(expr) {
        return Some((DAY_START, DAY_END));
    }
    if let Some(c) = RANGE_RE.captures(expr) {
        let end = twelve_hour(&c[4], c.get(5).map(|m| m.as_str()), &c[6])?;
        let start = match c.get(3) {
            Some(meridiem) => twelve_hour(&c[1], c.get(2).map(|m| m.as_str()), meridiem.as_str())?,
            None => {
                // "11-1pm" means 11am: fall back to am when pm would pass the end
                let minute = c.get(2).map(|m| m.as_str());
                let inherited = twelve_hour(&c[1], minute, &c[6])?;
                if inherited < end {
                    inherited
                } else {
                    twelve_hour(&c[1], minute, "a")?
                }
            }
        };
        return Some(span(start, end));
    }
    if let Some(c) = SINGLE_RE.captures(expr) {
        let start = twelve_hour(&c[1], c.get(2).map(|m| m.as_str()), &c[3])?;
        return Some((start, (start + DEFAULT_BLOCK_MINUTES).min(DAY_END)));
    }
    None
}

fn clamp_to_day((start, end): (u32, u32)) -> Option<(u32, u32)> {
    let start = start.clamp(DAY_START, DAY_END);
    let end = end.clamp(DAY_START, DAY_END);
    (start < end).then_some((start, end))
}

fn title_or_untitled(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title.to_string()
    }
}

/// `HH:MM-HH:MM Title`, whatever the title holds.
fn leading_24_hour(fragment: &str) -> Option<(String, (u32, u32))> {
    let c = LEADING_24H_RE.captures(fragment)?;
    let start = twenty_four_hour(&c[1], &c[2])?;
    let end = twenty_four_hour(&c[3], &c[4])?;
    Some((title_or_untitled(&c[5]), span(start, end)))
}

/// Split a fragment into title and raw interval.
fn parse_fragment(fragment: &str) -> (String, (u32, u32)) {
    if let Some(parsed) = leading_24_hour(fragment) {
        return parsed;
    }
    match fragment.rfind(',') {
        Some(idx) => {
            if let Some(times) = parse_time_expr(&fragment[idx + 1..]) {
                return (title_or_untitled(&fragment[..idx]), times);
            }
        }
        None => {
            if let Some(times) = parse_time_expr(fragment) {
                return ("Untitled".to_string(), times);
            }
        }
    }

    tracing::debug!(fragment = %fragment, "Unreadable time expression, booking the full day");
    (fragment.to_string(), (DAY_START, DAY_END))
}

/// Parse one sheet cell into the events it lists.
///
/// Sub-events are separated by `;`. In each, the last comma separates the
/// title (which may contain commas) from the time expression:
/// `All day`, `10am-12pm`, `9:30am – 1pm` or a lone start (a two-hour block).
/// An unreadable expression books the whole day under the full fragment.
/// Intervals lying entirely outside 08:00-24:00 are dropped.
pub fn parse_cell(date: NaiveDate, space: Space, text: &str) -> Vec<SpaceUsageEvent> {
    text.split(';')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .filter_map(|fragment| {
            let (title, raw) = parse_fragment(fragment);
            let Some((start_minutes, end_minutes)) = clamp_to_day(raw) else {
                tracing::debug!(fragment = %fragment, "Booking lies outside the operating day");
                return None;
            };
            Some(SpaceUsageEvent {
                date,
                space,
                title,
                start_minutes,
                end_minutes,
            })
        })
        .collect()
}

// =============================================================================
// SHEET ROWS
// =============================================================================

/// First ISO date inside a cell (`2025-11-05`, `2025-11-05T00:00:00Z`, ...).
pub fn extract_iso_date(text: &str) -> Option<NaiveDate> {
    let m = ISO_DATE_RE.find(text)?;
    NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok()
}

/// Date of a usage-sheet row, if it has a readable one.
pub fn row_date(row: &Map<String, Value>) -> Option<NaiveDate> {
    row.get("date")
        .or_else(|| row.get("Date"))
        .and_then(Value::as_str)
        .and_then(extract_iso_date)
}

/// The cell for `space`, looked up by key, lowercase key, label and label
/// without spaces.
pub fn space_cell(row: &Map<String, Value>, space: Space) -> Option<&str> {
    let label_compact: String = space.label().split_whitespace().collect();
    [
        space.key().to_string(),
        space.key().to_lowercase(),
        space.label().to_string(),
        label_compact,
    ]
    .iter()
    .find_map(|k| row.get(k.as_str()).and_then(Value::as_str))
    .filter(|s| !s.trim().is_empty())
}

/// Parse every known space of every dated row.
pub fn events_from_rows(rows: &[Map<String, Value>]) -> Vec<SpaceUsageEvent> {
    let mut events = Vec::new();
    for row in rows {
        let Some(date) = row_date(row) else {
            continue;
        };
        for space in Space::ALL {
            if let Some(text) = space_cell(row, space) {
                events.extend(parse_cell(date, space, text));
            }
        }
    }
    events
}

/// Events of one space on one date.
pub fn events_for(events: &[SpaceUsageEvent], space: Space, date: NaiveDate) -> Vec<SpaceUsageEvent> {
    events
        .iter()
        .filter(|e| e.space == space && e.date == date)
        .cloned()
        .collect()
}

// =============================================================================
// BUSY / FREE
// =============================================================================

/// Whether any event covers `now` (start inclusive, end exclusive).
pub fn is_busy_now(events: &[SpaceUsageEvent], now: u32) -> bool {
    events.iter().any(|e| e.start_minutes <= now && now < e.end_minutes)
}

/// Earliest event starting at or after `now`.
pub fn next_event(events: &[SpaceUsageEvent], now: u32) -> Option<&SpaceUsageEvent> {
    events
        .iter()
        .filter(|e| e.start_minutes >= now)
        .min_by_key(|e| e.start_minutes)
}

/// Free gaps of at least `min_duration` minutes within the operating day.
///
/// Sweeps the events in start order with a cursor that only moves forward,
/// so overlapping bookings are handled as their union.
pub fn find_gaps(events: &[SpaceUsageEvent], min_duration: u32) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = events.iter().map(SpaceUsageEvent::interval).collect();
    sorted.sort_by_key(|i| i.start_minutes);

    let mut gaps = Vec::new();
    let mut cursor = DAY_START;
    let mut push = |start: u32, end: u32| {
        let gap = Interval {
            start_minutes: start,
            end_minutes: end,
        };
        if gap.duration() >= min_duration {
            gaps.push(gap);
        }
    };

    for interval in sorted {
        if interval.start_minutes > cursor {
            push(cursor, interval.start_minutes);
        }
        cursor = cursor.max(interval.end_minutes);
    }
    if cursor < DAY_END {
        push(cursor, DAY_END);
    }

    gaps
}

// =============================================================================
// CALENDAR WINDOWS
// =============================================================================

fn pretty(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

/// Monday to Sunday of the ISO week containing `date`.
pub fn week(date: NaiveDate) -> DateWindow {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    let sunday = monday + Duration::days(6);
    DateWindow {
        kind: WindowKind::Week,
        start_date: monday,
        end_date: sunday,
        label: format!("Week: {} → {}", pretty(monday), pretty(sunday)),
    }
}

/// First to last calendar day of `date`'s month.
pub fn month(date: NaiveDate) -> DateWindow {
    let first = date.with_day(1).unwrap_or(date);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_first.and_then(|d| d.pred_opt()).unwrap_or(date);
    DateWindow {
        kind: WindowKind::Month,
        start_date: first,
        end_date: last,
        label: format!(
            "Month: {} ({} → {})",
            first.format("%B %Y"),
            pretty(first),
            pretty(last)
        ),
    }
}

/// The 14 Aug → 14 Aug academic year that `date` falls in.
///
/// Dates before 14 Aug belong to the year that started the previous August.
pub fn academic_year(date: NaiveDate) -> DateWindow {
    let aug14 = |year: i32| NaiveDate::from_ymd_opt(year, 8, 14).unwrap_or(date);
    let start = if date >= aug14(date.year()) {
        aug14(date.year())
    } else {
        aug14(date.year() - 1)
    };
    let end = aug14(start.year() + 1);
    DateWindow {
        kind: WindowKind::Year,
        start_date: start,
        end_date: end,
        label: format!("Academic year: {} → {}", pretty(start), pretty(end)),
    }
}

pub fn window(date: NaiveDate, kind: WindowKind) -> DateWindow {
    match kind {
        WindowKind::Week => week(date),
        WindowKind::Month => month(date),
        WindowKind::Year => academic_year(date),
    }
}

impl DateWindow {
    /// Week and month windows include their last day; the academic year
    /// ends where the next one starts.
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self.kind {
            WindowKind::Year => self.start_date <= date && date < self.end_date,
            _ => self.start_date <= date && date <= self.end_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ev(start: u32, end: u32) -> SpaceUsageEvent {
        SpaceUsageEvent {
            date: d("2025-11-05"),
            space: Space::Lobby,
            title: "x".into(),
            start_minutes: start,
            end_minutes: end,
        }
    }

    fn spans(events: &[SpaceUsageEvent]) -> Vec<(&str, u32, u32)> {
        events
            .iter()
            .map(|e| (e.title.as_str(), e.start_minutes, e.end_minutes))
            .collect()
    }

    #[test]
    fn test_explicit_range() {
        let events = parse_cell(d("2025-11-05"), Space::Lobby, "Meeting, 10am-12pm");
        assert_eq!(spans(&events), vec![("Meeting", 600, 720)]);
        assert_eq!(events[0].space, Space::Lobby);
        assert_eq!(events[0].date, d("2025-11-05"));
    }

    #[test]
    fn test_all_day() {
        let events = parse_cell(d("2025-11-05"), Space::Lobby, "Setup, All day");
        assert_eq!(spans(&events), vec![("Setup", 480, 1440)]);
        let events = parse_cell(d("2025-11-05"), Space::Lobby, "Setup,   ALL  DAY ");
        assert_eq!(spans(&events), vec![("Setup", 480, 1440)]);
    }

    #[test]
    fn test_multiple_events_and_commas_in_titles() {
        let events = parse_cell(
            d("2025-11-05"),
            Space::RedTheatre,
            "Hamlet, Act 1, 7:30pm–10pm; Get-out, 10pm",
        );
        assert_eq!(
            spans(&events),
            vec![("Hamlet, Act 1", 1170, 1320), ("Get-out", 1320, 1440)]
        );
    }

    #[test]
    fn test_range_start_borrows_meridiem() {
        let events = parse_cell(d("2025-11-05"), Space::Lobby, "Workshop, 2-4pm; Lunch, 11-1pm");
        assert_eq!(spans(&events), vec![("Workshop", 840, 960), ("Lunch", 660, 780)]);
    }

    #[test]
    fn test_single_bound_is_two_hour_block() {
        let events = parse_cell(d("2025-11-05"), Space::Office, "Call, 2pm");
        assert_eq!(spans(&events), vec![("Call", 840, 960)]);
    }

    #[test]
    fn test_bounds_are_clamped_to_operating_day() {
        let events = parse_cell(d("2025-11-05"), Space::Office, "Load-in, 6am-9am; Party, 11pm-12am");
        assert_eq!(spans(&events), vec![("Load-in", 480, 540), ("Party", 1380, 1440)]);
    }

    #[test]
    fn test_booking_outside_day_is_dropped() {
        let events = parse_cell(d("2025-11-05"), Space::Office, "Cleaners, 5am-7am");
        assert!(events.is_empty());
    }

    #[test]
    fn test_unparseable_expression_books_full_day() {
        let events = parse_cell(d("2025-11-05"), Space::Other, "Board meeting, sometime");
        assert_eq!(spans(&events), vec![("Board meeting, sometime", 480, 1440)]);
        let events = parse_cell(d("2025-11-05"), Space::Other, "Private hire");
        assert_eq!(spans(&events), vec![("Private hire", 480, 1440)]);
    }

    #[test]
    fn test_leading_24_hour_layout() {
        let events = parse_cell(d("2025-11-05"), Space::BlackBox, "09:00-11:30 Tech rehearsal");
        assert_eq!(spans(&events), vec![("Tech rehearsal", 540, 690)]);

        // commas in the title do not hide the leading times
        let events = parse_cell(d("2025-11-05"), Space::BlackBox, "09:00-11:30 Tech, dress rehearsal");
        assert_eq!(spans(&events), vec![("Tech, dress rehearsal", 540, 690)]);
    }

    #[test]
    fn test_empty_cell() {
        assert!(parse_cell(d("2025-11-05"), Space::Lobby, "  ;  ").is_empty());
    }

    #[test]
    fn test_busy_now_boundaries() {
        let events = vec![ev(600, 720)];
        assert!(!is_busy_now(&events, 599));
        assert!(is_busy_now(&events, 600));
        assert!(is_busy_now(&events, 719));
        assert!(!is_busy_now(&events, 720));
    }

    #[test]
    fn test_next_event() {
        let events = vec![ev(900, 960), ev(600, 720), ev(700, 800)];
        assert_eq!(next_event(&events, 650).unwrap().start_minutes, 700);
        assert_eq!(next_event(&events, 600).unwrap().start_minutes, 600);
        assert!(next_event(&events, 901).is_none());
    }

    #[test]
    fn test_gap_boundaries() {
        let events = vec![ev(540, 600)];
        let gap = |s, e| Interval {
            start_minutes: s,
            end_minutes: e,
        };
        assert_eq!(find_gaps(&events, 60), vec![gap(480, 540), gap(600, 1440)]);
        assert_eq!(find_gaps(&events, 61), vec![gap(600, 1440)]);
        assert_eq!(find_gaps(&events, 120), vec![gap(600, 1440)]);
    }

    #[test]
    fn test_gaps_over_overlapping_events() {
        let events = vec![ev(600, 900), ev(480, 540), ev(700, 800), ev(1000, 1440)];
        let gaps = find_gaps(&events, 30);
        let pairs: Vec<(u32, u32)> = gaps.iter().map(|g| (g.start_minutes, g.end_minutes)).collect();
        assert_eq!(pairs, vec![(540, 600), (900, 1000)]);
    }

    #[test]
    fn test_no_events_is_one_free_day() {
        let gaps = find_gaps(&[], 120);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration(), 960);
    }

    #[test]
    fn test_week_window() {
        // 2025-11-05 is a Wednesday
        let w = week(d("2025-11-05"));
        assert_eq!((w.start_date, w.end_date), (d("2025-11-03"), d("2025-11-09")));
        assert_eq!(w.label, "Week: 03 Nov 2025 → 09 Nov 2025");
        // Sunday belongs to the week that started the Monday before
        let w = week(d("2025-11-09"));
        assert_eq!(w.start_date, d("2025-11-03"));
    }

    #[test]
    fn test_month_window() {
        let m = month(d("2024-02-10"));
        assert_eq!((m.start_date, m.end_date), (d("2024-02-01"), d("2024-02-29")));
        let m = month(d("2025-12-31"));
        assert_eq!((m.start_date, m.end_date), (d("2025-12-01"), d("2025-12-31")));
        assert!(m.label.starts_with("Month: December 2025"));
    }

    #[test]
    fn test_academic_year_boundary() {
        let y = academic_year(d("2025-08-13"));
        assert_eq!((y.start_date, y.end_date), (d("2024-08-14"), d("2025-08-14")));
        let y = academic_year(d("2025-08-14"));
        assert_eq!((y.start_date, y.end_date), (d("2025-08-14"), d("2026-08-14")));
        assert!(y.contains(d("2026-08-13")));
        assert!(!y.contains(d("2026-08-14")));
    }

    #[test]
    fn test_rows_to_events() {
        let rows = vec![
            json!({"date": "2025-11-05T00:00:00.000Z", "redTheatre": "Hamlet, 7pm-10pm", "Black Box": "Class, 10am"}),
            json!({"date": "not a date", "lobby": "Ignored, All day"}),
            json!({"Date": "2025-11-06", "EastPlaza": "Market, All day", "office": "  "}),
        ];
        let rows: Vec<Map<String, Value>> = rows.into_iter().map(|r| r.as_object().cloned().unwrap()).collect();
        let events = events_from_rows(&rows);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].space, Space::RedTheatre);
        assert_eq!(events[1].space, Space::BlackBox);
        assert_eq!(events[2].space, Space::EastPlaza);
        assert_eq!(events[2].date, d("2025-11-06"));

        let red = events_for(&events, Space::RedTheatre, d("2025-11-05"));
        assert_eq!(red.len(), 1);
    }
}
