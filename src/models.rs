// =============================================================================
// MODELS MODULE
// =============================================================================
// Data structures shared by the normalization core and the HTTP layer.
//
// NOTES:
// - Every entity is a value type: nothing holds a reference to anything
//   else, relationships are joined by normalized string keys at read time
// - Derived quantities (qty out / available) are computed, never stored
// - Serde handles the JSON we send to the dashboard
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::status::StatusClass;

// =============================================================================
// CHECKLIST
// =============================================================================

/// One task-status cell of a production checklist, flattened out of the
/// wide spreadsheet layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecklistRecord {
    pub task: String,
    pub stage: String,
    /// Row owner, or the show lead of the column when the row has none
    pub owner: String,
    pub show: String,
    /// Raw, unclassified status text
    pub status: String,
    pub note: String,
    /// Resolved show lead for the column, kept apart from `owner`
    pub lead: String,
}

/// A checklist record with its status class attached for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ChecklistRecordView {
    #[serde(flatten)]
    pub record: ChecklistRecord,
    pub status_class: StatusClass,
}

/// Per-show progress card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowProgress {
    pub show: String,
    pub total: usize,
    pub done: usize,
    pub progress: usize,
    pub cancelled: usize,
    pub lead: String,
    pub percent_done: u32,
}

// =============================================================================
// INVENTORY
// =============================================================================

/// A catalog entry for one (category, item, type, location) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLine {
    pub category: String,
    pub item: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub location: String,
    /// Never negative: the source adapter clamps it
    pub total_qty: i64,
}

/// One live loan from the checked-out ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRecord {
    pub checkout_id: String,
    pub category: String,
    pub item: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub location: String,
    pub qty: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    /// Person responsible for the loan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Catalog line with quantities derived from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledLine {
    #[serde(flatten)]
    pub line: InventoryLine,
    pub qty_out: i64,
    pub qty_available: i64,
}

/// All reconciled lines sharing one item name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemGroup {
    pub item_name: String,
    pub rows: Vec<ReconciledLine>,
    pub sum_total: i64,
    pub sum_out: i64,
    pub sum_available: i64,
}

/// Category tile: how many catalog lines and how much is available.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub total_items: usize,
    pub total_available: i64,
}

/// Ledger entries of one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InUseCategory {
    pub name: String,
    pub rows: Vec<CheckoutRecord>,
    pub total_checked_out: i64,
}

/// Authoritative catalog + ledger pair as last returned by the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventorySnapshot {
    pub inventory: Vec<InventoryLine>,
    pub in_use: Vec<CheckoutRecord>,
}

/// Everything the inventory page renders for one department.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryView {
    pub department: String,
    pub lines: Vec<ReconciledLine>,
    pub groups: Vec<ItemGroup>,
    pub categories: Vec<CategorySummary>,
    pub in_use: Vec<InUseCategory>,
    pub locations: Vec<String>,
}

// -----------------------------------------------------------------------------
// INVENTORY MUTATIONS
// -----------------------------------------------------------------------------

/// Request body for checking equipment out
///
/// # Example JSON
/// ```json
/// {
///   "session_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
///   "category": "Microphones",
///   "item": "SM58",
///   "type": "Wired",
///   "qty": 2,
///   "event_title": "Hamlet",
///   "location": "Red Theatre",
///   "name": "Jo"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub session_id: Uuid,
    pub category: String,
    pub item: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    pub qty: i64,
    #[serde(default)]
    pub event_title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub name: String,
    /// Optional show to prefill a blank event title / location from
    #[serde(default)]
    pub show_id: Option<String>,
}

/// Request body for returning (part of) a checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub session_id: Uuid,
    pub checkout_id: String,
    pub qty: i64,
}

/// A checkout session stands for one open checkout dialog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub department: String,
}

// =============================================================================
// SHOWS
// =============================================================================

/// Reference metadata for one production.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowRecord {
    pub id: String,
    pub title: String,
    pub venue: String,
    /// Free-text date cells as the sheet holds them
    pub dates: Vec<String>,
    /// Earliest ISO date found in `dates`
    pub start_date: Option<NaiveDate>,
    pub event_type: String,
    pub cancelled: bool,
    pub producer: String,
}

/// What the best-row matcher looks for.
#[derive(Debug, Clone, Default)]
pub struct MatchTarget {
    pub show_name: String,
    pub venue_label: String,
    pub start_date: Option<NaiveDate>,
}

/// One lenient department row (lighting, audio, video sheet).
pub type DepartmentRow = Map<String, Value>;

/// Outcome of a department lookup for one show.
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentSlot {
    pub department: String,
    pub status: SlotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DepartmentRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tried: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Ready,
    Error,
}

// =============================================================================
// SPACES
// =============================================================================

/// Known bookable spaces of the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Space {
    RedTheatre,
    BlackBox,
    BlueHall,
    Lobby,
    Marketplace,
    EastPlaza,
    ExternalLocation,
    Office,
    Other,
}

impl Space {
    pub const ALL: [Space; 9] = [
        Space::RedTheatre,
        Space::BlackBox,
        Space::BlueHall,
        Space::Lobby,
        Space::Marketplace,
        Space::EastPlaza,
        Space::ExternalLocation,
        Space::Office,
        Space::Other,
    ];

    /// Column key used by the spaces sheet
    pub fn key(self) -> &'static str {
        match self {
            Space::RedTheatre => "redTheatre",
            Space::BlackBox => "blackBox",
            Space::BlueHall => "blueHall",
            Space::Lobby => "lobby",
            Space::Marketplace => "marketplace",
            Space::EastPlaza => "eastPlaza",
            Space::ExternalLocation => "externalLocation",
            Space::Office => "office",
            Space::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Space::RedTheatre => "Red Theatre",
            Space::BlackBox => "Black Box",
            Space::BlueHall => "Blue Hall",
            Space::Lobby => "Lobby",
            Space::Marketplace => "Marketplace",
            Space::EastPlaza => "East Plaza",
            Space::ExternalLocation => "External Location",
            Space::Office => "Office",
            Space::Other => "Other",
        }
    }
}

/// Half-open span of minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start_minutes: u32,
    pub end_minutes: u32,
}

impl Interval {
    pub fn duration(&self) -> u32 {
        self.end_minutes.saturating_sub(self.start_minutes)
    }
}

/// One parsed occupancy of a space on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpaceUsageEvent {
    pub date: NaiveDate,
    pub space: Space,
    pub title: String,
    pub start_minutes: u32,
    pub end_minutes: u32,
}

impl SpaceUsageEvent {
    pub fn interval(&self) -> Interval {
        Interval {
            start_minutes: self.start_minutes,
            end_minutes: self.end_minutes,
        }
    }
}

/// Which calendar span a range view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Week,
    Month,
    #[serde(alias = "academic_year")]
    Year,
}

/// A calendar range with its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub kind: WindowKind,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub label: String,
}

/// Status of one space on one date.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceDay {
    pub space: Space,
    pub label: &'static str,
    pub events: Vec<SpaceUsageEvent>,
    /// Only known when the requested date is today
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy_now: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_event: Option<SpaceUsageEvent>,
    pub free_gaps: Vec<Interval>,
}

/// One date row of the all-spaces range view.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceRangeRow {
    pub date: NaiveDate,
    pub events: Vec<SpaceUsageEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpaceRangeResponse {
    pub window: DateWindow,
    pub rows: Vec<SpaceRangeRow>,
}

// =============================================================================
// HOURS & PURCHASE ORDERS
// =============================================================================

/// Month roll-up of one person's hours sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoursTotals {
    pub total_hours: f64,
    pub days_off: usize,
    pub days_worked: usize,
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoursResponse {
    pub person: String,
    pub window: DateWindow,
    pub rows: Vec<Map<String, Value>>,
    pub totals: HoursTotals,
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

/// Which upstream sources are configured
#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub checklists: bool,
    pub inventory: bool,
    pub shows: bool,
    pub spaces: bool,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (e.g. the URLs a lookup tried)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Create an error response with details
    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: Vec<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
