// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers for the dashboard.
//
// Each handler fetches what it needs from the sheet endpoints, runs the
// normalization core over it and answers typed JSON. Handlers never patch
// inventory state themselves: whatever the source answers after a load or a
// mutation replaces the cached snapshot whole.
//
// NOTES:
// - An unconfigured source is a 404 for the thing being asked about, not a
//   startup failure
// - Request metrics are labelled with the route pattern, not the raw path
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate, Timelike};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::checklist;
use crate::config::{department_action, NamedSources};
use crate::error::{AppError, AppResult};
use crate::hours;
use crate::matcher;
use crate::matrix;
use crate::metrics;
use crate::models::*;
use crate::purchase_orders::{self, PurchaseOrderQuery};
use crate::reconcile;
use crate::shows::{self, ShowFilter};
use crate::spaces;
use crate::status::classify;
use crate::AppState;

/// Default minimum free gap for the spaces view, in minutes
const DEFAULT_MIN_GAP_MINUTES: u32 = 120;

// =============================================================================
// HELPERS
// =============================================================================

fn observe<T>(method: &str, endpoint: &str, start: Instant, result: &AppResult<T>) {
    let status = match result {
        Ok(_) => 200,
        Err(err) => err.status_code().as_u16(),
    };
    metrics::record_http_request(method, endpoint, status, start.elapsed().as_secs_f64());
}

fn named_source<'a>(sources: &'a NamedSources, kind: &str, name: &str) -> AppResult<&'a str> {
    sources
        .get(name)
        .ok_or_else(|| AppError::NotFound(format!("No source configured for {kind} {name:?}")))
}

fn single_source<'a>(url: &'a Option<String>, kind: &str) -> AppResult<&'a str> {
    url.as_deref()
        .ok_or_else(|| AppError::NotFound(format!("No source configured for {kind}")))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn minutes_now() -> u32 {
    let now = Local::now();
    now.hour() * 60 + now.minute()
}

/// "lighting" -> "Lighting"
fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn with_status_class(records: Vec<ChecklistRecord>) -> Vec<ChecklistRecordView> {
    records
        .into_iter()
        .map(|record| ChecklistRecordView {
            status_class: classify(&record.status),
            record,
        })
        .collect()
}

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "venue-ops-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ready once at least one data source is configured.
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let config = &state.config;
    let checks = ReadinessChecks {
        checklists: !config.checklist_sources.is_empty(),
        inventory: !config.inventory_sources.is_empty(),
        shows: config.shows_url.is_some(),
        spaces: config.spaces_url.is_some(),
    };
    let ready = checks.checklists || checks.inventory || checks.shows || checks.spaces;

    if ready {
        Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            checks,
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// CHECKLISTS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ChecklistParams {
    /// Only records of this show (case-insensitive)
    pub show: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    #[serde(default)]
    pub q: String,
}

async fn load_checklist(state: &AppState, board: &str) -> AppResult<Vec<ChecklistRecord>> {
    let url = named_source(&state.config.checklist_sources, "checklist board", board)?;
    let records = state.client.checklist(board, url).await?;
    metrics::set_checklist_records(board, records.len());
    tracing::info!(board = %board, records = records.len(), "Checklist loaded");
    Ok(records)
}

/// GET /api/v1/checklists/:board?show=
pub async fn list_checklist(
    State(state): State<Arc<AppState>>,
    Path(board): Path<String>,
    Query(params): Query<ChecklistParams>,
) -> AppResult<Json<Vec<ChecklistRecordView>>> {
    let start = Instant::now();

    let result = load_checklist(&state, &board).await.map(|records| {
        let show = params
            .show
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let records = match show {
            Some(show) => records
                .into_iter()
                .filter(|r| r.show.trim().to_lowercase() == show)
                .collect(),
            None => records,
        };
        Json(with_status_class(records))
    });

    observe("GET", "/api/v1/checklists/:board", start, &result);
    result
}

/// Per-show progress cards, best-progressed first.
///
/// GET /api/v1/checklists/:board/summary?q=
pub async fn checklist_summary(
    State(state): State<Arc<AppState>>,
    Path(board): Path<String>,
    Query(params): Query<SummaryParams>,
) -> AppResult<Json<Vec<ShowProgress>>> {
    let start = Instant::now();

    let result = load_checklist(&state, &board).await.map(|records| {
        let cards = checklist::summarize(&records);
        Json(checklist::filter_summaries(cards, &records, &params.q))
    });

    observe("GET", "/api/v1/checklists/:board/summary", start, &result);
    result
}

/// Normalize a checklist CSV posted directly.
///
/// POST /api/v1/checklists/normalize
pub async fn normalize_checklist(body: String) -> AppResult<Json<Vec<ChecklistRecordView>>> {
    let start = Instant::now();

    let matrix = matrix::parse(&body);
    let result = if matrix.is_empty() {
        Err(AppError::BadRequest("Empty CSV".to_string()))
    } else {
        Ok(Json(with_status_class(checklist::normalize(&matrix))))
    };

    observe("POST", "/api/v1/checklists/normalize", start, &result);
    result
}

// =============================================================================
// INVENTORY
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct InventoryParams {
    pub category: Option<String>,
    pub location: Option<String>,
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn inventory_view(department: &str, snapshot: &InventorySnapshot, params: &InventoryParams) -> InventoryView {
    let lines = reconcile::reconcile(&snapshot.inventory, &snapshot.in_use);
    let categories = reconcile::summarize_categories(&lines);
    let locations = reconcile::locations(&lines);
    let lines = reconcile::filter_lines(
        lines,
        blank_to_none(params.category.as_deref()),
        blank_to_none(params.location.as_deref()),
    );
    InventoryView {
        department: department.to_string(),
        groups: reconcile::group_by_item(&lines),
        lines,
        categories,
        in_use: reconcile::in_use_by_category(&snapshot.in_use),
        locations,
    }
}

/// Accept a snapshot from the source and render it. Category tiles always
/// cover the whole catalog, filters only narrow the lines.
async fn accept_snapshot(
    state: &AppState,
    department: &str,
    snapshot: InventorySnapshot,
    params: &InventoryParams,
) -> InventoryView {
    let snapshot = state.store.replace_snapshot(department, snapshot).await;
    let view = inventory_view(department, &snapshot, params);
    metrics::set_units_available(department, &view.categories);
    view
}

/// Reconciled inventory for a department. Always reloads from the source.
///
/// GET /api/v1/inventory/:department?category=&location=
pub async fn get_inventory(
    State(state): State<Arc<AppState>>,
    Path(department): Path<String>,
    Query(params): Query<InventoryParams>,
) -> AppResult<Json<InventoryView>> {
    let start = Instant::now();

    let result: AppResult<Json<InventoryView>> = async {
        let url = named_source(&state.config.inventory_sources, "inventory", &department)?;
        let snapshot = state.client.inventory(&department, url).await?;
        Ok(Json(accept_snapshot(&state, &department, snapshot, &params).await))
    }
    .await;

    observe("GET", "/api/v1/inventory/:department", start, &result);
    result
}

/// Open a checkout session (one per open checkout dialog).
///
/// POST /api/v1/inventory/:department/sessions
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Path(department): Path<String>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    named_source(&state.config.inventory_sources, "inventory", &department)?;
    let session_id = state.store.open_session(&department).await;
    tracing::debug!(department = %department, session_id = %session_id, "Checkout session opened");
    Ok((StatusCode::CREATED, Json(SessionResponse { session_id, department })))
}

/// DELETE /api/v1/inventory/:department/sessions/:id
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path((department, session_id)): Path<(String, Uuid)>,
) -> AppResult<StatusCode> {
    state.store.close_session(&department, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Quantity must be at least one and, when the cached snapshot knows the
/// item, no more than what is currently shown as available. The source has
/// the final word either way.
async fn check_quantity(state: &AppState, department: &str, request: &CheckoutRequest) -> AppResult<()> {
    if request.qty < 1 {
        return Err(AppError::BadRequest("Quantity must be at least 1".to_string()));
    }
    if let Some(snapshot) = state.store.snapshot(department).await {
        let lines = reconcile::reconcile(&snapshot.inventory, &snapshot.in_use);
        let available =
            reconcile::displayed_availability(&lines, &request.category, &request.item, &request.item_type);
        if let Some(available) = available.filter(|a| request.qty > *a) {
            return Err(AppError::BadRequest(format!(
                "Only {available} available, requested {}",
                request.qty
            )));
        }
    }
    Ok(())
}

/// Fill a blank event title / location from the chosen show.
async fn prefill_from_show(state: &AppState, request: &mut CheckoutRequest) -> AppResult<()> {
    let Some(show_id) = request.show_id.clone() else {
        return Ok(());
    };
    if !request.event_title.trim().is_empty() && !request.location.trim().is_empty() {
        return Ok(());
    }
    let url = single_source(&state.config.shows_url, "shows")?;
    let shows = state.client.shows(url).await?;
    let show = shows::find(&shows, &show_id)
        .ok_or_else(|| AppError::NotFound(format!("Show {show_id}")))?;
    if request.event_title.trim().is_empty() {
        request.event_title = show.title.clone();
    }
    if request.location.trim().is_empty() {
        request.location = show.venue.clone();
    }
    Ok(())
}

/// POST /api/v1/inventory/:department/checkout
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(department): Path<String>,
    Json(mut request): Json<CheckoutRequest>,
) -> AppResult<Json<InventoryView>> {
    let start = Instant::now();

    tracing::info!(
        department = %department,
        item = %request.item,
        qty = request.qty,
        "Checkout requested"
    );

    let result: AppResult<Json<InventoryView>> = async {
        let url = named_source(&state.config.inventory_sources, "inventory", &department)?;
        check_quantity(&state, &department, &request).await?;
        let _guard = state.store.begin_submission(&department, request.session_id).await?;
        prefill_from_show(&state, &mut request).await?;

        let outcome = state.client.checkout(&department, url, &request).await;
        metrics::record_mutation(&department, "checkout", outcome.is_ok());
        let snapshot = outcome?;
        Ok(Json(accept_snapshot(&state, &department, snapshot, &InventoryParams::default()).await))
    }
    .await;

    observe("POST", "/api/v1/inventory/:department/checkout", start, &result);
    result
}

/// POST /api/v1/inventory/:department/checkin
pub async fn checkin(
    State(state): State<Arc<AppState>>,
    Path(department): Path<String>,
    Json(request): Json<CheckinRequest>,
) -> AppResult<Json<InventoryView>> {
    let start = Instant::now();

    tracing::info!(
        department = %department,
        checkout_id = %request.checkout_id,
        qty = request.qty,
        "Check-in requested"
    );

    let result: AppResult<Json<InventoryView>> = async {
        let url = named_source(&state.config.inventory_sources, "inventory", &department)?;
        if request.qty < 1 {
            return Err(AppError::BadRequest("Quantity must be at least 1".to_string()));
        }
        let _guard = state.store.begin_submission(&department, request.session_id).await?;

        let outcome = state.client.checkin(&department, url, &request).await;
        metrics::record_mutation(&department, "checkin", outcome.is_ok());
        let snapshot = outcome?;
        Ok(Json(accept_snapshot(&state, &department, snapshot, &InventoryParams::default()).await))
    }
    .await;

    observe("POST", "/api/v1/inventory/:department/checkin", start, &result);
    result
}

// =============================================================================
// SHOWS & DEPARTMENTS
// =============================================================================

/// GET /api/v1/shows?q=&venue=&month=&event_type=&upcoming=&hide_undated=&hide_cancelled=
pub async fn list_shows(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ShowFilter>,
) -> AppResult<Json<Vec<ShowRecord>>> {
    let start = Instant::now();

    let result: AppResult<Json<Vec<ShowRecord>>> = async {
        let url = single_source(&state.config.shows_url, "shows")?;
        let shows = state.client.shows(url).await?;
        Ok(Json(filter.apply(shows, today())))
    }
    .await;

    observe("GET", "/api/v1/shows", start, &result);
    result
}

/// Best row of one department sheet for the target, with the URL it came from.
async fn lookup_department(
    state: &AppState,
    department: &str,
    url: &str,
    target: &MatchTarget,
) -> AppResult<(DepartmentRow, Vec<String>)> {
    let (rows, requested) = state
        .client
        .department_rows(department, url, department_action(department))
        .await?;
    let tried = vec![requested];
    match matcher::select_best(&rows, target) {
        Some(row) => Ok((row.clone(), tried)),
        None => Err(AppError::NoMatch {
            department: display_name(department),
            tried,
        }),
    }
}

fn department_slot(department: &str, result: AppResult<(DepartmentRow, Vec<String>)>) -> DepartmentSlot {
    match result {
        Ok((row, tried)) => DepartmentSlot {
            department: department.to_string(),
            status: SlotStatus::Ready,
            data: Some(row),
            error: None,
            tried,
        },
        Err(err) => {
            tracing::warn!(department = %department, error = %err, "Department lookup failed");
            let tried = match &err {
                AppError::NoMatch { tried, .. } => tried.clone(),
                _ => Vec::new(),
            };
            DepartmentSlot {
                department: department.to_string(),
                status: SlotStatus::Error,
                data: None,
                error: Some(err.to_string()),
                tried,
            }
        }
    }
}

/// Look the show up in every department sheet at once. Each department
/// lands in its own slot; one failing does not affect the others.
///
/// GET /api/v1/shows/:id/departments
pub async fn show_departments(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<String>,
) -> AppResult<Json<Vec<DepartmentSlot>>> {
    let start = Instant::now();

    let result: AppResult<Json<Vec<DepartmentSlot>>> = async {
        let url = single_source(&state.config.shows_url, "shows")?;
        let shows = state.client.shows(url).await?;
        let show = shows::find(&shows, &show_id)
            .ok_or_else(|| AppError::NotFound(format!("Show {show_id}")))?;
        let target = shows::match_target(show);

        let lookups = state.config.department_sources.iter().map(|(department, url)| {
            let state = &state;
            let target = &target;
            async move { department_slot(department, lookup_department(state, department, url, target).await) }
        });
        Ok(Json(join_all(lookups).await))
    }
    .await;

    observe("GET", "/api/v1/shows/:id/departments", start, &result);
    result
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchParams {
    #[serde(default)]
    pub show: String,
    #[serde(default)]
    pub venue: String,
    pub date: Option<NaiveDate>,
}

/// GET /api/v1/departments/:department/match?show=&venue=&date=
pub async fn match_department(
    State(state): State<Arc<AppState>>,
    Path(department): Path<String>,
    Query(params): Query<MatchParams>,
) -> AppResult<Json<DepartmentSlot>> {
    let start = Instant::now();

    let result: AppResult<Json<DepartmentSlot>> = async {
        if params.show.trim().is_empty() {
            return Err(AppError::BadRequest("show is required".to_string()));
        }
        let url = named_source(&state.config.department_sources, "department", &department)?;
        let target = MatchTarget {
            show_name: params.show.trim().to_string(),
            venue_label: params.venue.trim().to_string(),
            start_date: params.date,
        };
        let found = lookup_department(&state, &department, url, &target).await?;
        Ok(Json(department_slot(&department, Ok(found))))
    }
    .await;

    observe("GET", "/api/v1/departments/:department/match", start, &result);
    result
}

// =============================================================================
// SPACES
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SpacesParams {
    pub date: Option<NaiveDate>,
    pub min_minutes: Option<u32>,
}

/// Every space on one date: bookings, free gaps and, for today, whether it
/// is busy right now and what comes next.
///
/// GET /api/v1/spaces?date=&min_minutes=
pub async fn spaces_day(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SpacesParams>,
) -> AppResult<Json<Vec<SpaceDay>>> {
    let start = Instant::now();

    let result: AppResult<Json<Vec<SpaceDay>>> = async {
        let url = single_source(&state.config.spaces_url, "spaces")?;
        let rows = state.client.space_rows(url).await?;
        let events = spaces::events_from_rows(&rows);

        let date = params.date.unwrap_or_else(today);
        let min_minutes = params.min_minutes.unwrap_or(DEFAULT_MIN_GAP_MINUTES);
        let now = (date == today()).then(minutes_now);

        let days = Space::ALL
            .into_iter()
            .map(|space| {
                let mut day_events = spaces::events_for(&events, space, date);
                day_events.sort_by_key(|e| e.start_minutes);
                SpaceDay {
                    space,
                    label: space.label(),
                    busy_now: now.map(|n| spaces::is_busy_now(&day_events, n)),
                    next_event: now.and_then(|n| spaces::next_event(&day_events, n).cloned()),
                    free_gaps: spaces::find_gaps(&day_events, min_minutes),
                    events: day_events,
                }
            })
            .collect();
        Ok(Json(days))
    }
    .await;

    observe("GET", "/api/v1/spaces", start, &result);
    result
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub date: Option<NaiveDate>,
    #[serde(default = "default_mode")]
    pub mode: WindowKind,
}

fn default_mode() -> WindowKind {
    WindowKind::Week
}

/// Dated rows inside the window, one per date: rows repeating a date are
/// merged.
pub fn range_rows(rows: &[Map<String, Value>], window: &DateWindow) -> Vec<SpaceRangeRow> {
    let mut by_date: BTreeMap<NaiveDate, Vec<SpaceUsageEvent>> = BTreeMap::new();
    for row in rows {
        if let Some(date) = spaces::row_date(row).filter(|d| window.contains(*d)) {
            by_date.entry(date).or_default();
        }
    }
    for event in spaces::events_from_rows(rows) {
        if let Some(events) = by_date.get_mut(&event.date) {
            events.push(event);
        }
    }
    by_date
        .into_iter()
        .map(|(date, mut events)| {
            events.sort_by_key(|e| (e.start_minutes, e.space));
            SpaceRangeRow { date, events }
        })
        .collect()
}

/// GET /api/v1/spaces/range?date=&mode=week|month|year
pub async fn spaces_range(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeParams>,
) -> AppResult<Json<SpaceRangeResponse>> {
    let start = Instant::now();

    let result: AppResult<Json<SpaceRangeResponse>> = async {
        let url = single_source(&state.config.spaces_url, "spaces")?;
        let rows = state.client.space_rows(url).await?;
        let window = spaces::window(params.date.unwrap_or_else(today), params.mode);
        let rows = range_rows(&rows, &window);
        Ok(Json(SpaceRangeResponse { window, rows }))
    }
    .await;

    observe("GET", "/api/v1/spaces/range", start, &result);
    result
}

// =============================================================================
// HOURS & PURCHASE ORDERS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct HoursParams {
    /// `YYYY-MM`, defaults to the current month
    pub month: Option<String>,
}

/// GET /api/v1/hours/:person?month=YYYY-MM
pub async fn person_hours(
    State(state): State<Arc<AppState>>,
    Path(person): Path<String>,
    Query(params): Query<HoursParams>,
) -> AppResult<Json<HoursResponse>> {
    let start = Instant::now();

    let result: AppResult<Json<HoursResponse>> = async {
        let url = named_source(&state.config.hours_sources, "hours", &person)?;
        let month = params
            .month
            .unwrap_or_else(|| today().format("%Y-%m").to_string());
        let window = hours::month_window(&month)
            .ok_or_else(|| AppError::BadRequest(format!("month must be YYYY-MM, got {month:?}")))?;

        let mut rows = state
            .client
            .hours(&person, url, &window, &state.config.hours_timezone)
            .await?;
        hours::sort_rows(&mut rows);
        let totals = hours::totals(&rows);
        Ok(Json(HoursResponse {
            person,
            window,
            rows,
            totals,
        }))
    }
    .await;

    observe("GET", "/api/v1/hours/:person", start, &result);
    result
}

/// GET /api/v1/purchase-orders?q=&sort=&dir=
pub async fn list_purchase_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PurchaseOrderQuery>,
) -> AppResult<Json<Vec<Map<String, Value>>>> {
    let start = Instant::now();

    let result: AppResult<Json<Vec<Map<String, Value>>>> = async {
        let url = single_source(&state.config.purchase_orders_url, "purchase orders")?;
        let rows = state.client.purchase_orders(url).await?;
        Ok(Json(purchase_orders::apply(rows, &query)))
    }
    .await;

    observe("GET", "/api/v1/purchase-orders", start, &result);
    result
}
