// =============================================================================
// SOURCES MODULE
// =============================================================================
// The spreadsheet endpoints and how to read them.
//
// Every source is a published sheet script answering GET requests with JSON
// (or, for the checklist boards, CSV). Their shapes drifted over the years,
// so each source gets one adapter here that sniffs the shape once, turns it
// into our typed model and fails closed: unknown shapes become empty results
// or an `UpstreamFormat` error, never half-read data.
//
// NOTES:
// - Adapters are plain functions over `serde_json::Value` so they can be
//   tested without a network
// - Every request carries a `cb=<millis>` cache buster; the scripts sit
//   behind a CDN that otherwise serves stale sheets
// =============================================================================

use std::time::{Duration, Instant};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::{Map, Value};

use crate::checklist;
use crate::error::{AppError, AppResult};
use crate::hours;
use crate::matrix;
use crate::metrics;
use crate::models::{
    CheckinRequest, CheckoutRecord, CheckoutRequest, ChecklistRecord, DateWindow, DepartmentRow,
    InventoryLine, InventorySnapshot, ShowRecord,
};
use crate::shows;

static UNKNOWN_ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)unknown action").expect("valid unknown-action regex"));

const USER_AGENT: &str = concat!("venue-ops-service/", env!("CARGO_PKG_VERSION"));

/// Raw answer from a source.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// The URL actually requested, cache buster included
    pub url: String,
    pub content_type: String,
    pub body: String,
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
}

/// Append query parameters to a configured URL, keeping any query it
/// already carries.
pub fn request_url(base: &str, params: &[(&str, String)]) -> AppResult<Url> {
    Url::parse_with_params(base, params)
        .map_err(|e| AppError::Internal(format!("Invalid source URL {base:?}: {e}")))
}

/// Add `action=<action>` unless the configured URL already picks one.
fn with_default_action(base: &str, action: &str) -> Vec<(&'static str, String)> {
    if base.contains("action=") {
        Vec::new()
    } else {
        vec![("action", action.to_string())]
    }
}

impl SheetsClient {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http })
    }

    /// GET a source. `source` names it in logs and metrics.
    pub async fn fetch(&self, source: &str, base: &str, params: &[(&str, String)]) -> AppResult<Fetched> {
        let mut params = params.to_vec();
        params.push(("cb", Utc::now().timestamp_millis().to_string()));
        let url = request_url(base, &params)?;

        tracing::debug!(source = %source, url = %url, "Fetching source");
        let start = Instant::now();

        let result = self.http.get(url.clone()).send().await;
        metrics::record_upstream_request(source, start.elapsed().as_secs_f64());

        let response = result.map_err(|e| {
            tracing::warn!(source = %source, error = %e, "Source request failed");
            AppError::Upstream(e)
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(source = %source, status = status.as_u16(), "Source returned an error status");
            return Err(AppError::upstream_status(status.as_u16(), &body));
        }

        Ok(Fetched {
            url: url.to_string(),
            content_type,
            body,
        })
    }

    /// GET a source and parse its body as JSON.
    pub async fn fetch_json(&self, source: &str, base: &str, params: &[(&str, String)]) -> AppResult<(Value, String)> {
        let fetched = self.fetch(source, base, params).await?;
        let json = parse_json(source, &fetched.body)?;
        Ok((json, fetched.url))
    }

    // -------------------------------------------------------------------------
    // CHECKLISTS
    // -------------------------------------------------------------------------

    pub async fn checklist(&self, board: &str, base: &str) -> AppResult<Vec<ChecklistRecord>> {
        let fetched = self.fetch(&format!("checklist:{board}"), base, &[]).await?;
        interpret_checklist(&fetched.content_type, &fetched.body)
    }

    // -------------------------------------------------------------------------
    // INVENTORY
    // -------------------------------------------------------------------------

    /// Catalog and ledger in one call, or two calls for scripts that predate
    /// `action=all`.
    pub async fn inventory(&self, department: &str, base: &str) -> AppResult<InventorySnapshot> {
        let source = format!("inventory:{department}");
        let (json, _) = self
            .fetch_json(&source, base, &[("action", "all".to_string())])
            .await?;

        match interpret_snapshot(&json)? {
            SnapshotShape::Snapshot(snapshot) => Ok(snapshot),
            SnapshotShape::UnknownAction => {
                tracing::info!(department = %department, "Source lacks action=all, loading catalog and ledger separately");
                let inventory_params = [("action", "getInventory".to_string())];
                let in_use_params = [("action", "getCheckedOut".to_string())];
                let (inventory, in_use) = tokio::try_join!(
                    self.fetch_json(&source, base, &inventory_params),
                    self.fetch_json(&source, base, &in_use_params),
                )?;
                Ok(InventorySnapshot {
                    inventory: data_array(&inventory.0, "Failed inventory")?
                        .iter()
                        .filter_map(inventory_line)
                        .collect(),
                    in_use: data_array(&in_use.0, "Failed in use")?
                        .iter()
                        .filter_map(checkout_record)
                        .collect(),
                })
            }
        }
    }

    /// Submit a checkout; the answer is the new authoritative snapshot.
    pub async fn checkout(&self, department: &str, base: &str, request: &CheckoutRequest) -> AppResult<InventorySnapshot> {
        let (json, _) = self
            .fetch_json(&format!("inventory:{department}"), base, &checkout_params(request))
            .await?;
        mutation_snapshot(&json, "Checkout failed")
    }

    pub async fn checkin(&self, department: &str, base: &str, request: &CheckinRequest) -> AppResult<InventorySnapshot> {
        let (json, _) = self
            .fetch_json(&format!("inventory:{department}"), base, &checkin_params(request))
            .await?;
        mutation_snapshot(&json, "Checkin failed")
    }

    // -------------------------------------------------------------------------
    // SHOWS & DEPARTMENTS
    // -------------------------------------------------------------------------

    pub async fn shows(&self, base: &str) -> AppResult<Vec<ShowRecord>> {
        let mut params = with_default_action(base, "shows");
        params.push(("includeCancelled", "true".to_string()));
        let (json, _) = self.fetch_json("shows", base, &params).await?;
        Ok(shows::normalize_shows(&json))
    }

    /// Candidate rows of a department sheet, plus the URL that served them.
    pub async fn department_rows(
        &self,
        department: &str,
        base: &str,
        action: Option<String>,
    ) -> AppResult<(Vec<DepartmentRow>, String)> {
        let params: Vec<(&str, String)> = action.map(|a| ("action", a)).into_iter().collect();
        let (json, url) = self
            .fetch_json(&format!("department:{department}"), base, &params)
            .await?;
        Ok((department_rows(&json), url))
    }

    // -------------------------------------------------------------------------
    // SPACES, HOURS, PURCHASE ORDERS
    // -------------------------------------------------------------------------

    pub async fn space_rows(&self, base: &str) -> AppResult<Vec<Map<String, Value>>> {
        let params = with_default_action(base, "spacesUsage");
        let (json, _) = self.fetch_json("spaces", base, &params).await?;
        Ok(space_rows(&json))
    }

    pub async fn hours(
        &self,
        person: &str,
        base: &str,
        window: &DateWindow,
        timezone: &str,
    ) -> AppResult<Vec<Map<String, Value>>> {
        let params = hours::request_params(window, timezone);
        let (json, _) = self
            .fetch_json(&format!("hours:{person}"), base, &params)
            .await?;
        hours_rows(&json)
    }

    pub async fn purchase_orders(&self, base: &str) -> AppResult<Vec<Map<String, Value>>> {
        let (json, _) = self.fetch_json("purchase_orders", base, &[]).await?;
        purchase_order_rows(&json)
    }
}

// =============================================================================
// ADAPTERS
// =============================================================================

pub fn parse_json(source: &str, body: &str) -> AppResult<Value> {
    serde_json::from_str(body)
        .map_err(|e| AppError::UpstreamFormat(format!("Invalid JSON from {source}: {e}")))
}

fn objects(values: &[Value]) -> Vec<Map<String, Value>> {
    values
        .iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

/// `{ok: false, error}` as a remote refusal.
fn remote_refusal(json: &Value, fallback: &str) -> Option<AppError> {
    if json.get("ok").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    let message = json
        .get("error")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback);
    Some(AppError::Remote(message.to_string()))
}

// -----------------------------------------------------------------------------
// Checklist boards
// -----------------------------------------------------------------------------

/// Read a checklist board answer:
/// - JSON `{rows: [...]}` already holds records
/// - `error,<message>` is the script reporting a failure
/// - CSV (by content type, or a body starting `Task,`) is the raw sheet
pub fn interpret_checklist(content_type: &str, body: &str) -> AppResult<Vec<ChecklistRecord>> {
    if content_type.contains("application/json") {
        if let Ok(json) = serde_json::from_str::<Value>(body) {
            if let Some(rows) = json.get("rows").and_then(Value::as_array) {
                return Ok(rows
                    .iter()
                    .filter_map(|r| serde_json::from_value(r.clone()).ok())
                    .collect());
            }
        }
    }

    if let Some(rest) = body.strip_prefix("error,") {
        let message = rest.trim_end_matches(['\r', '\n']);
        let message = message.strip_prefix('"').unwrap_or(message);
        let message = message.strip_suffix('"').unwrap_or(message);
        return Err(AppError::Remote(message.to_string()));
    }

    if content_type.contains("text/csv") || body.trim_start().starts_with("Task,") {
        let matrix = matrix::parse(body);
        if matrix.is_empty() {
            return Err(AppError::UpstreamFormat("Empty CSV".to_string()));
        }
        return Ok(checklist::normalize(&matrix));
    }

    Err(AppError::UpstreamFormat("Unknown response type".to_string()))
}

// -----------------------------------------------------------------------------
// Inventory
// -----------------------------------------------------------------------------

/// Quantities arrive as numbers or numeric text; anything else is zero.
pub fn lenient_qty(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f.round() as i64).unwrap_or(0),
        _ => 0,
    }
}

fn lenient_text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| match obj.get(*k) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

pub fn inventory_line(value: &Value) -> Option<InventoryLine> {
    let obj = value.as_object()?;
    Some(InventoryLine {
        category: lenient_text(obj, &["category", "Category"]),
        item: lenient_text(obj, &["item", "Item", "name"]),
        item_type: lenient_text(obj, &["type", "Type"]),
        location: lenient_text(obj, &["location", "Location"]),
        // the only place a catalog total enters; never negative past here
        total_qty: lenient_qty(first_present(obj, &["totalQty", "total", "Total Qty"])).max(0),
    })
}

pub fn checkout_record(value: &Value) -> Option<CheckoutRecord> {
    let obj = value.as_object()?;
    let optional = |keys: &[&str]| Some(lenient_text(obj, keys)).filter(|s| !s.is_empty());
    Some(CheckoutRecord {
        checkout_id: lenient_text(obj, &["checkoutId", "id", "Checkout ID"]),
        category: lenient_text(obj, &["category", "Category"]),
        item: lenient_text(obj, &["item", "Item", "name"]),
        item_type: lenient_text(obj, &["type", "Type"]),
        location: lenient_text(obj, &["location", "Location"]),
        qty: lenient_qty(first_present(obj, &["qty", "Qty", "quantity"])),
        event_title: optional(&["eventTitle", "event", "Event"]),
        name: optional(&["name", "Name", "person"]),
    })
}

fn snapshot_from(inventory: &[Value], in_use: &[Value]) -> InventorySnapshot {
    InventorySnapshot {
        inventory: inventory.iter().filter_map(inventory_line).collect(),
        in_use: in_use.iter().filter_map(checkout_record).collect(),
    }
}

/// The catalog and ledger arrays of a snapshot-carrying answer:
/// top-level `inventory`/`inuse`, or the same under `data` (where `data`
/// may also be the bare catalog).
fn snapshot_arrays(json: &Value) -> (&[Value], &[Value]) {
    let data = json.get("data");
    let inventory = json
        .get("inventory")
        .and_then(Value::as_array)
        .or_else(|| data.and_then(Value::as_array))
        .or_else(|| data.and_then(|d| d.get("inventory")).and_then(Value::as_array));
    let in_use = json
        .get("inuse")
        .and_then(Value::as_array)
        .or_else(|| data.and_then(|d| d.get("inuse")).and_then(Value::as_array));
    (
        inventory.map(Vec::as_slice).unwrap_or(&[]),
        in_use.map(Vec::as_slice).unwrap_or(&[]),
    )
}

#[derive(Debug, PartialEq)]
pub enum SnapshotShape {
    Snapshot(InventorySnapshot),
    /// The script has no `action=all`; ask for each half separately
    UnknownAction,
}

/// Read an `action=all` answer.
pub fn interpret_snapshot(json: &Value) -> AppResult<SnapshotShape> {
    if let Value::Array(inventory) = json {
        return Ok(SnapshotShape::Snapshot(snapshot_from(inventory, &[])));
    }
    let unknown_action = json
        .get("error")
        .and_then(Value::as_str)
        .is_some_and(|e| UNKNOWN_ACTION_RE.is_match(e));
    if unknown_action && json.get("ok").and_then(Value::as_bool) == Some(false) {
        return Ok(SnapshotShape::UnknownAction);
    }
    if let Some(err) = remote_refusal(json, "Failed to load inventory") {
        return Err(err);
    }
    let (inventory, in_use) = snapshot_arrays(json);
    Ok(SnapshotShape::Snapshot(snapshot_from(inventory, in_use)))
}

/// `{ok: true, data: [...]}` from the split catalog / ledger actions.
pub fn data_array<'a>(json: &'a Value, fallback: &str) -> AppResult<&'a [Value]> {
    if json.get("ok").and_then(Value::as_bool) != Some(true) {
        return Err(remote_refusal(json, fallback).unwrap_or_else(|| AppError::Remote(fallback.to_string())));
    }
    Ok(json
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]))
}

/// Answer to a checkout or check-in. Anything but `ok: true` is a refusal.
pub fn mutation_snapshot(json: &Value, fallback: &str) -> AppResult<InventorySnapshot> {
    if json.get("ok").and_then(Value::as_bool) != Some(true) {
        return Err(remote_refusal(json, fallback).unwrap_or_else(|| AppError::Remote(fallback.to_string())));
    }
    let (inventory, in_use) = snapshot_arrays(json);
    Ok(snapshot_from(inventory, in_use))
}

pub fn checkout_params(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
    vec![
        ("action", "checkout".to_string()),
        ("item", request.item.clone()),
        ("category", request.category.clone()),
        ("type", request.item_type.clone()),
        ("qty", request.qty.to_string()),
        ("eventTitle", request.event_title.clone()),
        // older scripts read `event`
        ("event", request.event_title.clone()),
        ("location", request.location.clone()),
        ("name", request.name.clone()),
    ]
}

pub fn checkin_params(request: &CheckinRequest) -> Vec<(&'static str, String)> {
    vec![
        ("action", "checkin".to_string()),
        ("id", request.checkout_id.clone()),
        ("checkoutId", request.checkout_id.clone()),
        ("qty", request.qty.to_string()),
    ]
}

// -----------------------------------------------------------------------------
// Department sheets
// -----------------------------------------------------------------------------

/// Items of a department answer as objects. With `headers`, positional
/// rows are keyed by header; without, by `Col 1`, `Col 2`, ...
pub fn department_rows(json: &Value) -> Vec<DepartmentRow> {
    let items = json
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let headers: Option<Vec<String>> = json.get("headers").and_then(Value::as_array).map(|hs| {
        hs.iter()
            .map(|h| match h {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect()
    });

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| match (item, &headers) {
            (Value::Object(obj), _) => obj.clone(),
            (Value::Array(cells), Some(headers)) => headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), cells.get(i).cloned().unwrap_or(Value::Null)))
                .collect(),
            (Value::Array(cells), None) => cells
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("Col {}", i + 1), v.clone()))
                .collect(),
            (other, Some(_)) => Map::from_iter([("value".to_string(), other.clone())]),
            (other, None) => Map::from_iter([
                ("value".to_string(), other.clone()),
                ("index".to_string(), Value::from(idx)),
            ]),
        })
        .collect()
}

// -----------------------------------------------------------------------------
// Spaces, hours, purchase orders
// -----------------------------------------------------------------------------

/// `{rows: [...]}` or a bare array of per-date rows.
pub fn space_rows(json: &Value) -> Vec<Map<String, Value>> {
    match json {
        Value::Array(rows) => objects(rows),
        other => other
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| objects(rows))
            .unwrap_or_default(),
    }
}

pub fn hours_rows(json: &Value) -> AppResult<Vec<Map<String, Value>>> {
    if let Some(err) = remote_refusal(json, "Hours API error") {
        return Err(err);
    }
    Ok(json
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| objects(rows))
        .unwrap_or_default())
}

pub fn purchase_order_rows(json: &Value) -> AppResult<Vec<Map<String, Value>>> {
    if json.get("ok").and_then(Value::as_bool) != Some(true) {
        return Err(remote_refusal(json, "Failed").unwrap_or_else(|| AppError::Remote("Failed".to_string())));
    }
    Ok(json
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| objects(rows))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::header, response::IntoResponse, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    // -------------------------------------------------------------------------
    // Checklist interpretation
    // -------------------------------------------------------------------------

    #[test]
    fn test_checklist_json_rows() {
        let body = r#"{"rows":[{"task":"Rig","show":"Hamlet","status":"Done"},"junk"]}"#;
        let records = interpret_checklist("application/json; charset=utf-8", body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task, "Rig");
    }

    #[test]
    fn test_checklist_error_sentinel() {
        let err = interpret_checklist("text/plain", "error,\"Sheet not found\"\n").unwrap_err();
        assert!(matches!(err, AppError::Remote(ref m) if m == "Sheet not found"));
    }

    #[test]
    fn test_checklist_csv_by_prefix() {
        let body = "Task,Owner,Hamlet\nRig,Jo,Done\n";
        let records = interpret_checklist("text/plain", body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].show, "Hamlet");
        assert_eq!(records[0].status, "Done");
    }

    #[test]
    fn test_checklist_empty_and_unknown() {
        let err = interpret_checklist("text/csv", "").unwrap_err();
        assert!(matches!(err, AppError::UpstreamFormat(ref m) if m == "Empty CSV"));
        let err = interpret_checklist("text/html", "<html>").unwrap_err();
        assert!(matches!(err, AppError::UpstreamFormat(ref m) if m == "Unknown response type"));
    }

    // -------------------------------------------------------------------------
    // Inventory adapters
    // -------------------------------------------------------------------------

    #[test]
    fn test_lenient_rows() {
        let line = inventory_line(&json!({"category": "Mics", "name": "SM58", "type": "Wired", "total": "12"})).unwrap();
        assert_eq!(line.item, "SM58");
        assert_eq!(line.total_qty, 12);
        assert!(inventory_line(&json!("SM58")).is_none());

        let negative = inventory_line(&json!({"item": "Par", "totalQty": -3})).unwrap();
        assert_eq!(negative.total_qty, 0);
        let negative = inventory_line(&json!({"item": "Par", "total": "-2.6"})).unwrap();
        assert_eq!(negative.total_qty, 0);

        let rec = checkout_record(&json!({"id": 7, "item": "SM58", "qty": 2.0, "event": "Hamlet"})).unwrap();
        assert_eq!(rec.checkout_id, "7");
        assert_eq!(rec.qty, 2);
        assert_eq!(rec.event_title.as_deref(), Some("Hamlet"));
        assert_eq!(rec.name, None);
    }

    #[test]
    fn test_negative_totals_keep_group_sums_conserved() {
        let catalog: Vec<InventoryLine> = [
            json!({"item": "Par", "totalQty": -3}),
            json!({"item": "Par", "type": "LED", "totalQty": 4}),
        ]
        .iter()
        .filter_map(inventory_line)
        .collect();
        let lines = crate::reconcile::reconcile(&catalog, &[]);
        let groups = crate::reconcile::group_by_item(&lines);

        let line_sum: i64 = lines.iter().map(|l| l.line.total_qty).sum();
        let group_sum: i64 = groups.iter().map(|g| g.sum_total).sum();
        assert_eq!(line_sum, 4);
        assert_eq!(group_sum, line_sum);
    }

    #[test]
    fn test_snapshot_shapes() {
        let bare = interpret_snapshot(&json!([{"item": "SM58", "totalQty": 4}])).unwrap();
        match bare {
            SnapshotShape::Snapshot(s) => {
                assert_eq!(s.inventory.len(), 1);
                assert!(s.in_use.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }

        let nested = interpret_snapshot(&json!({"ok": true, "data": {"inventory": [{"item": "A"}], "inuse": [{"id": "c1"}]}})).unwrap();
        match nested {
            SnapshotShape::Snapshot(s) => assert_eq!((s.inventory.len(), s.in_use.len()), (1, 1)),
            other => panic!("unexpected {other:?}"),
        }

        let legacy = interpret_snapshot(&json!({"ok": false, "error": "Unknown action: all"})).unwrap();
        assert_eq!(legacy, SnapshotShape::UnknownAction);

        let refused = interpret_snapshot(&json!({"ok": false, "error": "Sheet locked"}));
        assert!(matches!(refused, Err(AppError::Remote(ref m)) if m == "Sheet locked"));
    }

    #[test]
    fn test_mutation_refusal_is_verbatim() {
        let err = mutation_snapshot(&json!({"ok": false, "error": "Only 2 available"}), "Checkout failed").unwrap_err();
        assert!(matches!(err, AppError::Remote(ref m) if m == "Only 2 available"));
        let err = mutation_snapshot(&json!({}), "Checkout failed").unwrap_err();
        assert!(matches!(err, AppError::Remote(ref m) if m == "Checkout failed"));
    }

    // -------------------------------------------------------------------------
    // Other shapes
    // -------------------------------------------------------------------------

    #[test]
    fn test_department_rows_with_headers() {
        let rows = department_rows(&json!({"headers": [" Show Name ", "Venue"], "items": [["Hamlet", "Red Theatre"], ["Lear"], {"Show": "x"}, 5]}));
        assert_eq!(rows[0]["Show Name"], "Hamlet");
        assert_eq!(rows[1]["Venue"], Value::Null);
        assert_eq!(rows[2]["Show"], "x");
        assert_eq!(rows[3]["value"], 5);
    }

    #[test]
    fn test_department_rows_without_headers() {
        let rows = department_rows(&json!({"items": [["Hamlet", "Red Theatre"], "loose"]}));
        assert_eq!(rows[0]["Col 2"], "Red Theatre");
        assert_eq!(rows[1]["index"], 1);
        assert!(department_rows(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_space_and_po_rows() {
        assert_eq!(space_rows(&json!({"rows": [{"date": "2025-11-05"}, 3]})).len(), 1);
        assert_eq!(space_rows(&json!([{"date": "2025-11-05"}])).len(), 1);
        assert!(space_rows(&json!({"nothing": true})).is_empty());

        assert_eq!(purchase_order_rows(&json!({"ok": true, "rows": [{"PO #": 1}]})).unwrap().len(), 1);
        assert!(purchase_order_rows(&json!({"ok": false, "error": "nope"})).is_err());
    }

    #[test]
    fn test_request_url_keeps_existing_query() {
        let url = request_url("http://sheets.test/exec?sheet=lx", &[("action", "audio".to_string())]).unwrap();
        assert_eq!(url.as_str(), "http://sheets.test/exec?sheet=lx&action=audio");
        assert!(request_url("not a url", &[]).is_err());
    }

    // -------------------------------------------------------------------------
    // Client against an in-process sheet script
    // -------------------------------------------------------------------------

    async fn legacy_inventory(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        assert!(q.contains_key("cb"));
        Json(match q.get("action").map(String::as_str) {
            Some("all") => json!({"ok": false, "error": "Unknown action"}),
            Some("getInventory") => json!({"ok": true, "data": [{"category": "Mics", "item": "SM58", "type": "", "totalQty": 6}]}),
            Some("getCheckedOut") => json!({"ok": true, "data": [{"id": "c1", "category": "mics", "item": "sm58", "qty": 2}]}),
            Some("checkout") => json!({"ok": false, "error": format!("Only {} left", 4)}),
            _ => json!({"ok": false, "error": "bad action"}),
        })
    }

    async fn csv_board() -> impl IntoResponse {
        ([(header::CONTENT_TYPE, "text/csv")], "Task,Owner,Hamlet\nRig,Jo,Done\n")
    }

    async fn spawn_sheets() -> String {
        let app = Router::new()
            .route("/inventory", get(legacy_inventory))
            .route("/board", get(csv_board))
            .route("/broken", get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "script crashed") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_inventory_fallback_to_split_actions() {
        let base = spawn_sheets().await;
        let client = SheetsClient::new(5).unwrap();
        let snapshot = client.inventory("audio", &format!("{base}/inventory")).await.unwrap();
        assert_eq!(snapshot.inventory.len(), 1);
        assert_eq!(snapshot.in_use[0].checkout_id, "c1");
    }

    #[tokio::test]
    async fn test_checkout_refusal_reaches_caller() {
        let base = spawn_sheets().await;
        let client = SheetsClient::new(5).unwrap();
        let request = CheckoutRequest {
            session_id: Uuid::new_v4(),
            category: "Mics".into(),
            item: "SM58".into(),
            item_type: String::new(),
            qty: 5,
            event_title: "Hamlet".into(),
            location: String::new(),
            name: "Jo".into(),
            show_id: None,
        };
        let err = client
            .checkout("audio", &format!("{base}/inventory"), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Remote(ref m) if m == "Only 4 left"));
    }

    #[tokio::test]
    async fn test_csv_board_and_error_status() {
        let base = spawn_sheets().await;
        let client = SheetsClient::new(5).unwrap();
        let records = client.checklist("stage", &format!("{base}/board")).await.unwrap();
        assert_eq!(records.len(), 1);

        let err = client.checklist("stage", &format!("{base}/broken")).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamStatus { status: 500, .. }));
    }
}
