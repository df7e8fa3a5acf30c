// =============================================================================
// CHECKLIST MODULE
// =============================================================================
// Reshapes the wide production checklist sheets (one column per show) into
// one record per task x show cell.
//
// The sheets have no fixed schema: the header row can sit anywhere in the
// first few rows, column titles drift ("Stage" vs "Audio Stages", several
// spellings of the roles column) and an optional "Show Lead" row above the
// header may be shifted by a column. Every detection step falls back to a
// default instead of failing.
// =============================================================================

use std::collections::HashMap;
use std::ops::Range;

use crate::models::{ChecklistRecord, ShowProgress};
use crate::status::{classify, StatusClass};

/// How many leading rows are searched for the header row
const HEADER_SCAN_ROWS: usize = 6;

const ROLES_HEADERS: &[&str] = &[
    "roles resposiblity",
    "roles responsibility",
    "roles responsibilities",
    "roles",
];

// -----------------------------------------------------------------------------
// TEXT HELPERS
// -----------------------------------------------------------------------------

/// Trim, treating non-breaking spaces as whitespace.
fn norm(s: &str) -> String {
    s.replace('\u{a0}', " ").trim().to_string()
}

/// Fold the accented Latin letters spreadsheet titles actually contain.
fn fold_diacritic(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => 'i',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ř' => 'r',
        'ś' | 'š' | 'ş' => 's',
        'ť' | 'ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Canonical form of a header cell: lowercase, no diacritics, one dash
/// style, only `[a-z0-9 -]`, single spaces.
pub fn canon(s: &str) -> String {
    let folded: String = s
        .trim()
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .map(|c| if matches!(c, '–' | '—') { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_lead_label(s: &str) -> bool {
    let key: String = canon(s).chars().filter(|c| !c.is_whitespace()).collect();
    key == "showlead" || key == "lead"
}

fn cell(row: &[String], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i)).map(|c| norm(c)).unwrap_or_default()
}

// -----------------------------------------------------------------------------
// LAYOUT DETECTION
// -----------------------------------------------------------------------------

/// Column roles found in the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    header_row: usize,
    header: Vec<String>,
    task: Option<usize>,
    owner: Option<usize>,
    stage: Option<usize>,
    notes: Option<usize>,
    roles: Option<usize>,
    /// Columns holding one show each
    shows: Range<usize>,
}

fn find_header_row(matrix: &[Vec<String>]) -> usize {
    for (i, row) in matrix.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let keys: Vec<String> = row.iter().map(|c| canon(c)).collect();
        let has = |name: &str| keys.iter().any(|k| k == name);
        if has("task") && (has("owner") || has("stage") || has("audio stages")) {
            return i;
        }
    }
    tracing::debug!("No checklist header row found, defaulting to row 0");
    0
}

fn detect_layout(matrix: &[Vec<String>]) -> Layout {
    let header_row = find_header_row(matrix);
    let header: Vec<String> = matrix
        .get(header_row)
        .map(|r| r.iter().map(|c| norm(c)).collect())
        .unwrap_or_default();
    let keys: Vec<String> = header.iter().map(|h| canon(h)).collect();
    let find = |names: &[&str]| keys.iter().position(|k| names.contains(&k.as_str()));

    let task = find(&["task"]);
    let owner = find(&["owner"]);
    let stage = find(&["stage", "audio stages"]);
    let notes = find(&["notes"]);
    let roles = find(ROLES_HEADERS);

    let start = [task, owner, stage, roles]
        .into_iter()
        .flatten()
        .max()
        .map(|i| i + 1)
        .unwrap_or(1);
    let end = notes.unwrap_or(header.len());

    Layout {
        header_row,
        header,
        task,
        owner,
        stage,
        notes,
        roles,
        shows: start..end.max(start),
    }
}

/// Resolve the show lead for each show column from the row above the
/// header, if that row looks like a lead row.
///
/// Prefers the cell directly above a show column. When that is blank (or
/// is the label itself) the name is read offset-aligned from the first
/// column after the label, which covers sheets whose lead row is shifted
/// one column right of the data.
fn resolve_leads(matrix: &[Vec<String>], layout: &Layout) -> HashMap<usize, String> {
    let mut leads = HashMap::new();
    if layout.header_row == 0 {
        return leads;
    }

    let row: Vec<String> = matrix[layout.header_row - 1].iter().map(|c| norm(c)).collect();
    let start = layout.shows.start;

    let label_col = row.iter().position(|c| is_lead_label(c));
    let has_names = row
        .get(layout.shows.clone())
        .map(|cells| cells.iter().any(|c| !c.is_empty()))
        .unwrap_or(false);
    if label_col.is_none() && !has_names {
        return leads;
    }

    let names_start = match label_col {
        Some(label) if label <= start => start.max(label + 1),
        Some(_) if row.get(start).is_some_and(|c| is_lead_label(c)) => start + 1,
        _ => start,
    };

    for col in layout.shows.clone() {
        let direct = row.get(col).filter(|c| !c.is_empty() && !is_lead_label(c));
        let shifted = row
            .get(names_start + (col - start))
            .filter(|c| !c.is_empty() && !is_lead_label(c));
        if let Some(name) = direct.or(shifted) {
            leads.insert(col, name.clone());
        }
    }

    leads
}

// -----------------------------------------------------------------------------
// NORMALIZATION
// -----------------------------------------------------------------------------

/// Flatten a checklist matrix into one record per (task row x show column).
///
/// Rows with neither a task nor any status in the show columns are dropped.
pub fn normalize(matrix: &[Vec<String>]) -> Vec<ChecklistRecord> {
    if matrix.is_empty() {
        return Vec::new();
    }

    let layout = detect_layout(matrix);
    let leads = resolve_leads(matrix, &layout);
    let mut out = Vec::new();

    for row in &matrix[layout.header_row + 1..] {
        let task = cell(row, layout.task);
        let has_status = layout
            .shows
            .clone()
            .any(|c| row.get(c).is_some_and(|v| !norm(v).is_empty()));
        if task.is_empty() && !has_status {
            continue;
        }

        let stage = cell(row, layout.stage);
        let row_owner = cell(row, layout.owner);
        let base_note = cell(row, layout.notes);
        let roles = cell(row, layout.roles);
        let note = match (roles.is_empty(), base_note.is_empty()) {
            (false, false) => format!("{roles} | {base_note}"),
            (false, true) => roles,
            _ => base_note,
        };

        for col in layout.shows.clone() {
            let show = layout
                .header
                .get(col)
                .filter(|h| !h.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("Show {}", col - layout.shows.start + 1));
            let lead = leads.get(&col).cloned().unwrap_or_default();
            let owner = if row_owner.is_empty() { lead.clone() } else { row_owner.clone() };

            out.push(ChecklistRecord {
                task: task.clone(),
                stage: stage.clone(),
                owner,
                show,
                status: cell(row, Some(col)),
                note: note.clone(),
                lead,
            });
        }
    }

    out
}

// -----------------------------------------------------------------------------
// SUMMARY CARDS
// -----------------------------------------------------------------------------

const UNTITLED_SHOW: &str = "Untitled Show";

/// Card a record is counted under.
fn card_key(record: &ChecklistRecord) -> &str {
    if record.show.trim().is_empty() {
        UNTITLED_SHOW
    } else {
        &record.show
    }
}

/// Group records by show and count done / in progress / cancelled cells.
///
/// Cards are ordered by done ratio, highest first; shows with equal ratios
/// keep the order they first appear in.
pub fn summarize(records: &[ChecklistRecord]) -> Vec<ShowProgress> {
    let mut order: Vec<String> = Vec::new();
    let mut by_show: HashMap<String, Vec<&ChecklistRecord>> = HashMap::new();
    for r in records {
        let key = card_key(r).to_string();
        if !by_show.contains_key(&key) {
            order.push(key.clone());
        }
        by_show.entry(key).or_default().push(r);
    }

    let mut cards: Vec<ShowProgress> = order
        .into_iter()
        .map(|show| {
            let items = &by_show[&show];
            let count = |class: StatusClass| items.iter().filter(|r| classify(&r.status) == class).count();
            let total = items.len();
            let done = count(StatusClass::Green);
            let lead = items
                .iter()
                .map(|r| r.lead.trim())
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string();
            ShowProgress {
                percent_done: ((done as f64 / total.max(1) as f64) * 100.0).round() as u32,
                progress: count(StatusClass::Amber),
                cancelled: count(StatusClass::Red),
                show,
                total,
                done,
                lead,
            }
        })
        .collect();

    cards.sort_by(|a, b| {
        let ra = a.done as f64 / a.total.max(1) as f64;
        let rb = b.done as f64 / b.total.max(1) as f64;
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
    cards
}

/// Keep cards whose show name matches `query`, or that have a task or status
/// containing it.
pub fn filter_summaries(
    cards: Vec<ShowProgress>,
    records: &[ChecklistRecord],
    query: &str,
) -> Vec<ShowProgress> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return cards;
    }
    cards
        .into_iter()
        .filter(|c| {
            c.show.to_lowercase().contains(&q)
                || records.iter().any(|r| {
                    card_key(r) == c.show
                        && (r.status.to_lowercase().contains(&q) || r.task.to_lowercase().contains(&q))
                })
        })
        .collect()
}
