// =============================================================================
// RECONCILE MODULE
// =============================================================================
// Derives "out" and "available" quantities for the equipment catalog from
// the separate checked-out ledger.
//
// NOTES:
// - The ledger is matched on (category, item, type) only. Several locations
//   of the same item share one checkout pool.
// - Quantities out are clamped to the catalog total. Over-checkout is
//   reflected as "none available", never as a negative number.
// - Everything here is a pure function of its inputs: calling it twice
//   with the same snapshot gives the same answer.
// =============================================================================

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::models::{
    CategorySummary, CheckoutRecord, InUseCategory, InventoryLine, ItemGroup, ReconciledLine,
};

const UNCATEGORIZED: &str = "Uncategorized";

// -----------------------------------------------------------------------------
// MATCHING KEY
// -----------------------------------------------------------------------------

/// Normalized (category, item, type) triple the ledger is joined on.
///
/// Each part is trimmed, whitespace-collapsed and lowercased, so
/// `" Mic  Stand"` and `"mic stand"` are the same item. Being a struct
/// instead of a joined string, no item name can collide with a separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InventoryKey {
    category: String,
    item: String,
    item_type: String,
}

fn normalize_part(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl InventoryKey {
    pub fn new(category: &str, item: &str, item_type: &str) -> Self {
        Self {
            category: normalize_part(category),
            item: normalize_part(item),
            item_type: normalize_part(item_type),
        }
    }
}

impl From<&InventoryLine> for InventoryKey {
    fn from(line: &InventoryLine) -> Self {
        InventoryKey::new(&line.category, &line.item, &line.item_type)
    }
}

impl From<&CheckoutRecord> for InventoryKey {
    fn from(record: &CheckoutRecord) -> Self {
        InventoryKey::new(&record.category, &record.item, &record.item_type)
    }
}

// -----------------------------------------------------------------------------
// RECONCILIATION
// -----------------------------------------------------------------------------

/// Sum ledger quantities per matching key.
pub fn ledger_totals(ledger: &[CheckoutRecord]) -> HashMap<InventoryKey, i64> {
    let mut totals = HashMap::new();
    for record in ledger {
        *totals.entry(InventoryKey::from(record)).or_insert(0) += record.qty;
    }
    totals
}

/// Reconcile one catalog line against precomputed ledger totals.
pub fn reconcile_line(line: &InventoryLine, totals: &HashMap<InventoryKey, i64>) -> ReconciledLine {
    let total = line.total_qty;
    let out = totals
        .get(&InventoryKey::from(line))
        .copied()
        .unwrap_or(0)
        .min(total)
        .max(0);

    ReconciledLine {
        line: line.clone(),
        qty_out: out,
        qty_available: total - out,
    }
}

/// Attach `qty_out` / `qty_available` to every catalog line.
pub fn reconcile(catalog: &[InventoryLine], ledger: &[CheckoutRecord]) -> Vec<ReconciledLine> {
    let totals = ledger_totals(ledger);
    catalog.iter().map(|line| reconcile_line(line, &totals)).collect()
}

// -----------------------------------------------------------------------------
// GROUPING & AGGREGATION
// -----------------------------------------------------------------------------

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

fn category_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNCATEGORIZED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Group reconciled lines by item name.
///
/// Groups are sorted by item name and their rows by (type, location), both
/// case-insensitively. The display name is the first spelling encountered.
pub fn group_by_item(lines: &[ReconciledLine]) -> Vec<ItemGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ItemGroup> = Vec::new();

    for row in lines {
        let display = match row.line.item.trim() {
            "" => "Unknown",
            name => name,
        };
        let key = display.to_lowercase();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(ItemGroup {
                item_name: display.to_string(),
                rows: Vec::new(),
                sum_total: 0,
                sum_out: 0,
                sum_available: 0,
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.sum_total += row.line.total_qty;
        group.sum_out += row.qty_out;
        group.sum_available += row.qty_available;
        group.rows.push(row.clone());
    }

    for group in &mut groups {
        group.rows.sort_by(|a, b| {
            cmp_ignore_case(&a.line.item_type, &b.line.item_type)
                .then_with(|| cmp_ignore_case(&a.line.location, &b.line.location))
        });
    }
    groups.sort_by(|a, b| cmp_ignore_case(&a.item_name, &b.item_name));
    groups
}

/// Per-category line counts and available totals, sorted by name.
pub fn summarize_categories(lines: &[ReconciledLine]) -> Vec<CategorySummary> {
    let mut by_name: HashMap<String, CategorySummary> = HashMap::new();
    for row in lines {
        let name = category_name(&row.line.category);
        let entry = by_name.entry(name.clone()).or_insert_with(|| CategorySummary {
            name,
            total_items: 0,
            total_available: 0,
        });
        entry.total_items += 1;
        entry.total_available += row.qty_available;
    }

    let mut list: Vec<CategorySummary> = by_name.into_values().collect();
    list.sort_by(|a, b| cmp_ignore_case(&a.name, &b.name));
    list
}

/// Ledger entries grouped by category, sorted by name.
pub fn in_use_by_category(ledger: &[CheckoutRecord]) -> Vec<InUseCategory> {
    let mut by_name: HashMap<String, Vec<CheckoutRecord>> = HashMap::new();
    for record in ledger {
        by_name
            .entry(category_name(&record.category))
            .or_default()
            .push(record.clone());
    }

    let mut list: Vec<InUseCategory> = by_name
        .into_iter()
        .map(|(name, rows)| InUseCategory {
            total_checked_out: rows.iter().map(|r| r.qty).sum(),
            name,
            rows,
        })
        .collect();
    list.sort_by(|a, b| cmp_ignore_case(&a.name, &b.name));
    list
}

/// Distinct non-blank locations, sorted.
pub fn locations(lines: &[ReconciledLine]) -> Vec<String> {
    let set: BTreeSet<String> = lines
        .iter()
        .map(|r| r.line.location.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    let mut list: Vec<String> = set.into_iter().collect();
    list.sort_by(|a, b| cmp_ignore_case(a, b));
    list
}

/// Narrow lines to one category (blank matches "Uncategorized") and/or one
/// location.
pub fn filter_lines(
    lines: Vec<ReconciledLine>,
    category: Option<&str>,
    location: Option<&str>,
) -> Vec<ReconciledLine> {
    lines
        .into_iter()
        .filter(|r| category.map_or(true, |c| category_name(&r.line.category) == c.trim()))
        .filter(|r| location.map_or(true, |l| r.line.location.trim() == l.trim()))
        .collect()
}

/// Availability currently shown for an item, used as the soft upper bound
/// of a checkout form. `None` when the item is not in the snapshot.
pub fn displayed_availability(
    lines: &[ReconciledLine],
    category: &str,
    item: &str,
    item_type: &str,
) -> Option<i64> {
    let key = InventoryKey::new(category, item, item_type);
    let matching: Vec<&ReconciledLine> = lines
        .iter()
        .filter(|r| InventoryKey::from(&r.line) == key)
        .collect();
    if matching.is_empty() {
        return None;
    }
    matching.iter().map(|r| r.qty_available).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(category: &str, item: &str, item_type: &str, location: &str, total: i64) -> InventoryLine {
        InventoryLine {
            category: category.into(),
            item: item.into(),
            item_type: item_type.into(),
            location: location.into(),
            total_qty: total,
        }
    }

    fn loan(id: &str, category: &str, item: &str, item_type: &str, qty: i64) -> CheckoutRecord {
        CheckoutRecord {
            checkout_id: id.into(),
            category: category.into(),
            item: item.into(),
            item_type: item_type.into(),
            location: String::new(),
            qty,
            event_title: None,
            name: None,
        }
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            InventoryKey::new(" Audio ", "Mic   Stand", "TALL"),
            InventoryKey::new("audio", "mic stand", "tall")
        );
        // Parts never bleed into each other
        assert_ne!(InventoryKey::new("a||b", "c", ""), InventoryKey::new("a", "b||c", ""));
    }

    #[test]
    fn test_reconcile_sums_ledger_across_locations() {
        let catalog = vec![
            line("Audio", "SM58", "Wired", "Store A", 10),
            line("Audio", "SM58", "Wired", "Store B", 4),
        ];
        let ledger = vec![
            loan("1", "audio", "sm58", "wired", 3),
            loan("2", "Audio", " SM58 ", "Wired", 2),
        ];
        let lines = reconcile(&catalog, &ledger);
        // Location is not part of the key: both lines see the shared pool
        assert_eq!(lines[0].qty_out, 5);
        assert_eq!(lines[0].qty_available, 5);
        assert_eq!(lines[1].qty_out, 4);
        assert_eq!(lines[1].qty_available, 0);
    }

    #[test]
    fn test_clamp_invariant_holds_on_over_checkout() {
        let catalog = vec![
            line("LX", "Par", "", "", 2),
            line("LX", "Fresnel", "", "", 0),
            line("LX", "Profile", "", "", 3),
        ];
        let ledger = vec![
            loan("1", "LX", "Par", "", 7),
            loan("2", "LX", "Fresnel", "", 1),
            loan("3", "LX", "Profile", "", -4),
        ];
        for r in reconcile(&catalog, &ledger) {
            assert!(0 <= r.qty_out && r.qty_out <= r.line.total_qty);
            assert_eq!(r.qty_available, r.line.total_qty - r.qty_out);
        }
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let catalog = vec![line("A", "x", "t", "l", 5), line("B", "y", "", "", 3)];
        let ledger = vec![loan("1", "A", "x", "t", 2)];
        assert_eq!(reconcile(&catalog, &ledger), reconcile(&catalog, &ledger));
    }

    #[test]
    fn test_grouping_conserves_totals_and_sorts() {
        let catalog = vec![
            line("Audio", "sm58", "Wireless", "b", 3),
            line("Audio", "Cable", "XLR", "", 20),
            line("Audio", "SM58", "wired", "z", 10),
            line("Audio", "SM58", "wired", "A", 5),
        ];
        let ledger = vec![loan("1", "Audio", "SM58", "wired", 12), loan("2", "Audio", "Cable", "XLR", 1)];
        let lines = reconcile(&catalog, &ledger);
        let groups = group_by_item(&lines);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].item_name, "Cable");
        assert_eq!(groups[1].item_name, "sm58");
        let members: Vec<(&str, &str)> = groups[1]
            .rows
            .iter()
            .map(|r| (r.line.item_type.as_str(), r.line.location.as_str()))
            .collect();
        assert_eq!(members, vec![("wired", "A"), ("wired", "z"), ("Wireless", "b")]);

        let sum = |f: fn(&ItemGroup) -> i64| groups.iter().map(f).sum::<i64>();
        assert_eq!(sum(|g| g.sum_total), lines.iter().map(|l| l.line.total_qty).sum::<i64>());
        assert_eq!(sum(|g| g.sum_out), lines.iter().map(|l| l.qty_out).sum::<i64>());
        assert_eq!(sum(|g| g.sum_available), lines.iter().map(|l| l.qty_available).sum::<i64>());
    }

    #[test]
    fn test_category_summaries() {
        let catalog = vec![
            line("Video", "Projector", "", "", 2),
            line("", "Gaffer", "", "", 6),
            line("audio", "SM58", "", "", 4),
            line("Video", "Screen", "", "", 1),
        ];
        let ledger = vec![loan("1", "Video", "Projector", "", 1)];
        let cats = summarize_categories(&reconcile(&catalog, &ledger));
        let names: Vec<&str> = cats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["audio", "Uncategorized", "Video"]);
        assert_eq!(cats[2].total_items, 2);
        assert_eq!(cats[2].total_available, 2);
        assert_eq!(cats[1].total_available, 6);
    }

    #[test]
    fn test_in_use_by_category() {
        let ledger = vec![
            loan("1", "Video", "Projector", "", 1),
            loan("2", " ", "Gaffer", "", 2),
            loan("3", "Video", "Screen", "", 3),
        ];
        let groups = in_use_by_category(&ledger);
        assert_eq!(groups[0].name, "Uncategorized");
        assert_eq!(groups[1].name, "Video");
        assert_eq!(groups[1].total_checked_out, 4);
        assert_eq!(groups[1].rows.len(), 2);
    }

    #[test]
    fn test_locations_and_filters() {
        let catalog = vec![
            line("Audio", "SM58", "", "Store B", 1),
            line("Audio", "SM58", "", "store a", 1),
            line("", "Tape", "", " Store B ", 1),
            line("Audio", "DI", "", "", 1),
        ];
        let lines = reconcile(&catalog, &[]);
        assert_eq!(locations(&lines), vec!["store a", "Store B"]);

        let uncategorized = filter_lines(lines.clone(), Some("Uncategorized"), None);
        assert_eq!(uncategorized.len(), 1);
        let in_b = filter_lines(lines, Some("Audio"), Some("Store B"));
        assert_eq!(in_b.len(), 1);
        assert_eq!(in_b[0].line.item, "SM58");
    }

    #[test]
    fn test_displayed_availability() {
        let catalog = vec![line("Audio", "SM58", "Wired", "A", 4)];
        let ledger = vec![loan("1", "Audio", "SM58", "Wired", 1)];
        let lines = reconcile(&catalog, &ledger);
        assert_eq!(displayed_availability(&lines, "audio", "sm58", "wired"), Some(3));
        assert_eq!(displayed_availability(&lines, "audio", "sm57", "wired"), None);
    }
}
