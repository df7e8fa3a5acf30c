// =============================================================================
// STATUS MODULE
// =============================================================================
// Maps free-text checklist statuses onto a small fixed set of classes that
// the dashboard colours cells by and the summary cards count.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Semantic class of a raw status cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    None,
    Green,
    Amber,
    Red,
    Muted,
    Soft,
}

/// Classify a raw status string.
///
/// Case-insensitive, first match wins:
/// cancel → red, done/complete/✓/yes → green, progress/wip/pending → amber,
/// n/a/na/not applicable → muted, not started/no → none, anything else → soft.
pub fn classify(raw: &str) -> StatusClass {
    let s = raw.replace('\u{a0}', " ").trim().to_lowercase();

    if s.is_empty() {
        return StatusClass::None;
    }
    if s.contains("cancel") {
        return StatusClass::Red;
    }
    if s.contains("done") || s.contains("complete") || s == "✓" || s == "yes" {
        return StatusClass::Green;
    }
    if s.contains("progress") || s.contains("wip") || s.contains("pending") {
        return StatusClass::Amber;
    }
    if s.contains("n/a") || s == "na" || s.contains("not applicable") {
        return StatusClass::Muted;
    }
    if s.contains("not started") || s == "no" {
        return StatusClass::None;
    }
    StatusClass::Soft
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_beats_progress() {
        assert_eq!(classify("Cancelled - in progress"), StatusClass::Red);
    }

    #[test]
    fn test_empty_and_whitespace_are_none() {
        assert_eq!(classify(""), StatusClass::None);
        assert_eq!(classify("  \u{a0} "), StatusClass::None);
    }

    #[test]
    fn test_green_variants() {
        for v in ["Done", "COMPLETED", "✓", "yes", " Yes "] {
            assert_eq!(classify(v), StatusClass::Green, "{v}");
        }
    }

    #[test]
    fn test_amber_variants() {
        for v in ["In Progress", "wip", "Pending approval"] {
            assert_eq!(classify(v), StatusClass::Amber, "{v}");
        }
    }

    #[test]
    fn test_muted_variants() {
        assert_eq!(classify("N/A"), StatusClass::Muted);
        assert_eq!(classify("na"), StatusClass::Muted);
        assert_eq!(classify("Not applicable"), StatusClass::Muted);
    }

    #[test]
    fn test_not_started_and_no() {
        assert_eq!(classify("Not started"), StatusClass::None);
        assert_eq!(classify("No"), StatusClass::None);
        // "no" only matches exactly
        assert_eq!(classify("nope"), StatusClass::Soft);
    }

    #[test]
    fn test_free_text_is_soft() {
        assert_eq!(classify("ask Jo"), StatusClass::Soft);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&StatusClass::Amber).unwrap(), "\"amber\"");
    }
}
