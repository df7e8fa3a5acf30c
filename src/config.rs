// =============================================================================
// CONFIGURATION MODULE
// =============================================================================
// Loads configuration from environment variables.
//
// NOTES:
// - Every data source is a published spreadsheet script URL. Sources that come
//   in families (checklist boards, inventory departments, ...) are configured
//   as comma-separated `name=url` pairs, e.g.
//   `CHECKLIST_SOURCES=stage=https://...,audio=https://...`
// - Names are matched case-insensitively; the order given is the order the
//   dashboard lists them in
// - A malformed value fails at startup rather than on first request
// =============================================================================

use anyhow::{bail, Context, Result};
use std::env;

/// Timezone the timesheet script reports in unless told otherwise
const DEFAULT_HOURS_TIMEZONE: &str = "Asia/Dubai";

// -----------------------------------------------------------------------------
// NAMED SOURCES
// -----------------------------------------------------------------------------

/// Ordered `name -> url` list parsed from a `name=url,name=url` variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedSources(Vec<(String, String)>);

impl NamedSources {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut sources = Vec::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, url)) = pair.split_once('=') else {
                bail!("expected name=url, got {pair:?}");
            };
            let (name, url) = (name.trim().to_lowercase(), url.trim());
            if name.is_empty() || url.is_empty() {
                bail!("expected name=url, got {pair:?}");
            }
            if sources.iter().any(|(existing, _)| *existing == name) {
                bail!("source {name:?} is configured twice");
            }
            sources.push((name, url.to_string()));
        }
        Ok(Self(sources))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.trim().to_lowercase();
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, url)| url.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, u)| (n.as_str(), u.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// -----------------------------------------------------------------------------
// CONFIG STRUCT
// -----------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 8002)
    pub port: u16,

    /// Production checklist boards (stage, audio, lighting, ...)
    pub checklist_sources: NamedSources,

    /// Inventory catalog + ledger endpoint per department
    pub inventory_sources: NamedSources,

    /// Show list endpoint
    pub shows_url: Option<String>,

    /// Department detail sheets (lighting, audio, video)
    pub department_sources: NamedSources,

    /// Space usage sheet
    pub spaces_url: Option<String>,

    pub purchase_orders_url: Option<String>,

    /// Timesheet endpoint per person
    pub hours_sources: NamedSources,

    /// Timezone passed to the timesheet script
    pub hours_timezone: String,

    /// Upper bound on a single call to a source, in seconds (default: 30)
    pub upstream_timeout_secs: u64,
}

fn sources(var: &str) -> Result<NamedSources> {
    let raw = env::var(var).unwrap_or_default();
    NamedSources::parse(&raw).with_context(|| format!("Failed to parse {var}"))
}

fn optional_url(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Creates a Config by reading environment variables.
    ///
    /// Every source is optional; an unconfigured one answers 404 at request
    /// time. Only malformed values are errors.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8002".to_string())
                .parse()
                .context("Failed to parse PORT as a number")?,

            checklist_sources: sources("CHECKLIST_SOURCES")?,
            inventory_sources: sources("INVENTORY_SOURCES")?,
            shows_url: optional_url("SHOWS_URL"),
            department_sources: sources("DEPARTMENT_SOURCES")?,
            spaces_url: optional_url("SPACES_URL"),
            purchase_orders_url: optional_url("PURCHASE_ORDERS_URL"),
            hours_sources: sources("HOURS_SOURCES")?,

            hours_timezone: optional_url("HOURS_TIMEZONE")
                .unwrap_or_else(|| DEFAULT_HOURS_TIMEZONE.to_string()),

            upstream_timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Failed to parse UPSTREAM_TIMEOUT_SECS as a number")?,
        })
    }
}

/// The `action` query value a department sheet expects. The lighting
/// script takes none.
pub fn department_action(department: &str) -> Option<String> {
    let department = department.trim().to_lowercase();
    (department != "lighting").then_some(department)
}
