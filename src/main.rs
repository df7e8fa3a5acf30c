// =============================================================================
// VENUE OPS SERVICE - Main Entry Point
// =============================================================================
// Backend for the venue operations dashboard.
//
// WHAT THIS SERVICE DOES:
// - Reads the production checklist boards and turns them into task records
//   and per-show progress cards
// - Reconciles each department's equipment catalog with its checkout ledger
//   and forwards checkouts / check-ins to the inventory sheets
// - Finds the best matching department sheet row (lighting, audio, video)
//   for a show
// - Parses the free-text space usage sheet into bookings, busy status and
//   free gaps
// - Serves timesheets and purchase orders
// - Exposes Prometheus metrics for observability
//
// Every piece of data lives in a spreadsheet behind a published script URL;
// the only state kept here is the last inventory snapshot per department and
// the open checkout sessions.
// =============================================================================

// -----------------------------------------------------------------------------
// MODULE DECLARATIONS
// -----------------------------------------------------------------------------
mod config;          // Configuration loading (config.rs)
mod error;           // Error types (error.rs)
mod handlers;        // HTTP request handlers (handlers.rs)
mod metrics;         // Prometheus metrics setup (metrics.rs)
mod models;          // Data structures (models.rs)
mod sources;         // Spreadsheet endpoints and their adapters
mod store;           // Inventory snapshots and checkout sessions

// Normalization core
mod checklist;
mod hours;
mod matcher;
mod matrix;
mod purchase_orders;
mod reconcile;
mod shows;
mod spaces;
mod status;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::metrics::setup_metrics;
use crate::sources::SheetsClient;
use crate::store::Store;

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Shared by every handler through State<Arc<AppState>>.
pub struct AppState {
    pub config: Config,

    // One HTTP client for every source; reqwest pools connections per host
    pub client: SheetsClient,

    pub store: Store,

    // Prometheus metrics handle
    // Used to render metrics in Prometheus format
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

// -----------------------------------------------------------------------------
// ROUTES
// -----------------------------------------------------------------------------
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // ----- Health & Readiness Endpoints -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Checklists -----
        .route("/api/v1/checklists/normalize", post(handlers::normalize_checklist))
        .route("/api/v1/checklists/:board", get(handlers::list_checklist))
        .route("/api/v1/checklists/:board/summary", get(handlers::checklist_summary))
        // ----- Inventory -----
        .route("/api/v1/inventory/:department", get(handlers::get_inventory))
        .route("/api/v1/inventory/:department/sessions", post(handlers::open_session))
        .route(
            "/api/v1/inventory/:department/sessions/:id",
            delete(handlers::close_session),
        )
        .route("/api/v1/inventory/:department/checkout", post(handlers::checkout))
        .route("/api/v1/inventory/:department/checkin", post(handlers::checkin))
        // ----- Shows & Departments -----
        .route("/api/v1/shows", get(handlers::list_shows))
        .route("/api/v1/shows/:id/departments", get(handlers::show_departments))
        .route(
            "/api/v1/departments/:department/match",
            get(handlers::match_department),
        )
        // ----- Spaces -----
        .route("/api/v1/spaces", get(handlers::spaces_day))
        .route("/api/v1/spaces/range", get(handlers::spaces_range))
        // ----- Hours & Purchase Orders -----
        .route("/api/v1/hours/:person", get(handlers::person_hours))
        .route("/api/v1/purchase-orders", get(handlers::list_purchase_orders))
        // ----- Middleware Layers -----
        // The dashboard is served from another origin
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// -----------------------------------------------------------------------------
// MAIN FUNCTION
// -----------------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // STEP 1: Load environment variables
    // -------------------------------------------------------------------------
    dotenvy::dotenv().ok(); // .env is optional

    // -------------------------------------------------------------------------
    // STEP 2: Initialize logging/tracing
    // -------------------------------------------------------------------------
    // RUST_LOG controls log levels, e.g. RUST_LOG=info,venue_ops_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,venue_ops_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Venue Ops Service...");

    // -------------------------------------------------------------------------
    // STEP 3: Load configuration
    // -------------------------------------------------------------------------
    let config = Config::from_env()?;
    info!(
        port = config.port,
        checklist_boards = config.checklist_sources.iter().count(),
        inventory_departments = config.inventory_sources.iter().count(),
        department_sheets = config.department_sources.iter().count(),
        shows = config.shows_url.is_some(),
        spaces = config.spaces_url.is_some(),
        "Configuration loaded"
    );

    // -------------------------------------------------------------------------
    // STEP 4: Set up Prometheus metrics
    // -------------------------------------------------------------------------
    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STEP 5: Create application state
    // -------------------------------------------------------------------------
    let client = SheetsClient::new(config.upstream_timeout_secs)?;
    let port = config.port;
    let state = Arc::new(AppState {
        config,
        client,
        store: Store::new(),
        metrics_handle,
    });

    // -------------------------------------------------------------------------
    // STEP 6: Start the HTTP server
    // -------------------------------------------------------------------------
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(address = %addr, "Venue Ops Service is listening");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
