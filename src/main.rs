pub mod api;
mod cancel;
mod channel;
mod config;
mod emergency;
mod geo;
mod geofence;
mod models;
mod notify;
mod status;
mod store;
mod tracking;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api::ApiState;
use config::Config;
use emergency::EmergencyDispatcher;
use geofence::GeofenceMonitor;
use status::TripStatusMachine;
use store::{SqliteStore, TrackingStore};
use tracking::SessionManager;

#[derive(OpenApi)]
#[openapi(
    info(title = "Live Trip Tracking API", version = "0.1.0"),
    paths(
        api::locations::report_location,
        api::locations::latest_location,
        api::locations::list_locations,
        api::status::set_status,
        api::status::get_status,
        api::pickup::start_pickup_monitor,
        api::pickup::stop_pickup_monitor,
        api::emergency::trigger_sos,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::locations::ReportLocationRequest,
        api::locations::ReportLocationResponse,
        api::locations::LocationListResponse,
        api::status::SetStatusRequest,
        api::status::DestinationPoint,
        api::pickup::PickupMonitorRequest,
        api::pickup::PickupMonitorResponse,
        api::emergency::SosRequest,
        api::emergency::SosResponse,
        api::health::HealthResponse,
        models::Coordinate,
        models::LocationSample,
        models::TripStatus,
        models::TripTrackingStatus,
    )),
    tags(
        (name = "locations", description = "Live position ingest and reads"),
        (name = "status", description = "Trip tracking-status lifecycle"),
        (name = "pickup", description = "Pickup-zone geofence monitoring"),
        (name = "emergency", description = "SOS alerts and fan-out"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!("Loaded configuration");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static("x-user-id"),
            ])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Initialize SQLite database
    let cwd = std::env::current_dir().expect("Failed to get current directory");
    let db_path = cwd.join("database");
    if let Err(e) = std::fs::create_dir_all(&db_path) {
        tracing::warn!("Could not create database directory: {}", e);
    }
    let db_file = db_path.join("data.db");
    tracing::info!("Database path: {}, exists: {}", db_file.display(), db_file.exists());
    let db_url = format!("sqlite:{}?mode=rwc", db_file.display());
    let pool = SqlitePool::connect(&db_url)
        .await
        .expect("Failed to connect to SQLite database");

    // Run migrations
    let migrator = sqlx::migrate!("./migrations");
    tracing::info!(migrations = migrator.migrations.len(), "Found migrations");
    migrator
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Database migrations completed");

    // Wire the tracking components
    let store: Arc<dyn TrackingStore> = Arc::new(SqliteStore::new(pool.clone()));
    let sessions = Arc::new(SessionManager::new(store.clone(), config.tracking.clone()));
    let status = Arc::new(TripStatusMachine::new(store.clone()));
    let geofence = Arc::new(GeofenceMonitor::new(store.clone(), config.geofence.clone()));
    let (sms, push, services) = notify::build_providers(&config.notifications);
    let dispatcher = Arc::new(EmergencyDispatcher::new(store.clone(), sms, push, services));

    let api_state = ApiState {
        pool: pool.clone(),
        store,
        sessions,
        status,
        geofence,
        dispatcher,
        pickup_monitors: Arc::new(Mutex::new(HashMap::new())),
    };

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(api_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind to port 3000");

    tracing::info!("Server running on http://localhost:3000");
    tracing::info!("Swagger UI: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Live Trip Tracking API"
}
