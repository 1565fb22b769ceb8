use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::ports::{Capabilities, SampleStore};
use domain::services::{
    AuthService, PresenceService, StatusAggregator, StatusMonitor, TrackingStatsService,
    UserDirectoryService,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, require_admin, require_session, trace_id};
use crate::routes::{auth, dashboard, employees, health, locations, users};

/// Domain services shared by every handler.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<AuthService>,
    pub directory: Arc<UserDirectoryService>,
    pub presence: Arc<PresenceService>,
    pub aggregator: Arc<StatusAggregator>,
    pub stats: Arc<TrackingStatsService>,
    pub monitor: Arc<StatusMonitor>,
    pub samples: Arc<dyn SampleStore>,
}

impl Services {
    pub fn new(capabilities: &Capabilities, config: &Config) -> Self {
        let presence = Arc::new(PresenceService::with_policy(
            capabilities.samples.clone(),
            capabilities.clock.clone(),
            config.presence.policy(),
        ));
        let aggregator = Arc::new(StatusAggregator::new(
            capabilities.directory.clone(),
            presence.clone(),
        ));
        let monitor = Arc::new(StatusMonitor::new(
            aggregator.clone(),
            capabilities.clock.clone(),
        ));
        let stats = TrackingStatsService::new(capabilities.samples.clone()).with_activity_gap(
            config.tracking.activity_gap(),
        );

        Self {
            auth: Arc::new(AuthService::new(
                capabilities.auth.clone(),
                capabilities.directory.clone(),
            )),
            directory: Arc::new(UserDirectoryService::new(
                capabilities.directory.clone(),
                capabilities.samples.clone(),
            )),
            presence,
            aggregator,
            stats: Arc::new(stats),
            monitor,
            samples: capabilities.samples.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    /// Absent when running on in-memory backends.
    pub pool: Option<PgPool>,
    pub config: Arc<Config>,
    pub capabilities: Capabilities,
    pub services: Services,
}

impl AppState {
    pub fn new(config: Config, capabilities: Capabilities, pool: Option<PgPool>) -> Self {
        let services = Services::new(&capabilities, &config);
        Self {
            pool,
            config: Arc::new(config),
            capabilities,
            services,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Routes for any signed-in user. Self/admin checks happen in the handlers.
    let session_routes = Router::new()
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/me", get(auth::me))
        .route(
            "/api/v1/users/:uid",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/v1/locations", post(locations::ingest_location))
        .route(
            "/api/v1/users/:uid/locations/latest",
            get(locations::latest_location),
        )
        .route("/api/v1/users/:uid/presence", get(locations::presence))
        .route("/api/v1/users/:uid/stats", get(locations::tracking_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    // Admin routes
    let admin_routes = Router::new()
        .route(
            "/api/v1/users",
            get(users::list_users).post(users::provision_user),
        )
        .route(
            "/api/v1/employees/status",
            get(employees::list_statuses),
        )
        .route(
            "/api/v1/employees/status/live",
            get(employees::live_statuses),
        )
        .route("/api/v1/dashboard/stats", get(dashboard::get_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(admin_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
