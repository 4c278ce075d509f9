use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::{RmaStore, SqliteRmaStore};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_event_logger, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, rma, users};
use crate::storage::{EvidenceStore, LocalEvidenceStore, UPLOADS_ROUTE};

// multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn request_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RmaStore>,
    pub evidence: Arc<dyn EvidenceStore>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        jwt: JwtConfig,
        config: AppConfig,
        event_bus: EventBus,
        evidence: Arc<dyn EvidenceStore>,
    ) -> Self {
        Self {
            store: Arc::new(SqliteRmaStore::new(pool.clone()).with_event_bus(event_bus)),
            pool,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            evidence,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let config = AppConfig::from_env()?;
    create_app_with_config(pool, config).await
}

pub async fn create_app_with_config(pool: SqlitePool, config: AppConfig) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_event_logger(event_rx));

    let evidence = LocalEvidenceStore::new(&config.upload_dir).await?;
    let upload_dir = evidence.base_path().clone();
    let body_limit = request_body_limit(config.max_upload_bytes);
    let port = config.port;

    let state = AppState::new(pool, jwt_config, config, event_bus, Arc::new(evidence));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let rma_routes = Router::new()
        .route("/", get(rma::list_rmas).post(rma::create_rma))
        .route("/stats", get(rma::rma_stats))
        .route("/:id", get(rma::get_rma))
        .route("/:id/history", get(rma::rma_history))
        .route("/:id/approve", patch(rma::approve))
        .route("/:id/reject", patch(rma::reject))
        .route("/:id/mark-evaluating", patch(rma::mark_evaluating))
        .route("/:id/mark-payment", patch(rma::mark_payment))
        .route("/:id/mark-processing", patch(rma::mark_processing))
        .route("/:id/mark-inshipping", patch(rma::mark_inshipping))
        .route("/:id/mark-complete", patch(rma::mark_complete));

    let user_routes = Router::new().route("/:id/role", patch(users::update_role));

    let openapi = crate::docs::build_openapi(port)?;

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/rma", rma_routes)
        .nest("/users", user_routes)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(upload_dir))
        .with_state(state)
        .merge(crate::docs::swagger_routes(openapi)?)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
