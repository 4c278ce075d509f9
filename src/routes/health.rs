use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when every dependency answers, `degraded` otherwise
    pub status: &'static str,
    pub version: &'static str,
    pub db_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_error: Option<String>,
    pub uploads_ok: bool,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Service and dependency status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_error = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .err()
        .map(|err| err.to_string());
    let uploads_ok = tokio::fs::metadata(&state.config.upload_dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);

    let db_ok = db_error.is_none();
    if !db_ok || !uploads_ok {
        tracing::warn!(db_ok, uploads_ok, error = ?db_error, "health check degraded");
    }

    Ok(Json(HealthResponse {
        status: if db_ok && uploads_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_ok,
        db_error,
        uploads_ok,
    }))
}
