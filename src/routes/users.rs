use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, Principal, Role};
use crate::errors::{AppError, AppResult};
use crate::extract::json_body;
use crate::models::user::{RoleUpdateRequest, User};
use crate::routes::auth::fetch_user_by_id;
use crate::utils::utc_now;

#[utoipa::path(
    patch,
    path = "/users/{id}/role",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = User),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Missing user:manage_roles"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<User>> {
    let permission = permissions::user::MANAGE_ROLES;
    if !principal.can(permission) {
        return Err(AppError::forbidden(format!("missing permission {permission}")));
    }
    let payload: RoleUpdateRequest = json_body(&body)?;

    let role: Role = payload
        .role
        .trim()
        .parse()
        .map_err(|err| AppError::bad_request(format!("{err}")))?;

    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(utc_now())
        .bind(user_id.to_string())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }

    tracing::info!(actor_id = %principal.user_id, %user_id, %role, "role updated");

    let user: User = fetch_user_by_id(&state.pool, user_id).await?.try_into()?;
    Ok(Json(user))
}
