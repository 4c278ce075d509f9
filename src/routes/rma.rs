use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{permissions, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{AuditActor, RequestContext};
use crate::extract::{json_body, optional_json, AppQuery};
use crate::models::rma::{
    Evidence, InShippingRequest, RejectRequest, Rma, RmaCreateRequest, RmaHistoryEntry, RmaListQuery, RmaStats,
};
use crate::storage::UPLOADS_ROUTE;
use crate::workflow::{authorize_reject, authorize_transition, with_tracking, Status, StatusMutation};

const UPLOAD_FIELD: &str = "file";

/// Multipart body of the document-carrying transitions
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct EvidenceUpload {
    /// PDF document
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

struct Upload {
    filename: String,
    data: Vec<u8>,
}

/// Which RMAs the caller may read: `None` means all of them
fn read_scope(principal: &Principal) -> AppResult<Option<Uuid>> {
    if principal.can(permissions::rma::READ_ALL) {
        Ok(None)
    } else if principal.can(permissions::rma::READ_OWN) {
        Ok(Some(principal.user_id))
    } else {
        Err(AppError::forbidden(format!(
            "missing permission {}",
            permissions::rma::READ_OWN
        )))
    }
}

async fn load_visible(state: &AppState, principal: &Principal, id: Uuid) -> AppResult<Rma> {
    let scope = read_scope(principal)?;
    let rma = state.store.load_rma(id).await?;
    match scope {
        Some(owner) if rma.user_id != owner => Err(AppError::forbidden("rma belongs to another user")),
        _ => Ok(rma),
    }
}

async fn read_upload(multipart: Option<Multipart>, max_bytes: usize) -> AppResult<Option<Upload>> {
    let Some(mut multipart) = multipart else {
        return Ok(None);
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read multipart field: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("failed to read file bytes: {e}")))?;

        if data.is_empty() {
            return Ok(None);
        }
        if data.len() > max_bytes {
            return Err(AppError::bad_request(format!("file too large (max {max_bytes} bytes)")));
        }

        return Ok(Some(Upload {
            filename,
            data: data.to_vec(),
        }));
    }

    Ok(None)
}

fn audit_actor(principal: &Principal, headers: &HeaderMap) -> AuditActor {
    AuditActor::new(principal.user_id, Some(RequestContext::from_headers(headers)))
}

/// Status moves are refused before the RMA is even looked up
fn require_change_status(principal: &Principal) -> AppResult<()> {
    let permission = permissions::rma::CHANGE_STATUS;
    if principal.can(permission) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("missing permission {permission}")))
    }
}

/// Persist a decided mutation together with its audit event
async fn commit(
    state: &AppState,
    principal: &Principal,
    headers: &HeaderMap,
    mutation: StatusMutation,
) -> AppResult<Json<Rma>> {
    let updated = state
        .store
        .apply_mutation(&mutation, &audit_actor(principal, headers))
        .await?;
    Ok(Json(updated))
}

/// Decide a plain forward move and commit it
async fn advance_to(
    state: &AppState,
    principal: &Principal,
    headers: &HeaderMap,
    id: Uuid,
    target: Status,
) -> AppResult<Json<Rma>> {
    require_change_status(principal)?;
    let rma = state.store.load_rma(id).await?;
    let mutation = authorize_transition(principal.role, &rma, target, None)?;
    commit(state, principal, headers, mutation).await
}

/// Decide a move that may carry a document.
///
/// The decision is taken once before the file is written so refused requests
/// leave nothing on disk, and again with the stored reference. A stored file
/// whose commit fails is removed again.
async fn advance_with_document(
    state: &AppState,
    principal: &Principal,
    headers: &HeaderMap,
    id: Uuid,
    target: Status,
    multipart: Option<Multipart>,
) -> AppResult<Json<Rma>> {
    require_change_status(principal)?;
    let rma = state.store.load_rma(id).await?;
    let upload = read_upload(multipart, state.config.max_upload_bytes).await?;

    let provisional = upload
        .as_ref()
        .map(|u| Evidence::new(u.filename.clone(), UPLOADS_ROUTE));
    authorize_transition(principal.role, &rma, target, provisional)?;

    let Some(upload) = upload else {
        let mutation = authorize_transition(principal.role, &rma, target, None)?;
        return commit(state, principal, headers, mutation).await;
    };

    let evidence = state.evidence.store(rma.id, &upload.filename, upload.data).await?;
    let outcome = match authorize_transition(principal.role, &rma, target, Some(evidence.clone())) {
        Ok(mutation) => commit(state, principal, headers, mutation).await,
        Err(err) => Err(err.into()),
    };

    if outcome.is_err() {
        if let Err(cleanup) = state.evidence.remove(&evidence).await {
            tracing::warn!(rma_id = %rma.id, url = %evidence.url, "failed to remove orphaned evidence: {}", cleanup);
        }
    }
    outcome
}

#[utoipa::path(
    post,
    path = "/rma",
    tag = "RMA",
    security(("bearerAuth" = [])),
    request_body = RmaCreateRequest,
    responses(
        (status = 201, description = "RMA submitted", body = Rma),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Missing rma:create")
    )
)]
pub async fn create_rma(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Rma>)> {
    let permission = permissions::rma::CREATE;
    if !principal.can(permission) {
        return Err(AppError::forbidden(format!("missing permission {permission}")));
    }
    let payload: RmaCreateRequest = json_body(&body)?;

    let rma = state
        .store
        .create_rma(principal.user_id, &payload, &audit_actor(&principal, &headers))
        .await?;

    Ok((StatusCode::CREATED, Json(rma)))
}

#[utoipa::path(
    get,
    path = "/rma",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(RmaListQuery),
    responses(
        (status = 200, description = "RMAs visible to the caller, newest first", body = [Rma]),
        (status = 403, description = "No read permission")
    )
)]
pub async fn list_rmas(
    State(state): State<AppState>,
    principal: Principal,
    AppQuery(query): AppQuery<RmaListQuery>,
) -> AppResult<Json<Vec<Rma>>> {
    let scope = read_scope(&principal)?;
    let rmas = state.store.list_rmas(scope, &query).await?;
    Ok(Json(rmas))
}

#[utoipa::path(
    get,
    path = "/rma/stats",
    tag = "RMA",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "RMA count per status", body = RmaStats))
)]
pub async fn rma_stats(State(state): State<AppState>, principal: Principal) -> AppResult<Json<RmaStats>> {
    let scope = read_scope(&principal)?;
    Ok(Json(state.store.stats(scope).await?))
}

#[utoipa::path(
    get,
    path = "/rma/{id}",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    responses(
        (status = 200, description = "RMA detail", body = Rma),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "RMA not found")
    )
)]
pub async fn get_rma(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Rma>> {
    Ok(Json(load_visible(&state, &principal, id).await?))
}

#[utoipa::path(
    get,
    path = "/rma/{id}/history",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    responses(
        (status = 200, description = "Audit trail, oldest first", body = [RmaHistoryEntry]),
        (status = 404, description = "RMA not found")
    )
)]
pub async fn rma_history(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<RmaHistoryEntry>>> {
    let rma = load_visible(&state, &principal, id).await?;
    Ok(Json(state.store.history(rma.id).await?))
}

#[utoipa::path(
    patch,
    path = "/rma/{id}/approve",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    responses(
        (status = 200, description = "Moved to AWAITING_GOODS", body = Rma),
        (status = 403, description = "Missing rma:change_status"),
        (status = 409, description = "Not in RMA_SUBMITTED")
    )
)]
pub async fn approve(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Rma>> {
    advance_to(&state, &principal, &headers, id, Status::AwaitingGoods).await
}

#[utoipa::path(
    patch,
    path = "/rma/{id}/reject",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = Rma),
        (status = 400, description = "Blank rejection reason"),
        (status = 403, description = "Missing rma:change_status"),
        (status = 409, description = "Not in RMA_SUBMITTED")
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<Rma>> {
    require_change_status(&principal)?;
    let payload: RejectRequest = json_body(&body)?;

    let rma = state.store.load_rma(id).await?;
    let mutation = authorize_reject(principal.role, &rma, &payload.rejection_reason)?;
    commit(&state, &principal, &headers, mutation).await
}

#[utoipa::path(
    patch,
    path = "/rma/{id}/mark-evaluating",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    responses(
        (status = 200, description = "Moved to EVALUATING", body = Rma),
        (status = 403, description = "Missing rma:change_status"),
        (status = 409, description = "Not in AWAITING_GOODS")
    )
)]
pub async fn mark_evaluating(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Rma>> {
    advance_to(&state, &principal, &headers, id, Status::Evaluating).await
}

#[utoipa::path(
    patch,
    path = "/rma/{id}/mark-payment",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    request_body(content = EvidenceUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Moved to PAYMENT with the quote attached", body = Rma),
        (status = 400, description = "Not a PDF"),
        (status = 403, description = "Missing rma:change_status"),
        (status = 409, description = "Not in EVALUATING"),
        (status = 422, description = "Quote document missing")
    )
)]
pub async fn mark_payment(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    multipart: Option<Multipart>,
) -> AppResult<Json<Rma>> {
    advance_with_document(&state, &principal, &headers, id, Status::Payment, multipart).await
}

#[utoipa::path(
    patch,
    path = "/rma/{id}/mark-processing",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    request_body(content = EvidenceUpload, content_type = "multipart/form-data", description = "Optional purchase order"),
    responses(
        (status = 200, description = "Moved to PROCESSING", body = Rma),
        (status = 403, description = "Missing rma:change_status"),
        (status = 409, description = "Not in PAYMENT")
    )
)]
pub async fn mark_processing(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    multipart: Option<Multipart>,
) -> AppResult<Json<Rma>> {
    advance_with_document(&state, &principal, &headers, id, Status::Processing, multipart).await
}

#[utoipa::path(
    patch,
    path = "/rma/{id}/mark-inshipping",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    request_body = InShippingRequest,
    responses(
        (status = 200, description = "Moved to IN_SHIPPING", body = Rma),
        (status = 403, description = "Missing rma:change_status or rma:assign_tracking"),
        (status = 409, description = "Not in PROCESSING")
    )
)]
pub async fn mark_inshipping(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<Rma>> {
    require_change_status(&principal)?;
    let payload: InShippingRequest = optional_json(&body)?;

    let rma = state.store.load_rma(id).await?;
    let mutation = authorize_transition(principal.role, &rma, Status::InShipping, None)?;
    let mutation = with_tracking(principal.role, mutation, payload.tracking_information.as_deref())?;
    commit(&state, &principal, &headers, mutation).await
}

#[utoipa::path(
    patch,
    path = "/rma/{id}/mark-complete",
    tag = "RMA",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "RMA id")),
    responses(
        (status = 200, description = "Moved to COMPLETE", body = Rma),
        (status = 403, description = "Missing rma:change_status"),
        (status = 409, description = "Not in IN_SHIPPING")
    )
)]
pub async fn mark_complete(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Rma>> {
    advance_to(&state, &principal, &headers, id, Status::Complete).await
}

