use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::status::{
    attachment_slot, can_reject, is_terminal, next_status, requirement_for, AttachmentSlot, Requirement,
    Status,
};
use crate::authz::{has_permission, permissions, Permission, Role};
use crate::models::rma::{Evidence, Rma};

/// Why a transition was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("missing permission {permission}")]
    Forbidden { permission: Permission },
    #[error("rma in status {current} cannot move{}", .requested.map(|s| format!(" to {s}")).unwrap_or_default())]
    InvalidState {
        current: Status,
        requested: Option<Status>,
    },
    #[error("transition {from} -> {to} requires a quote document")]
    MissingEvidence { from: Status, to: Status },
    #[error("{0}")]
    ValidationError(String),
}

impl TransitionError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransitionError::Forbidden { .. } => "forbidden",
            TransitionError::InvalidState { .. } => "invalid_state",
            TransitionError::MissingEvidence { .. } => "missing_evidence",
            TransitionError::ValidationError(_) => "validation_error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Attachments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Evidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_order: Option<Evidence>,
}

/// Persisted fields a successful decision changes
///
/// `from` is the status the decision was computed against; the store must only
/// apply the mutation while the stored status still equals it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusMutation {
    pub id: Uuid,
    pub from: Status,
    pub status: Status,
    pub attachments: Attachments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

impl StatusMutation {
    fn new(rma: &Rma, status: Status) -> Self {
        Self {
            id: rma.id,
            from: rma.status,
            status,
            attachments: Attachments::default(),
            rejection_reason: None,
            tracking_number: None,
        }
    }
}

fn require_change_status(actor: Option<Role>) -> Result<(), TransitionError> {
    let permission = permissions::rma::CHANGE_STATUS;
    if has_permission(actor, permission) {
        Ok(())
    } else {
        Err(TransitionError::Forbidden { permission })
    }
}

fn check_evidence(evidence: &Evidence) -> Result<(), TransitionError> {
    if evidence.is_well_formed() {
        Ok(())
    } else {
        Err(TransitionError::ValidationError(
            "evidence needs a filename and a url".to_string(),
        ))
    }
}

/// Decide a single forward move of `rma` along the pipeline
pub fn authorize_advance(
    actor: Option<Role>,
    rma: &Rma,
    evidence: Option<Evidence>,
) -> Result<StatusMutation, TransitionError> {
    require_change_status(actor)?;

    let current = rma.status;
    let invalid = TransitionError::InvalidState {
        current,
        requested: None,
    };
    if is_terminal(current) {
        return Err(invalid);
    }
    let next = next_status(current).ok_or(invalid)?;

    let requirement = requirement_for(current, next).map_err(|err| TransitionError::InvalidState {
        current: err.from,
        requested: Some(err.to),
    })?;

    if requirement == Requirement::QuoteDocument && evidence.is_none() {
        return Err(TransitionError::MissingEvidence {
            from: current,
            to: next,
        });
    }

    let mut mutation = StatusMutation::new(rma, next);
    match (attachment_slot(current, next), evidence) {
        (Some(slot), Some(doc)) => {
            check_evidence(&doc)?;
            match slot {
                AttachmentSlot::Quote => mutation.attachments.quote = Some(doc),
                AttachmentSlot::PurchaseOrder => mutation.attachments.purchase_order = Some(doc),
            }
        }
        (None, Some(doc)) => {
            tracing::debug!(rma_id = %rma.id, %current, %next, filename = %doc.filename, "evidence ignored, step takes no attachment");
        }
        (_, None) => {}
    }

    tracing::debug!(rma_id = %rma.id, from = %current, to = %next, "advance authorized");
    Ok(mutation)
}

/// Decide the side branch `RMA_SUBMITTED -> REJECTED`
pub fn authorize_reject(actor: Option<Role>, rma: &Rma, reason: &str) -> Result<StatusMutation, TransitionError> {
    require_change_status(actor)?;

    if !can_reject(rma.status) {
        return Err(TransitionError::InvalidState {
            current: rma.status,
            requested: Some(Status::Rejected),
        });
    }

    let reason = reason.trim();
    if reason.is_empty() {
        return Err(TransitionError::ValidationError(
            "rejection reason is required".to_string(),
        ));
    }

    let mut mutation = StatusMutation::new(rma, Status::Rejected);
    mutation.rejection_reason = Some(reason.to_string());

    tracing::debug!(rma_id = %rma.id, from = %rma.status, "reject authorized");
    Ok(mutation)
}

/// Advance towards an explicitly requested status, refusing anything that is
/// not the single pipeline successor
pub fn authorize_transition(
    actor: Option<Role>,
    rma: &Rma,
    requested: Status,
    evidence: Option<Evidence>,
) -> Result<StatusMutation, TransitionError> {
    require_change_status(actor)?;

    if next_status(rma.status) != Some(requested) {
        return Err(TransitionError::InvalidState {
            current: rma.status,
            requested: Some(requested),
        });
    }

    authorize_advance(actor, rma, evidence)
}

/// Record a carrier tracking number on an `IN_SHIPPING` mutation
pub fn with_tracking(
    actor: Option<Role>,
    mut mutation: StatusMutation,
    tracking: Option<&str>,
) -> Result<StatusMutation, TransitionError> {
    let Some(tracking) = tracking.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(mutation);
    };

    let permission = permissions::rma::ASSIGN_TRACKING;
    if !has_permission(actor, permission) {
        return Err(TransitionError::Forbidden { permission });
    }

    if mutation.status != Status::InShipping {
        return Err(TransitionError::ValidationError(format!(
            "tracking number only accepted when moving to {}",
            Status::InShipping
        )));
    }

    mutation.tracking_number = Some(tracking.to_string());
    Ok(mutation)
}
