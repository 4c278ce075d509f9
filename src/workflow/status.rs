use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of an RMA
///
/// Totally ordered along the advance pipeline, with `Rejected` as a side
/// branch reachable only from `RmaSubmitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    RmaSubmitted,
    AwaitingGoods,
    Evaluating,
    Payment,
    Processing,
    InShipping,
    Complete,
    Rejected,
}

/// Evidence a transition needs before it may happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Requirement {
    None,
    QuoteDocument,
}

/// Where a document supplied with an advance is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSlot {
    Quote,
    PurchaseOrder,
}

struct Step {
    from: Status,
    to: Status,
    requirement: Requirement,
    slot: Option<AttachmentSlot>,
}

static PIPELINE: [Step; 6] = [
    Step {
        from: Status::RmaSubmitted,
        to: Status::AwaitingGoods,
        requirement: Requirement::None,
        slot: None,
    },
    Step {
        from: Status::AwaitingGoods,
        to: Status::Evaluating,
        requirement: Requirement::None,
        slot: None,
    },
    Step {
        from: Status::Evaluating,
        to: Status::Payment,
        requirement: Requirement::QuoteDocument,
        slot: Some(AttachmentSlot::Quote),
    },
    Step {
        from: Status::Payment,
        to: Status::Processing,
        requirement: Requirement::None,
        slot: Some(AttachmentSlot::PurchaseOrder),
    },
    Step {
        from: Status::Processing,
        to: Status::InShipping,
        requirement: Requirement::None,
        slot: None,
    },
    Step {
        from: Status::InShipping,
        to: Status::Complete,
        requirement: Requirement::None,
        slot: None,
    },
];

/// Queried a (current, next) pair that is not a pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: Status,
    pub to: Status,
}

fn step(from: Status) -> Option<&'static Step> {
    PIPELINE.iter().find(|s| s.from == from)
}

/// Single successor in the pipeline, `None` for terminal states
pub fn next_status(current: Status) -> Option<Status> {
    step(current).map(|s| s.to)
}

pub fn is_terminal(status: Status) -> bool {
    matches!(status, Status::Complete | Status::Rejected)
}

/// Evidence required for `current -> next`; callers must confirm
/// `next == next_status(current)` first, anything else is an error
pub fn requirement_for(current: Status, next: Status) -> Result<Requirement, InvalidTransition> {
    step(current)
        .filter(|s| s.to == next)
        .map(|s| s.requirement)
        .ok_or(InvalidTransition {
            from: current,
            to: next,
        })
}

pub fn attachment_slot(current: Status, next: Status) -> Option<AttachmentSlot> {
    step(current).filter(|s| s.to == next).and_then(|s| s.slot)
}

/// Rejection is only offered while the submission is under review
pub fn can_reject(current: Status) -> bool {
    current == Status::RmaSubmitted
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::RmaSubmitted,
        Status::AwaitingGoods,
        Status::Evaluating,
        Status::Payment,
        Status::Processing,
        Status::InShipping,
        Status::Complete,
        Status::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::RmaSubmitted => "RMA_SUBMITTED",
            Status::AwaitingGoods => "AWAITING_GOODS",
            Status::Evaluating => "EVALUATING",
            Status::Payment => "PAYMENT",
            Status::Processing => "PROCESSING",
            Status::InShipping => "IN_SHIPPING",
            Status::Complete => "COMPLETE",
            Status::Rejected => "REJECTED",
        }
    }

    /// End-user label
    pub fn label(&self) -> &'static str {
        match self {
            Status::RmaSubmitted => "Enviado",
            Status::AwaitingGoods => "Esperando Mercancía",
            Status::Evaluating => "Evaluando",
            Status::Payment => "Pago",
            Status::Processing => "Procesando",
            Status::InShipping => "En Envío",
            Status::Complete => "Completado",
            Status::Rejected => "Rechazado",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Status::RmaSubmitted => "Solicitud enviada, pendiente de revisión",
            Status::AwaitingGoods => "Esperando recepción de los equipos del cliente",
            Status::Evaluating => "Evaluando el estado de los productos recibidos",
            Status::Payment => "Procesando cotización y esperando confirmación de pago",
            Status::Processing => "Procesando factura y preparando envío",
            Status::InShipping => "Productos en tránsito hacia el cliente",
            Status::Complete => "Proceso completado exitosamente",
            Status::Rejected => "Solicitud rechazada",
        }
    }

    pub fn next(&self) -> Option<Status> {
        next_status(*self)
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal(*self)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
