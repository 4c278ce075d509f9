use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

use crate::errors::{AppError, AppResult};
use crate::workflow::Status;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context for the audit trail (IP, User-Agent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Extract context from Axum request headers
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Structured payload of a status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Status read at decision time, absent on creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Status>,
    pub to: Status,
    /// Snapshot of the entity after the change
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Who caused an audited change, and from where
#[derive(Debug, Clone, Default)]
pub struct AuditActor {
    pub user_id: Option<Uuid>,
    pub context: Option<RequestContext>,
}

impl AuditActor {
    pub fn new(user_id: Uuid, context: Option<RequestContext>) -> Self {
        Self {
            user_id: Some(user_id),
            context,
        }
    }
}

pub type TransitionEvent = DomainEvent<TransitionPayload>;

/// Build the lifecycle event for an RMA change (created, advanced, rejected)
pub fn transition_event<T: Loggable>(
    action: &str,
    actor: &AuditActor,
    entity: &T,
    from: Option<Status>,
    to: Status,
) -> TransitionEvent {
    let payload = TransitionPayload {
        from,
        to,
        current: serde_json::to_value(entity).unwrap_or_default(),
        context: actor.context.clone(),
        severity: entity.severity_for_action(action),
    };

    DomainEvent::new(
        format!("{}.{}", T::entity_type(), action),
        actor.user_id,
        Some(entity.subject_id()),
        payload,
    )
}

/// SHA256(prev_hash || payload), hex encoded
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Append one event to `rma_events`, chained to the latest row.
///
/// Must run on the connection of the transaction that made the change, after
/// its first write, so the chain head cannot move underneath it.
pub async fn append_event(conn: &mut SqliteConnection, event: &TransitionEvent) -> AppResult<String> {
    let Some(subject_id) = event.subject_id else {
        return Err(AppError::internal(format!("audit event {} has no subject", event.name)));
    };
    let payload = serde_json::to_string(event)
        .map_err(|err| AppError::internal(format!("failed to encode audit event {}: {err}", event.name)))?;

    let prev_hash: Option<String> = sqlx::query_scalar("SELECT hash FROM rma_events ORDER BY seq DESC LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;
    let hash = chain_hash(prev_hash.as_deref(), &payload);

    sqlx::query(
        r#"
        INSERT INTO rma_events (id, rma_id, event_name, actor_id, from_status, to_status, occurred_at, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(subject_id.to_string())
    .bind(&event.name)
    .bind(event.actor_id.map(|u| u.to_string()))
    .bind(event.payload.from.map(|s| s.as_str()))
    .bind(event.payload.to.as_str())
    .bind(event.occurred_at)
    .bind(&payload)
    .bind(event.payload.severity.as_str())
    .bind(&prev_hash)
    .bind(&hash)
    .execute(&mut *conn)
    .await?;

    Ok(hash)
}

/// Announce a committed event to in-process subscribers.
///
/// Fire and forget: a missing subscriber never fails the request.
pub fn publish(event_bus: &EventBus, event: &TransitionEvent) {
    match serde_json::to_value(event) {
        Ok(value) => {
            if event_bus.send(value).is_err() {
                tracing::debug!(event = %event.name, "no event subscriber attached");
            }
        }
        Err(err) => tracing::error!(event = %event.name, "failed to encode event: {}", err),
    }
}

/// First audit row whose hash does not match its predecessor and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub seq: i64,
    pub event_id: String,
}

/// Walk `rma_events` in insertion order and recompute every link.
///
/// Returns the number of rows checked, or the first broken row.
pub async fn verify_chain(pool: &SqlitePool) -> Result<Result<usize, ChainBreak>, sqlx::Error> {
    let rows: Vec<(i64, String, Option<String>, String, String)> =
        sqlx::query_as("SELECT seq, id, prev_hash, payload, hash FROM rma_events ORDER BY seq")
            .fetch_all(pool)
            .await?;

    let mut previous: Option<String> = None;
    for (seq, event_id, prev_hash, payload, hash) in &rows {
        if *prev_hash != previous || chain_hash(prev_hash.as_deref(), payload) != *hash {
            return Ok(Err(ChainBreak {
                seq: *seq,
                event_id: event_id.clone(),
            }));
        }
        previous = Some(hash.clone());
    }

    Ok(Ok(rows.len()))
}

/// Log every committed lifecycle event; the rows are already in `rma_events`
pub async fn start_event_logger(mut rx: broadcast::Receiver<Value>) {
    tracing::info!("event logger started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                let name = event.get("name").and_then(Value::as_str).unwrap_or("unknown");
                let subject = event.get("subject_id").and_then(Value::as_str).unwrap_or("-");
                tracing::info!(event = %name, subject = %subject, "rma event committed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
