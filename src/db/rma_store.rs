use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::events::{append_event, publish, transition_event, AuditActor, EventBus, TransitionEvent};
use crate::models::rma::{
    DbRma, DbRmaItem, Rma, RmaCreateRequest, RmaHistoryEntry, RmaItem, RmaListQuery, RmaStats, ServiceType,
    StatusCount,
};
use crate::utils::utc_now;
use crate::workflow::{Status, StatusMutation};

const RMA_COLUMNS: &str = "id, user_id, company_name, address, postal_code, service_type, status, \
     quote_filename, quote_url, purchase_order_filename, purchase_order_url, rejection_reason, \
     tracking_number, created_at, updated_at";

/// Persistence for RMA records.
///
/// `apply_mutation` is the only write path for status changes and must be
/// conditional on the status the mutation was decided against. Every write
/// records its audit event in the same transaction.
#[async_trait]
pub trait RmaStore: Send + Sync {
    async fn create_rma(&self, owner: Uuid, request: &RmaCreateRequest, actor: &AuditActor) -> AppResult<Rma>;

    async fn load_rma(&self, id: Uuid) -> AppResult<Rma>;

    /// `owner = None` lists every RMA
    async fn list_rmas(&self, owner: Option<Uuid>, query: &RmaListQuery) -> AppResult<Vec<Rma>>;

    async fn stats(&self, owner: Option<Uuid>) -> AppResult<RmaStats>;

    async fn history(&self, id: Uuid) -> AppResult<Vec<RmaHistoryEntry>>;

    async fn apply_mutation(&self, mutation: &StatusMutation, actor: &AuditActor) -> AppResult<Rma>;
}

#[derive(Clone)]
pub struct SqliteRmaStore {
    pool: SqlitePool,
    event_bus: Option<EventBus>,
}

impl SqliteRmaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, event_bus: None }
    }

    /// Announce committed events on `event_bus`
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn announce(&self, event: &TransitionEvent) {
        if let Some(bus) = &self.event_bus {
            publish(bus, event);
        }
    }
}

async fn items_for(conn: &mut SqliteConnection, rma_ids: &[String]) -> AppResult<HashMap<String, Vec<RmaItem>>> {
    let mut grouped: HashMap<String, Vec<RmaItem>> = HashMap::new();
    if rma_ids.is_empty() {
        return Ok(grouped);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, rma_id, position, product_id, serial_number, model, evaluation_report \
         FROM rma_items WHERE rma_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in rma_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") ORDER BY rma_id, position");

    let rows = qb.build_query_as::<DbRmaItem>().fetch_all(&mut *conn).await?;
    for row in rows {
        let rma_id = row.rma_id.clone();
        grouped.entry(rma_id).or_default().push(RmaItem::try_from(row)?);
    }

    Ok(grouped)
}

async fn assemble(conn: &mut SqliteConnection, rows: Vec<DbRma>) -> AppResult<Vec<Rma>> {
    let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
    let mut items = items_for(conn, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let row_items = items.remove(&row.id).unwrap_or_default();
            row.into_rma(row_items)
        })
        .collect()
}

async fn load_in(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Rma> {
    let row: Option<DbRma> = sqlx::query_as(&format!("SELECT {RMA_COLUMNS} FROM rmas WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let row = row.ok_or_else(|| AppError::not_found(format!("rma {id} not found")))?;
    let mut rmas = assemble(conn, vec![row]).await?;
    rmas.pop()
        .ok_or_else(|| AppError::internal(format!("rma {id} vanished while loading")))
}

async fn exists_in(conn: &mut SqliteConnection, id: Uuid) -> AppResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM rmas WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

#[async_trait]
impl RmaStore for SqliteRmaStore {
    async fn create_rma(&self, owner: Uuid, request: &RmaCreateRequest, actor: &AuditActor) -> AppResult<Rma> {
        request.validate()?;

        let id = Uuid::new_v4();
        let now = utc_now();
        let service_type = request.service_type.unwrap_or(ServiceType::Repair);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rmas (id, user_id, company_name, address, postal_code, service_type, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(owner.to_string())
        .bind(request.company_name.trim())
        .bind(request.address.trim())
        .bind(request.postal_code.trim())
        .bind(service_type.as_str())
        .bind(Status::RmaSubmitted.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, item) in request.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO rma_items (id, rma_id, position, product_id, serial_number, model, evaluation_report)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(id.to_string())
            .bind(position as i64)
            .bind(item.product_id.to_string())
            .bind(item.serial_number.trim())
            .bind(item.model.trim())
            .bind(item.evaluation_report.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        let rma = load_in(&mut tx, id).await?;
        let event = transition_event("created", actor, &rma, None, rma.status);
        append_event(&mut tx, &event).await?;

        tx.commit().await?;

        tracing::info!(rma_id = %id, user_id = %owner, items = request.items.len(), "rma created");
        self.announce(&event);
        Ok(rma)
    }

    async fn load_rma(&self, id: Uuid) -> AppResult<Rma> {
        let mut conn = self.pool.acquire().await?;
        load_in(&mut conn, id).await
    }

    async fn list_rmas(&self, owner: Option<Uuid>, query: &RmaListQuery) -> AppResult<Vec<Rma>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {RMA_COLUMNS} FROM rmas WHERE 1 = 1"));

        if let Some(owner) = owner {
            qb.push(" AND user_id = ").push_bind(owner.to_string());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(start) = query.start_date {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = query.end_date {
            qb.push(" AND created_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY created_at DESC");

        let mut conn = self.pool.acquire().await?;
        let rows = qb.build_query_as::<DbRma>().fetch_all(&mut *conn).await?;
        assemble(&mut conn, rows).await
    }

    async fn stats(&self, owner: Option<Uuid>) -> AppResult<RmaStats> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT status, COUNT(*) FROM rmas");
        if let Some(owner) = owner {
            qb.push(" WHERE user_id = ").push_bind(owner.to_string());
        }
        qb.push(" GROUP BY status");

        let rows = qb.build_query_as::<(String, i64)>().fetch_all(&self.pool).await?;
        let counts: HashMap<String, i64> = rows.into_iter().collect();

        let by_status: Vec<StatusCount> = Status::ALL
            .iter()
            .map(|status| StatusCount {
                status: *status,
                label: status.label(),
                count: counts.get(status.as_str()).copied().unwrap_or(0),
            })
            .collect();

        Ok(RmaStats {
            total: by_status.iter().map(|c| c.count).sum(),
            by_status,
        })
    }

    async fn history(&self, id: Uuid) -> AppResult<Vec<RmaHistoryEntry>> {
        let mut conn = self.pool.acquire().await?;
        if !exists_in(&mut conn, id).await? {
            return Err(AppError::not_found(format!("rma {id} not found")));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, event_name, actor_id, from_status, to_status, occurred_at, hash
            FROM rma_events
            WHERE rma_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(row_parsers::history_entry_from_row).collect()
    }

    async fn apply_mutation(&self, mutation: &StatusMutation, actor: &AuditActor) -> AppResult<Rma> {
        let quote = mutation.attachments.quote.as_ref();
        let purchase_order = mutation.attachments.purchase_order.as_ref();

        // the UPDATE is the first statement so the transaction takes the write lock up front
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE rmas
            SET status = ?,
                quote_filename = COALESCE(?, quote_filename),
                quote_url = COALESCE(?, quote_url),
                purchase_order_filename = COALESCE(?, purchase_order_filename),
                purchase_order_url = COALESCE(?, purchase_order_url),
                rejection_reason = COALESCE(?, rejection_reason),
                tracking_number = COALESCE(?, tracking_number),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(mutation.status.as_str())
        .bind(quote.map(|e| e.filename.as_str()))
        .bind(quote.map(|e| e.url.as_str()))
        .bind(purchase_order.map(|e| e.filename.as_str()))
        .bind(purchase_order.map(|e| e.url.as_str()))
        .bind(mutation.rejection_reason.as_deref())
        .bind(mutation.tracking_number.as_deref())
        .bind(utc_now())
        .bind(mutation.id.to_string())
        .bind(mutation.from.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            if !exists_in(&mut tx, mutation.id).await? {
                return Err(AppError::not_found(format!("rma {} not found", mutation.id)));
            }
            tracing::warn!(rma_id = %mutation.id, from = %mutation.from, to = %mutation.status, "stale status mutation refused");
            return Err(AppError::conflict(format!(
                "rma {} is no longer in status {}",
                mutation.id, mutation.from
            )));
        }

        let rma = load_in(&mut tx, mutation.id).await?;
        let action = if mutation.status == Status::Rejected { "rejected" } else { "advanced" };
        let event = transition_event(action, actor, &rma, Some(mutation.from), mutation.status);
        append_event(&mut tx, &event).await?;

        tx.commit().await?;

        tracing::info!(rma_id = %mutation.id, from = %mutation.from, to = %mutation.status, "rma status changed");
        self.announce(&event);
        Ok(rma)
    }
}
