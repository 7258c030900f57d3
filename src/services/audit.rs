use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;

use crate::entities::{audit_entry, user};
use crate::errors::ServiceError;
use crate::services::recorder::RequestContext;
use crate::services::views::{AuditView, Lookup};

/// One audit row to append.
#[derive(Debug, Clone)]
pub struct NewAuditEntry<'a> {
    pub user_id: i32,
    pub action: &'a str,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
    pub context: &'a RequestContext,
}

/// Appends an audit entry on `conn`, which may be an open transaction.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    entry: NewAuditEntry<'_>,
) -> Result<audit_entry::Model, DbErr> {
    audit_entry::ActiveModel {
        user_id: Set(entry.user_id),
        action: Set(entry.action.to_string()),
        detail: Set(Some(entry.detail)),
        occurred_at: Set(entry.occurred_at),
        ip_address: Set(entry.context.ip_address.clone()),
        user_agent: Set(entry.context.user_agent.clone()),
        ..Default::default()
    }
    .insert(conn)
    .await
}

#[derive(Clone)]
pub struct AuditService {
    db: Arc<DatabaseConnection>,
}

impl AuditService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Newest first, optionally capped at `limit` rows.
    pub async fn list(&self, limit: Option<u64>) -> Result<Vec<AuditView>, ServiceError> {
        let mut query = audit_entry::Entity::find()
            .order_by_desc(audit_entry::Column::OccurredAt)
            .order_by_desc(audit_entry::Column::Id);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let entries = query.all(&*self.db).await?;
        let users = user::Entity::find().all(&*self.db).await?;
        let lookup = Lookup::new(&[], &users, &[]);

        Ok(entries.iter().map(|e| lookup.audit_view(e)).collect())
    }
}
