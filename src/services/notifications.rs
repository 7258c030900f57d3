use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Condition, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::auth::SessionUser;
use crate::entities::notification::{self, NotificationKind, Recipient};
use crate::errors::ServiceError;

const MESSAGE_MAX: usize = 250;

/// Appends a notification on `conn`, which may be an open transaction.
pub async fn post<C: ConnectionTrait>(
    conn: &C,
    recipient: Recipient,
    kind: NotificationKind,
    message: &str,
    link: Option<String>,
    created_at: DateTime<Utc>,
) -> Result<notification::Model, DbErr> {
    let message: String = message.chars().take(MESSAGE_MAX).collect();
    notification::ActiveModel {
        message: Set(message),
        created_at: Set(created_at),
        read: Set(false),
        recipient_id: Set(recipient.to_column()),
        kind: Set(kind),
        link: Set(link),
        ..Default::default()
    }
    .insert(conn)
    .await
}

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Direct notifications for the user; admins also see broadcasts.
    fn visibility(viewer: &SessionUser) -> Condition {
        let mut condition =
            Condition::any().add(notification::Column::RecipientId.eq(viewer.id));
        if viewer.is_admin() {
            condition = condition.add(notification::Column::RecipientId.is_null());
        }
        condition
    }

    #[instrument(skip(self, viewer), fields(user_id = viewer.id))]
    pub async fn visible_to(
        &self,
        viewer: &SessionUser,
    ) -> Result<Vec<notification::Model>, ServiceError> {
        Ok(notification::Entity::find()
            .filter(Self::visibility(viewer))
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn unread_count(&self, viewer: &SessionUser) -> Result<u64, ServiceError> {
        Ok(notification::Entity::find()
            .filter(Self::visibility(viewer))
            .filter(notification::Column::Read.eq(false))
            .count(&*self.db)
            .await?)
    }

    /// Flips the read flag. Notifications the viewer cannot see are reported as missing.
    #[instrument(skip(self, viewer), fields(user_id = viewer.id))]
    pub async fn mark_read(
        &self,
        viewer: &SessionUser,
        notification_id: i32,
    ) -> Result<notification::Model, ServiceError> {
        let found = notification::Entity::find_by_id(notification_id)
            .filter(Self::visibility(viewer))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification", notification_id))?;

        if found.read {
            return Ok(found);
        }

        let mut active: notification::ActiveModel = found.into();
        active.read = Set(true);
        let updated = active.update(&*self.db).await?;
        debug!(notification_id, "notification marked as read");
        Ok(updated)
    }
}
