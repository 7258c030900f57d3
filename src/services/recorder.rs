//! Product state transitions and their bookkeeping.
//!
//! Every operation here runs in a single transaction: the product update,
//! the audit entry, the movement and the optional notification are committed
//! together or not at all.

use axum::http::{header::USER_AGENT, HeaderMap};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::auth::SessionUser;
use crate::entities::notification::{self, NotificationKind, Recipient};
use crate::entities::{audit_entry, movement, product, state};
use crate::errors::ServiceError;
use crate::forms::LoanRequest;
use crate::rate_limiter::client_ip;
use crate::services::{audit, notifications};

const USER_AGENT_MAX: usize = 255;

/// Origin of the request that triggered a write, copied onto audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: client_ip(headers),
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(|ua| ua.chars().take(USER_AGENT_MAX).collect()),
        }
    }
}

/// Rows written by one transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub product: product::Model,
    pub movement: movement::Model,
    pub audit_entry: audit_entry::Model,
    pub notification: Option<notification::Model>,
}

struct Bookkeeping<'a> {
    action: &'static str,
    audit_detail: String,
    movement_detail: Option<String>,
    duration_days: Option<i32>,
    notice: Option<(NotificationKind, String)>,
    context: &'a RequestContext,
}

#[derive(Clone)]
pub struct StateRecorder {
    db: Arc<DatabaseConnection>,
}

impl StateRecorder {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction");
            ServiceError::DatabaseError(e)
        })
    }

    /// Moves a product to `target_state_id`.
    ///
    /// Moving a product back to Available also releases its assignment.
    #[instrument(skip(self, actor, context), fields(user_id = actor.id))]
    pub async fn change_state(
        &self,
        actor: &SessionUser,
        product_id: i32,
        target_state_id: i32,
        context: &RequestContext,
    ) -> Result<TransitionRecord, ServiceError> {
        let txn = self.begin().await?;

        let current = load_product(&txn, product_id).await?;
        let from = load_state(&txn, current.state_id).await?;
        let to = state::Entity::find_by_id(target_state_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                warn!(product_id, target_state_id, "Target state not found");
                ServiceError::not_found("State", target_state_id)
            })?;

        let now = Utc::now();
        let mut active: product::ActiveModel = current.clone().into();
        active.state_id = Set(to.id);
        active.updated_at = Set(now);
        if to.name == state::AVAILABLE && current.assigned_user_id.is_some() {
            active.assigned_user_id = Set(None);
            active.returned_at = Set(Some(now));
        }
        let updated = active.update(&txn).await?;

        let notice = state::is_notifiable(&to.name).then(|| {
            (
                NotificationKind::StateChange,
                format!("Product {} has been sent to {}.", updated.name, to.name),
            )
        });
        let book = Bookkeeping {
            action: "State change",
            audit_detail: format!(
                "Product {} changed from {} to {}",
                updated.name, from.name, to.name
            ),
            movement_detail: None,
            duration_days: None,
            notice,
            context,
        };
        let record = write_bookkeeping(&txn, actor, updated, &from, &to, book).await?;

        txn.commit().await?;
        info!(
            product_id,
            previous_state = %from.name,
            new_state = %to.name,
            notified = record.notification.is_some(),
            "Product state changed"
        );
        Ok(record)
    }

    /// Lends an available product to `actor`.
    #[instrument(skip(self, actor, request, context), fields(user_id = actor.id))]
    pub async fn request_loan(
        &self,
        actor: &SessionUser,
        product_id: i32,
        request: &LoanRequest,
        context: &RequestContext,
    ) -> Result<TransitionRecord, ServiceError> {
        let txn = self.begin().await?;

        let current = load_product(&txn, product_id).await?;
        let from = load_state(&txn, current.state_id).await?;
        if from.name != state::AVAILABLE || current.assigned_user_id.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product {} is not available for loan",
                current.name
            )));
        }
        let to = state_named(&txn, state::LOANED).await?;

        let days = request.duration.days();
        let now = Utc::now();
        let mut active: product::ActiveModel = current.into();
        active.state_id = Set(to.id);
        active.assigned_user_id = Set(Some(actor.id));
        active.assigned_at = Set(Some(now));
        active.due_at = Set(Some(now + Duration::days(i64::from(days))));
        active.returned_at = Set(None);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        let book = Bookkeeping {
            action: "Loan request",
            audit_detail: format!(
                "Product {} requested by {} for {} days: {}",
                updated.name, actor.username, days, request.reason
            ),
            movement_detail: Some(request.reason.clone()),
            duration_days: Some(days),
            notice: Some((
                NotificationKind::Loan,
                format!(
                    "Product {} requested by {} for {} days",
                    updated.name, actor.username, days
                ),
            )),
            context,
        };
        let record = write_bookkeeping(&txn, actor, updated, &from, &to, book).await?;

        txn.commit().await?;
        info!(product_id, days, "Product loaned");
        Ok(record)
    }

    /// Returns an assigned product. Only the borrower or an admin may do this.
    #[instrument(skip(self, actor, context), fields(user_id = actor.id))]
    pub async fn return_product(
        &self,
        actor: &SessionUser,
        product_id: i32,
        context: &RequestContext,
    ) -> Result<TransitionRecord, ServiceError> {
        let txn = self.begin().await?;

        let current = load_product(&txn, product_id).await?;
        let assignee = current.assigned_user_id.ok_or_else(|| {
            ServiceError::Conflict(format!("Product {} is not assigned", current.name))
        })?;
        if assignee != actor.id && !actor.is_admin() {
            warn!(product_id, assignee, "Return attempted by someone other than the borrower");
            return Err(ServiceError::Forbidden(
                "Only the borrower or an administrator can return this product".to_string(),
            ));
        }
        let from = load_state(&txn, current.state_id).await?;
        let to = state_named(&txn, state::AVAILABLE).await?;

        let now = Utc::now();
        let mut active: product::ActiveModel = current.into();
        active.state_id = Set(to.id);
        active.assigned_user_id = Set(None);
        active.returned_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        let book = Bookkeeping {
            action: "Product return",
            audit_detail: format!("Product {} returned by {}", updated.name, actor.username),
            movement_detail: Some("Returned".to_string()),
            duration_days: None,
            notice: Some((
                NotificationKind::Return,
                format!("Product {} returned by {}", updated.name, actor.username),
            )),
            context,
        };
        let record = write_bookkeeping(&txn, actor, updated, &from, &to, book).await?;

        txn.commit().await?;
        info!(product_id, "Product returned");
        Ok(record)
    }
}

async fn load_product<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
) -> Result<product::Model, ServiceError> {
    product::Entity::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product", product_id))
}

async fn load_state<C: ConnectionTrait>(
    conn: &C,
    state_id: i32,
) -> Result<state::Model, ServiceError> {
    state::Entity::find_by_id(state_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("State", state_id))
}

async fn state_named<C: ConnectionTrait>(
    conn: &C,
    name: &str,
) -> Result<state::Model, ServiceError> {
    state::Entity::find()
        .filter(state::Column::Name.eq(name))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("State {} not found", name)))
}

async fn write_bookkeeping(
    txn: &DatabaseTransaction,
    actor: &SessionUser,
    product: product::Model,
    from: &state::Model,
    to: &state::Model,
    book: Bookkeeping<'_>,
) -> Result<TransitionRecord, ServiceError> {
    let occurred_at = product.updated_at;

    let audit_entry = audit::record(
        txn,
        audit::NewAuditEntry {
            user_id: actor.id,
            action: book.action,
            detail: book.audit_detail,
            occurred_at,
            context: book.context,
        },
    )
    .await?;

    let movement = movement::ActiveModel {
        product_id: Set(product.id),
        user_id: Set(actor.id),
        previous_state: Set(from.name.clone()),
        new_state: Set(to.name.clone()),
        occurred_at: Set(occurred_at),
        detail: Set(book.movement_detail),
        duration_days: Set(book.duration_days),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let notification = match book.notice {
        Some((kind, message)) => Some(
            notifications::post(
                txn,
                Recipient::Broadcast,
                kind,
                &message,
                Some(format!("/producto/{}/historial", product.id)),
                occurred_at,
            )
            .await?,
        ),
        None => None,
    };

    Ok(TransitionRecord {
        product,
        movement,
        audit_entry,
        notification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Role;
    use crate::forms::LoanDuration;
    use crate::services::test_support::{seeded_db, insert_product, insert_user, state_id};
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;
    use sea_orm::PaginatorTrait;

    fn session(account: &crate::entities::user::Model) -> SessionUser {
        SessionUser {
            id: account.id,
            username: account.username.clone(),
            role: account.role,
            token_id: "test".to_string(),
        }
    }

    #[test]
    fn context_reads_client_address_and_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let context = RequestContext::from_headers(&headers);
        assert_eq!(context.ip_address.as_deref(), Some("198.51.100.7"));
        assert_eq!(context.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(RequestContext::from_headers(&HeaderMap::new()), RequestContext::default());
    }

    #[tokio::test]
    async fn repair_writes_movement_audit_and_broadcast() {
        let (_dir, db) = seeded_db().await;
        let admin = insert_user(&db, "admin", Role::Admin).await;
        let available = state_id(&db, state::AVAILABLE).await;
        let repair = state_id(&db, state::IN_REPAIR).await;
        let laser = insert_product(&db, "Laser Cutter", available).await;

        let recorder = StateRecorder::new(db.clone());
        let record = recorder
            .change_state(&session(&admin), laser.id, repair, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(record.product.state_id, repair);
        assert_eq!(record.movement.previous_state, "Available");
        assert_eq!(record.movement.new_state, "In-Repair");
        assert!(record.audit_entry.detail.as_deref().unwrap().contains("Laser Cutter"));
        let notice = record.notification.expect("repair is notifiable");
        assert!(notice.message.contains("In-Repair"));
        assert_eq!(notice.recipient(), Recipient::Broadcast);

        assert_eq!(movement::Entity::find().count(&*db).await.unwrap(), 1);
        assert_eq!(audit_entry::Entity::find().count(&*db).await.unwrap(), 1);
        assert_eq!(notification::Entity::find().count(&*db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn quiet_states_do_not_notify() {
        let (_dir, db) = seeded_db().await;
        let admin = insert_user(&db, "admin", Role::Admin).await;
        let in_use = state_id(&db, state::IN_USE).await;
        let loaned = state_id(&db, state::LOANED).await;
        let available = state_id(&db, state::AVAILABLE).await;
        let drill = insert_product(&db, "Drill", in_use).await;

        let recorder = StateRecorder::new(db.clone());
        let actor = session(&admin);
        for target in [loaned, available, loaned] {
            let record = recorder
                .change_state(&actor, drill.id, target, &RequestContext::default())
                .await
                .unwrap();
            assert!(record.notification.is_none());
        }
        assert_eq!(movement::Entity::find().count(&*db).await.unwrap(), 3);
        assert_eq!(notification::Entity::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_target_state_writes_nothing() {
        let (_dir, db) = seeded_db().await;
        let admin = insert_user(&db, "admin", Role::Admin).await;
        let available = state_id(&db, state::AVAILABLE).await;
        let scope = insert_product(&db, "Oscilloscope", available).await;

        let err = StateRecorder::new(db.clone())
            .change_state(&session(&admin), scope.id, 9_999, &RequestContext::default())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));

        let unchanged = product::Entity::find_by_id(scope.id).one(&*db).await.unwrap().unwrap();
        assert_eq!(unchanged.state_id, available);
        assert_eq!(movement::Entity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(audit_entry::Entity::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn loan_then_return_round_trip() {
        let (_dir, db) = seeded_db().await;
        let student = insert_user(&db, "student1", Role::Student).await;
        let other = insert_user(&db, "student2", Role::Student).await;
        let available = state_id(&db, state::AVAILABLE).await;
        let loaned = state_id(&db, state::LOANED).await;
        let camera = insert_product(&db, "Camera", available).await;

        let recorder = StateRecorder::new(db.clone());
        let request = LoanRequest {
            reason: "Field trip".to_string(),
            duration: LoanDuration::TwoWeeks,
        };
        let loan = recorder
            .request_loan(&session(&student), camera.id, &request, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(loan.product.state_id, loaned);
        assert_eq!(loan.product.assigned_user_id, Some(student.id));
        assert_eq!(loan.movement.duration_days, Some(14));
        assert_eq!(loan.notification.unwrap().kind, NotificationKind::Loan);

        let again = recorder
            .request_loan(&session(&other), camera.id, &request, &RequestContext::default())
            .await
            .unwrap_err();
        assert_matches!(again, ServiceError::Conflict(_));

        let stranger = recorder
            .return_product(&session(&other), camera.id, &RequestContext::default())
            .await
            .unwrap_err();
        assert_matches!(stranger, ServiceError::Forbidden(_));

        let returned = recorder
            .return_product(&session(&student), camera.id, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(returned.product.state_id, available);
        assert_eq!(returned.product.assigned_user_id, None);
        assert!(returned.product.returned_at.is_some());
        assert_eq!(returned.movement.previous_state, "Loaned");
        assert_eq!(movement::Entity::find().count(&*db).await.unwrap(), 2);
    }
}
