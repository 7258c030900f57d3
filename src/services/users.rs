use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::hash_password;
use crate::entities::{user, Role};
use crate::errors::ServiceError;
use crate::forms::{FieldError, FormErrors, Registration};
use crate::services::audit::{self, NewAuditEntry};
use crate::services::recorder::RequestContext;

fn username_taken() -> ServiceError {
    FormErrors::single("username", FieldError::Taken).into()
}

async fn find_by_username<C: ConnectionTrait>(
    conn: &C,
    username: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(conn)
        .await
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an account. A taken username is a validation error on `username`.
    #[instrument(skip(self, registration, context), fields(username = %registration.username))]
    pub async fn register(
        &self,
        registration: Registration,
        context: &RequestContext,
    ) -> Result<user::Model, ServiceError> {
        let txn = self.db.begin().await?;

        if find_by_username(&txn, &registration.username).await?.is_some() {
            warn!("Registration rejected: username already taken");
            return Err(username_taken());
        }

        let password_hash = hash_password(&registration.password)?;
        let now = Utc::now();
        let created = user::ActiveModel {
            username: Set(registration.username),
            password_hash: Set(password_hash),
            role: Set(registration.role),
            active: Set(true),
            registered_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => username_taken(),
            _ => ServiceError::DatabaseError(e),
        })?;

        audit::record(
            &txn,
            NewAuditEntry {
                user_id: created.id,
                action: "User registered",
                detail: format!("User {} registered with role {}", created.username, created.role),
                occurred_at: now,
                context,
            },
        )
        .await?;

        txn.commit().await?;
        info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .order_by_asc(user::Column::Username)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(find_by_username(&*self.db, username).await?)
    }

    /// Creates an administrator, or promotes and resets the password of an
    /// existing account with that name. Returns the account and whether it was created.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(user::Model, bool), ServiceError> {
        let password_hash = hash_password(password)?;
        match self.find_by_username(username).await? {
            Some(existing) => {
                let mut active: user::ActiveModel = existing.into();
                active.role = Set(Role::Admin);
                active.active = Set(true);
                active.password_hash = Set(password_hash);
                let promoted = active.update(&*self.db).await?;
                info!(user_id = promoted.id, "Existing account promoted to admin");
                Ok((promoted, false))
            }
            None => {
                let created = user::ActiveModel {
                    username: Set(username.to_string()),
                    password_hash: Set(password_hash),
                    role: Set(Role::Admin),
                    active: Set(true),
                    registered_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
                info!(user_id = created.id, "Admin account created");
                Ok((created, true))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::entities::audit_entry;
    use crate::services::test_support::seeded_db;
    use assert_matches::assert_matches;
    use sea_orm::PaginatorTrait;

    fn registration(username: &str, role: Role) -> Registration {
        Registration {
            username: username.to_string(),
            password: "secret1".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_without_second_row() {
        let (_dir, db) = seeded_db().await;
        let users = UserService::new(db.clone());
        let ctx = RequestContext::default();

        let first = users.register(registration("maria", Role::Teacher), &ctx).await.unwrap();
        assert!(verify_password("secret1", &first.password_hash));

        let err = users
            .register(registration("maria", Role::Student), &ctx)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Validation(ref e) if e.get("username") == [FieldError::Taken]);

        let count = user::Entity::find()
            .filter(user::Column::Username.eq("maria"))
            .count(&*db)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(audit_entry::Entity::find().count(&*db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ensure_admin_promotes_existing_account() {
        let (_dir, db) = seeded_db().await;
        let users = UserService::new(db.clone());
        users
            .register(registration("keeper", Role::User), &RequestContext::default())
            .await
            .unwrap();

        let (promoted, created) = users.ensure_admin("keeper", "n3w-pass").await.unwrap();
        assert!(!created);
        assert_eq!(promoted.role, Role::Admin);
        assert!(verify_password("n3w-pass", &promoted.password_hash));

        let (_, created) = users.ensure_admin("root", "n3w-pass").await.unwrap();
        assert!(created);
    }
}
