use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::SessionUser;
use crate::entities::{movement, product, state, user};
use crate::errors::ServiceError;
use crate::forms::{FieldError, FormErrors, NewProduct};
use crate::services::audit::{self, NewAuditEntry};
use crate::services::recorder::RequestContext;
use crate::services::views::{newest_first, Lookup, MovementView, ProductView};

/// Product catalogue queries and creation.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn lookup(&self, products: &[product::Model]) -> Result<Lookup, ServiceError> {
        let users = user::Entity::find().all(&*self.db).await?;
        let states = state::Entity::find().all(&*self.db).await?;
        Ok(Lookup::new(products, &users, &states))
    }

    async fn views(&self, products: Vec<product::Model>) -> Result<Vec<ProductView>, ServiceError> {
        let lookup = self.lookup(&products).await?;
        Ok(products.iter().map(|p| lookup.product_view(p)).collect())
    }

    pub async fn list(&self) -> Result<Vec<ProductView>, ServiceError> {
        let products = product::Entity::find()
            .order_by_asc(product::Column::Name)
            .order_by_asc(product::Column::Id)
            .all(&*self.db)
            .await?;
        self.views(products).await
    }

    pub async fn get(&self, product_id: i32) -> Result<ProductView, ServiceError> {
        let found = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        let lookup = self.lookup(std::slice::from_ref(&found)).await?;
        Ok(lookup.product_view(&found))
    }

    /// Products currently assigned to `user_id`, in any state.
    pub async fn assigned_to(&self, user_id: i32) -> Result<Vec<ProductView>, ServiceError> {
        let products = product::Entity::find()
            .filter(product::Column::AssignedUserId.eq(user_id))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        self.views(products).await
    }

    pub async fn in_state(&self, state_name: &str) -> Result<Vec<ProductView>, ServiceError> {
        let products = product::Entity::find()
            .inner_join(state::Entity)
            .filter(state::Column::Name.eq(state_name))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        self.views(products).await
    }

    /// Products `user_id` currently has on loan.
    pub async fn loaned_to(&self, user_id: i32) -> Result<Vec<ProductView>, ServiceError> {
        let products = product::Entity::find()
            .inner_join(state::Entity)
            .filter(state::Column::Name.eq(state::LOANED))
            .filter(product::Column::AssignedUserId.eq(user_id))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        self.views(products).await
    }

    /// Movement history of one product, newest first.
    pub async fn history(&self, product_id: i32) -> Result<Vec<MovementView>, ServiceError> {
        let found = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let mut movements = movement::Entity::find()
            .filter(movement::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;
        newest_first(&mut movements);

        let lookup = self.lookup(std::slice::from_ref(&found)).await?;
        Ok(movements.iter().map(|m| lookup.movement_view(m)).collect())
    }

    #[instrument(skip(self, actor, input, context), fields(user_id = actor.id, name = %input.name))]
    pub async fn create(
        &self,
        actor: &SessionUser,
        input: NewProduct,
        context: &RequestContext,
    ) -> Result<product::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let initial = state::Entity::find_by_id(input.state_id).one(&txn).await?;
        let initial = match initial {
            Some(found) => found,
            None => return Err(FormErrors::single("state_id", FieldError::InvalidChoice).into()),
        };

        if let Some(code) = input.code.as_deref() {
            let clash = product::Entity::find()
                .filter(product::Column::Code.eq(code))
                .one(&txn)
                .await?;
            if clash.is_some() {
                return Err(FormErrors::single("code", FieldError::CodeInUse).into());
            }
        }

        let now = Utc::now();
        let created = product::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            code: Set(input.code),
            state_id: Set(initial.id),
            assigned_user_id: Set(None),
            assigned_at: Set(None),
            due_at: Set(None),
            returned_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(code_conflict)?;

        audit::record(
            &txn,
            NewAuditEntry {
                user_id: actor.id,
                action: "Product created",
                detail: format!("Product {} created in state {}", created.name, initial.name),
                occurred_at: now,
                context,
            },
        )
        .await?;

        txn.commit().await?;
        info!(product_id = created.id, "Product created");
        Ok(created)
    }
}

/// A concurrent insert can still trip the unique index on `code`.
fn code_conflict(err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            FormErrors::single("code", FieldError::CodeInUse).into()
        }
        _ => ServiceError::DatabaseError(err),
    }
}
