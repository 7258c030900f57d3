use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::entities::state::{self, DEFAULT_STATES};
use crate::errors::ServiceError;

#[derive(Clone)]
pub struct StateService {
    db: Arc<DatabaseConnection>,
}

impl StateService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts any missing lifecycle state; returns how many were created.
    #[instrument(skip(self))]
    pub async fn ensure_defaults(&self) -> Result<usize, ServiceError> {
        let mut created = 0;
        for (name, description, color, sort_order) in DEFAULT_STATES {
            if self.find_by_name(name).await?.is_some() {
                continue;
            }
            state::ActiveModel {
                name: Set(name.to_string()),
                description: Set(Some(description.to_string())),
                color: Set(color.to_string()),
                sort_order: Set(sort_order),
                ..Default::default()
            }
            .insert(&*self.db)
            .await?;
            created += 1;
        }
        if created > 0 {
            info!(created, "seeded lifecycle states");
        }
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<state::Model>, ServiceError> {
        Ok(state::Entity::find()
            .order_by_asc(state::Column::SortOrder)
            .order_by_asc(state::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<state::Model>, ServiceError> {
        Ok(state::Entity::find()
            .filter(state::Column::Name.eq(name))
            .one(&*self.db)
            .await?)
    }
}
