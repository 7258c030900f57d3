// Product lifecycle
pub mod products;
pub mod recorder;
pub mod states;

// Accounts
pub mod users;

// Bookkeeping
pub mod audit;
pub mod notifications;

// Reporting
pub mod reports;

pub mod views;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use self::{
    audit::AuditService, notifications::NotificationService, products::ProductService,
    recorder::StateRecorder, reports::ReportService, states::StateService, users::UserService,
};

/// Domain services sharing one connection pool; built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub recorder: StateRecorder,
    pub products: ProductService,
    pub users: UserService,
    pub states: StateService,
    pub audit: AuditService,
    pub notifications: NotificationService,
    pub reports: ReportService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            recorder: StateRecorder::new(db.clone()),
            products: ProductService::new(db.clone()),
            users: UserService::new(db.clone()),
            states: StateService::new(db.clone()),
            audit: AuditService::new(db.clone()),
            notifications: NotificationService::new(db.clone()),
            reports: ReportService::new(db),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use sea_orm::{
        ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, Set,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    use super::states::StateService;
    use crate::entities::{product, state, user, Role};

    /// Migrated SQLite database in a temp dir with the lifecycle states seeded.
    pub async fn seeded_db() -> (TempDir, Arc<DatabaseConnection>) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let db = Arc::new(Database::connect(&url).await.unwrap());
        crate::db::run_migrations(&db).await.unwrap();
        StateService::new(db.clone()).ensure_defaults().await.unwrap();
        (dir, db)
    }

    pub async fn insert_user(db: &DatabaseConnection, username: &str, role: Role) -> user::Model {
        user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(crate::auth::hash_password("secret1").unwrap()),
            role: Set(role),
            active: Set(true),
            registered_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    pub async fn state_id(db: &DatabaseConnection, name: &str) -> i32 {
        state::Entity::find()
            .filter(state::Column::Name.eq(name))
            .one(db)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    pub async fn insert_product(db: &DatabaseConnection, name: &str, state_id: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            name: Set(name.to_string()),
            description: Set(None),
            code: Set(None),
            state_id: Set(state_id),
            assigned_user_id: Set(None),
            assigned_at: Set(None),
            due_at: Set(None),
            returned_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }
}
