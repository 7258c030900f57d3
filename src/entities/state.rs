use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const AVAILABLE: &str = "Available";
pub const LOANED: &str = "Loaned";
pub const IN_REPAIR: &str = "In-Repair";
pub const IN_USE: &str = "In-Use";

/// States whose entry posts a broadcast notification.
pub const NOTIFIABLE: [&str; 2] = [IN_REPAIR, IN_USE];

/// Lifecycle states seeded on first start: (name, description, color, sort order).
pub const DEFAULT_STATES: [(&str, &str, &str, i32); 4] = [
    (AVAILABLE, "Product available for use", "#28a745", 1),
    (LOANED, "Product loaned to a user", "#ffc107", 2),
    (IN_REPAIR, "Product under maintenance or repair", "#dc3545", 3),
    (IN_USE, "Product currently in use", "#17a2b8", 4),
];

pub fn is_notifiable(state_name: &str) -> bool {
    NOTIFIABLE.contains(&state_name)
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "states")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub sort_order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product::Entity")]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_repair_and_use_are_notifiable() {
        assert!(is_notifiable(IN_REPAIR));
        assert!(is_notifiable(IN_USE));
        assert!(!is_notifiable(AVAILABLE));
        assert!(!is_notifiable(LOANED));
    }
}
