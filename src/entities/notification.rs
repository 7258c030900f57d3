use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Who a notification is addressed to. Stored as a nullable `recipient_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "user_id", rename_all = "snake_case")]
pub enum Recipient {
    Direct(i32),
    Broadcast,
}

impl Recipient {
    pub fn from_column(recipient_id: Option<i32>) -> Self {
        match recipient_id {
            Some(id) => Recipient::Direct(id),
            None => Recipient::Broadcast,
        }
    }

    pub fn to_column(self) -> Option<i32> {
        match self {
            Recipient::Direct(id) => Some(id),
            Recipient::Broadcast => None,
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "state_change")]
    StateChange,
    #[sea_orm(string_value = "loan")]
    Loan,
    #[sea_orm(string_value = "return")]
    Return,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub recipient_id: Option<i32>,
    pub kind: NotificationKind,
    pub link: Option<String>,
}

impl Model {
    pub fn recipient(&self) -> Recipient {
        Recipient::from_column(self.recipient_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RecipientId",
        to = "super::user::Column::Id"
    )]
    Recipient,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
