//! Read models returned by listing and report endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::entities::{audit_entry, movement, product, state, user};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StateView {
    pub id: i32,
    pub name: String,
    pub color: String,
}

impl From<&state::Model> for StateView {
    fn from(model: &state::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            color: model.color.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub state: Option<StateView>,
    pub assigned_user_id: Option<i32>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementView {
    pub id: i32,
    pub product_id: i32,
    pub product: String,
    pub user: String,
    pub previous_state: String,
    pub new_state: String,
    pub occurred_at: DateTime<Utc>,
    pub detail: Option<String>,
    pub duration_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    pub id: i32,
    pub user: String,
    pub action: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Id-keyed lookups used to denormalize rows.
#[derive(Debug, Default)]
pub struct Lookup {
    pub products: HashMap<i32, String>,
    pub users: HashMap<i32, String>,
    pub states: HashMap<i32, state::Model>,
}

impl Lookup {
    pub fn new(products: &[product::Model], users: &[user::Model], states: &[state::Model]) -> Self {
        Self {
            products: products.iter().map(|p| (p.id, p.name.clone())).collect(),
            users: users.iter().map(|u| (u.id, u.username.clone())).collect(),
            states: states.iter().map(|s| (s.id, s.clone())).collect(),
        }
    }

    pub fn product_name(&self, id: i32) -> String {
        self.products
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id))
    }

    pub fn username(&self, id: i32) -> String {
        self.users
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id))
    }

    pub fn product_view(&self, model: &product::Model) -> ProductView {
        ProductView {
            id: model.id,
            name: model.name.clone(),
            description: model.description.clone(),
            code: model.code.clone(),
            state: self.states.get(&model.state_id).map(StateView::from),
            assigned_user_id: model.assigned_user_id,
            assigned_to: model.assigned_user_id.map(|id| self.username(id)),
            assigned_at: model.assigned_at,
            due_at: model.due_at,
            returned_at: model.returned_at,
        }
    }

    pub fn movement_view(&self, model: &movement::Model) -> MovementView {
        MovementView {
            id: model.id,
            product_id: model.product_id,
            product: self.product_name(model.product_id),
            user: self.username(model.user_id),
            previous_state: model.previous_state.clone(),
            new_state: model.new_state.clone(),
            occurred_at: model.occurred_at,
            detail: model.detail.clone(),
            duration_days: model.duration_days,
        }
    }

    pub fn audit_view(&self, model: &audit_entry::Model) -> AuditView {
        AuditView {
            id: model.id,
            user: self.username(model.user_id),
            action: model.action.clone(),
            detail: model.detail.clone(),
            occurred_at: model.occurred_at,
            ip_address: model.ip_address.clone(),
            user_agent: model.user_agent.clone(),
        }
    }
}

/// Newest first; id breaks timestamp ties.
pub fn newest_first(movements: &mut [movement::Model]) {
    movements.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then(b.id.cmp(&a.id)));
}
