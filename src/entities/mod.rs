pub mod audit_entry;
pub mod movement;
pub mod notification;
pub mod product;
pub mod state;
pub mod user;

pub use user::Role;
