//! Axum handlers, one module per resource.

pub mod contact_list;
pub mod contacts;
pub mod groups;
pub mod health;
pub mod members;
pub mod phones;
