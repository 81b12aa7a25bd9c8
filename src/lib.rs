//! Contacts, phone numbers, personal contact lists and groups over a
//! Postgres-backed JSON API.

use std::sync::Arc;

use sqlx::PgPool;

pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod invariants;
pub mod models;
pub mod payloads;
pub mod phone_number;
pub mod queries;
pub mod router;
pub mod schema;
pub mod store;

use crate::auth::TokenVerifier;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: Config) -> Self {
        let verifier = Arc::new(TokenVerifier::new(&config.jwt_secret));
        Self {
            db_pool,
            config: Arc::new(config),
            verifier,
        }
    }
}
