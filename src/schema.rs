//! Database connection pool and embedded schema migrations.

use std::time::Duration;

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub mod constraints {
    pub const MEMBERSHIP_UNIQUE: &str = "contact_memberships_owner_contact_key";
    pub const CONTACT_ACCOUNT_UNIQUE: &str = "contacts_account_id_key";
    pub const CONTACT_PHONE_UNIQUE: &str = "contact_phones_contact_phone_key";
    pub const ONE_PRIMARY_PHONE: &str = "contact_phones_one_primary_idx";
    pub const CONTACT_GROUP_UNIQUE: &str = "contact_groups_contact_group_key";
}

pub async fn establish_connection_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
}

/// Builds a pool that only connects on first use.
pub fn lazy_connection_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(&config.database_url)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
