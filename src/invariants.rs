//! Single-primary-phone rule.
//!
//! Callers run [`ensure_single_primary`] inside the transaction that writes
//! the association. The contact row is locked first, so two requests setting
//! a primary phone for the same contact are serialized and the second one
//! sees the first one's commit.

use sqlx::PgConnection;

use crate::error::ApiError;

pub fn primary_conflict_message(contact_id: i64) -> String {
    format!("Contact ID {contact_id} has primary phone already.")
}

/// Rejects `is_primary` when another phone of the contact is already primary.
/// `modifying` is the phone whose association is being updated, if any; it
/// does not count against itself.
pub fn check_single_primary(
    contact_id: i64,
    is_primary: bool,
    current_primaries: &[i64],
    modifying: Option<i64>,
) -> Result<(), ApiError> {
    if !is_primary {
        return Ok(());
    }
    let conflict = current_primaries
        .iter()
        .any(|&phone_id| Some(phone_id) != modifying);
    if conflict {
        Err(ApiError::invariant(primary_conflict_message(contact_id)))
    } else {
        Ok(())
    }
}

/// Locks the contact row for the rest of the transaction. Returns `false`
/// when the contact does not exist.
pub async fn lock_contact(conn: &mut PgConnection, contact_id: i64) -> Result<bool, sqlx::Error> {
    let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM contacts WHERE id = $1 FOR UPDATE")
        .bind(contact_id)
        .fetch_optional(conn)
        .await?;
    Ok(locked.is_some())
}

pub async fn primary_phone_ids(
    conn: &mut PgConnection,
    contact_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT phone_id FROM contact_phones WHERE contact_id = $1 AND is_primary ORDER BY phone_id",
    )
    .bind(contact_id)
    .fetch_all(conn)
    .await
}

/// Transaction-scoped check. Must be called after [`lock_contact`] on the
/// same connection.
pub async fn ensure_single_primary(
    conn: &mut PgConnection,
    contact_id: i64,
    is_primary: bool,
    modifying: Option<i64>,
) -> Result<(), ApiError> {
    if !is_primary {
        return Ok(());
    }
    let current = primary_phone_ids(conn, contact_id).await?;
    check_single_primary(contact_id, is_primary, &current, modifying)
}
