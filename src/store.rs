//! Write-side data access. Each function is one statement; callers compose
//! them inside a transaction.

use sqlx::PgConnection;

use crate::error::{unique_violation, ApiError};
use crate::models::{GroupRow, PhoneType, Role};
use crate::payloads::ProfileFields;
use crate::phone_number::PhoneNumber;
use crate::schema::constraints;

/// Translates a unique violation on `constraint` into a validation error.
fn on_unique(err: sqlx::Error, constraint: &str, field: &str, message: &str) -> ApiError {
    match unique_violation(&err) {
        Some(name) if name == constraint => ApiError::field(field, message),
        _ => ApiError::Database(err),
    }
}

pub async fn account_exists(conn: &mut PgConnection, account_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
        .bind(account_id)
        .fetch_one(conn)
        .await
}

pub async fn contact_exists(conn: &mut PgConnection, contact_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM contacts WHERE id = $1)")
        .bind(contact_id)
        .fetch_one(conn)
        .await
}

pub fn unknown_pk(field: &str, id: i64) -> ApiError {
    ApiError::field(field, format!("Invalid pk \"{id}\" - object does not exist."))
}

pub async fn insert_contact(
    conn: &mut PgConnection,
    account_id: i64,
    profile: &ProfileFields,
) -> Result<i64, ApiError> {
    sqlx::query_scalar(
        "INSERT INTO contacts (account_id, nickname, company, title, address) \
         VALUES ($1, COALESCE($2, ''), COALESCE($3, ''), COALESCE($4, ''), COALESCE($5, '')) \
         RETURNING id",
    )
    .bind(account_id)
    .bind(profile.nickname.as_deref())
    .bind(profile.company.as_deref())
    .bind(profile.title.as_deref())
    .bind(profile.address.as_deref())
    .fetch_one(conn)
    .await
    .map_err(|e| {
        on_unique(
            e,
            constraints::CONTACT_ACCOUNT_UNIQUE,
            "account",
            "contact with this account already exists.",
        )
    })
}

/// Applies the fields present in `profile`; absent fields keep their value.
pub async fn update_contact(
    conn: &mut PgConnection,
    contact_id: i64,
    profile: &ProfileFields,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE contacts SET \
         nickname = COALESCE($2, nickname), \
         company = COALESCE($3, company), \
         title = COALESCE($4, title), \
         address = COALESCE($5, address), \
         updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(contact_id)
    .bind(profile.nickname.as_deref())
    .bind(profile.company.as_deref())
    .bind(profile.title.as_deref())
    .bind(profile.address.as_deref())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_contact(conn: &mut PgConnection, contact_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
        .bind(contact_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns the id of the shared phone row for `(number, type)`, creating it
/// if needed.
pub async fn find_or_create_phone(
    conn: &mut PgConnection,
    number: &PhoneNumber,
    phone_type: PhoneType,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO phones (national_number, country_code, country_code_source, phone_type) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (national_number, country_code, phone_type) \
         DO UPDATE SET updated_at = phones.updated_at \
         RETURNING id",
    )
    .bind(&number.value)
    .bind(i32::from(number.country_code))
    .bind(number.country_code_source.as_str())
    .bind(phone_type.as_str())
    .fetch_one(conn)
    .await
}

fn phone_link_error(err: sqlx::Error, contact_id: i64) -> ApiError {
    match unique_violation(&err).as_deref() {
        Some(constraints::CONTACT_PHONE_UNIQUE) => ApiError::field(
            "phone_number",
            "This phone number is already registered for this contact.",
        ),
        Some(constraints::ONE_PRIMARY_PHONE) => {
            ApiError::invariant(crate::invariants::primary_conflict_message(contact_id))
        }
        _ => ApiError::Database(err),
    }
}

pub async fn link_phone(
    conn: &mut PgConnection,
    contact_id: i64,
    phone_id: i64,
    is_primary: bool,
) -> Result<(), ApiError> {
    sqlx::query("INSERT INTO contact_phones (contact_id, phone_id, is_primary) VALUES ($1, $2, $3)")
        .bind(contact_id)
        .bind(phone_id)
        .bind(is_primary)
        .execute(conn)
        .await
        .map_err(|e| phone_link_error(e, contact_id))?;
    Ok(())
}

/// Points the contact's association for `old_phone_id` at `new_phone_id`
/// and sets its primary flag.
pub async fn relink_phone(
    conn: &mut PgConnection,
    contact_id: i64,
    old_phone_id: i64,
    new_phone_id: i64,
    is_primary: bool,
) -> Result<bool, ApiError> {
    let result = sqlx::query(
        "UPDATE contact_phones SET phone_id = $3, is_primary = $4 \
         WHERE contact_id = $1 AND phone_id = $2",
    )
    .bind(contact_id)
    .bind(old_phone_id)
    .bind(new_phone_id)
    .bind(is_primary)
    .execute(conn)
    .await
    .map_err(|e| phone_link_error(e, contact_id))?;
    Ok(result.rows_affected() > 0)
}

pub async fn unlink_phone(
    conn: &mut PgConnection,
    contact_id: i64,
    phone_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contact_phones WHERE contact_id = $1 AND phone_id = $2")
        .bind(contact_id)
        .bind(phone_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes the phone row if no contact references it any more.
pub async fn delete_orphan_phone(conn: &mut PgConnection, phone_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM phones p WHERE p.id = $1 \
         AND NOT EXISTS (SELECT 1 FROM contact_phones cp WHERE cp.phone_id = p.id)",
    )
    .bind(phone_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn membership_exists(
    conn: &mut PgConnection,
    owner_id: i64,
    contact_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM contact_memberships WHERE owner_id = $1 AND contact_id = $2)",
    )
    .bind(owner_id)
    .bind(contact_id)
    .fetch_one(conn)
    .await
}

pub fn already_listed(contact_id: i64) -> ApiError {
    ApiError::field(
        "contact",
        format!("Contact ID {contact_id} is already in the contact list."),
    )
}

pub async fn insert_membership(
    conn: &mut PgConnection,
    owner_id: i64,
    contact_id: i64,
    starred: bool,
) -> Result<(), ApiError> {
    sqlx::query("INSERT INTO contact_memberships (owner_id, contact_id, starred) VALUES ($1, $2, $3)")
        .bind(owner_id)
        .bind(contact_id)
        .bind(starred)
        .execute(conn)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(constraints::MEMBERSHIP_UNIQUE) => already_listed(contact_id),
            _ => ApiError::Database(e),
        })?;
    Ok(())
}

pub async fn set_starred(
    conn: &mut PgConnection,
    owner_id: i64,
    contact_id: i64,
    starred: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE contact_memberships SET starred = $3 WHERE owner_id = $1 AND contact_id = $2",
    )
    .bind(owner_id)
    .bind(contact_id)
    .bind(starred)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_membership(
    conn: &mut PgConnection,
    owner_id: i64,
    contact_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contact_memberships WHERE owner_id = $1 AND contact_id = $2")
        .bind(owner_id)
        .bind(contact_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_group(
    conn: &mut PgConnection,
    creator_id: i64,
    name: &str,
    description: &str,
) -> Result<GroupRow, sqlx::Error> {
    sqlx::query_as::<_, GroupRow>(
        "INSERT INTO groups (name, description, created_by) VALUES ($1, $2, $3) \
         RETURNING id, name, description, created_by, updated_by, created_at, updated_at",
    )
    .bind(name)
    .bind(description)
    .bind(creator_id)
    .fetch_one(conn)
    .await
}

/// Stamps `updated_by` with the acting contact; absent fields keep their
/// value.
pub async fn update_group(
    conn: &mut PgConnection,
    group_id: i64,
    name: Option<&str>,
    description: Option<&str>,
    updated_by: i64,
) -> Result<Option<GroupRow>, sqlx::Error> {
    sqlx::query_as::<_, GroupRow>(
        "UPDATE groups SET \
         name = COALESCE($2, name), \
         description = COALESCE($3, description), \
         updated_by = $4, \
         updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, name, description, created_by, updated_by, created_at, updated_at",
    )
    .bind(group_id)
    .bind(name)
    .bind(description)
    .bind(updated_by)
    .fetch_optional(conn)
    .await
}

pub async fn delete_group(conn: &mut PgConnection, group_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM groups WHERE id = $1")
        .bind(group_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// A membership row about to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewContactGroup {
    pub group_id: i64,
    pub contact_id: i64,
    pub role: Role,
    pub inviter_id: i64,
}

impl NewContactGroup {
    /// The creator's own row: admin, invited by itself.
    pub fn admin_of(group_id: i64, creator_id: i64) -> Self {
        NewContactGroup {
            group_id,
            contact_id: creator_id,
            role: Role::Admin,
            inviter_id: creator_id,
        }
    }

    pub fn invited(group_id: i64, contact_id: i64, role: Role, inviter_id: i64) -> Self {
        NewContactGroup {
            group_id,
            contact_id,
            role,
            inviter_id,
        }
    }
}

/// Inserts the group and its creator's admin row. Run it inside a
/// transaction so a failed membership insert leaves no orphan group.
pub async fn create_group(
    conn: &mut PgConnection,
    creator_id: i64,
    name: &str,
    description: &str,
) -> Result<GroupRow, ApiError> {
    let group = insert_group(&mut *conn, creator_id, name, description).await?;
    insert_contact_group(conn, NewContactGroup::admin_of(group.id, creator_id)).await?;
    Ok(group)
}

pub fn already_member(contact_id: i64) -> ApiError {
    ApiError::field(
        "contact",
        format!("Contact ID {contact_id} is already a member of this group."),
    )
}

pub async fn insert_contact_group(
    conn: &mut PgConnection,
    new: NewContactGroup,
) -> Result<(), ApiError> {
    sqlx::query(
        "INSERT INTO contact_groups (contact_id, group_id, role, inviter_id) VALUES ($1, $2, $3, $4)",
    )
    .bind(new.contact_id)
    .bind(new.group_id)
    .bind(new.role.as_str())
    .bind(new.inviter_id)
    .execute(conn)
    .await
    .map_err(|e| match unique_violation(&e).as_deref() {
        Some(constraints::CONTACT_GROUP_UNIQUE) => already_member(new.contact_id),
        _ => ApiError::Database(e),
    })?;
    Ok(())
}

pub async fn update_member_role(
    conn: &mut PgConnection,
    group_id: i64,
    contact_id: i64,
    role: Role,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE contact_groups SET role = $3 WHERE group_id = $1 AND contact_id = $2")
            .bind(group_id)
            .bind(contact_id)
            .bind(role.as_str())
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_member(
    conn: &mut PgConnection,
    group_id: i64,
    contact_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contact_groups WHERE group_id = $1 AND contact_id = $2")
        .bind(group_id)
        .bind(contact_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Locks the group's membership rows for the rest of the transaction.
pub async fn lock_group_members(conn: &mut PgConnection, group_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT id FROM contact_groups WHERE group_id = $1 FOR UPDATE")
        .bind(group_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub fn self_listing() -> ApiError {
    ApiError::field("contact", "A contact cannot add itself to its own contact list.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creator_row_is_self_invited_admin() {
        let row = NewContactGroup::admin_of(5, 1);
        assert_eq!(row.role, Role::Admin);
        assert_eq!(row.contact_id, 1);
        assert_eq!(row.inviter_id, 1);
        assert_eq!(row.group_id, 5);
    }

    #[test]
    fn invited_row_keeps_inviter() {
        let row = NewContactGroup::invited(5, 2, Role::Member, 1);
        assert_eq!(row.contact_id, 2);
        assert_eq!(row.inviter_id, 1);
        assert_eq!(row.role, Role::Member);
    }

    #[test]
    fn unknown_pk_message_names_the_id() {
        match unknown_pk("contact", 99) {
            ApiError::Validation(errors) => assert_eq!(
                errors.get("contact").unwrap(),
                ["Invalid pk \"99\" - object does not exist.".to_string()]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }
}
