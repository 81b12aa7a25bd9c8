//! Who may see and change what.
//!
//! A group is accessible to a contact that created it or holds any
//! membership row in it. Groups that are not accessible are reported as
//! missing, so their existence never leaks. Inside an accessible group,
//! member reads need membership and member writes need the admin role.

use std::str::FromStr;

use sqlx::PgConnection;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::models::{ContactRow, GroupRow, Role};
use crate::queries;

const GROUP_COLUMNS: &str =
    "g.id, g.name, g.description, g.created_by, g.updated_by, g.created_at, g.updated_at";

/// A `{contact}` path segment: a numeric id or `me`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactRef {
    Me,
    Id(i64),
}

impl FromStr for ContactRef {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "me" {
            return Ok(ContactRef::Me);
        }
        s.parse::<i64>().map(ContactRef::Id).map_err(|_| ApiError::NotFound)
    }
}

/// The requester's relation to one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAccess {
    pub is_creator: bool,
    pub role: Option<Role>,
}

impl GroupAccess {
    pub fn is_accessible(&self) -> bool {
        self.is_creator || self.role.is_some()
    }

    pub fn is_member(&self) -> bool {
        self.role.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    pub fn require_member(&self) -> Result<(), ApiError> {
        if self.is_member() {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "You must be a member of this group to perform this action.",
            ))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "You must be an admin of this group to perform this action.",
            ))
        }
    }
}

/// Rejects a role change or removal that would leave the group without an
/// admin.
pub fn check_keeps_an_admin(
    current: Role,
    next: Option<Role>,
    admin_count: i64,
) -> Result<(), ApiError> {
    let loses_admin = current == Role::Admin && next != Some(Role::Admin);
    if loses_admin && admin_count <= 1 {
        Err(ApiError::invariant("A group must keep at least one admin."))
    } else {
        Ok(())
    }
}

/// The requester's own contact. An account without a contact can reach
/// nothing that depends on one.
pub async fn requester_contact(
    conn: &mut PgConnection,
    principal: &Principal,
) -> Result<ContactRow, ApiError> {
    queries::find_contact_by_account(conn, principal.account_id)
        .await?
        .ok_or(ApiError::NotFound)
}

/// Resolves `{contact}` and checks that the requester owns it or is staff.
pub async fn owned_contact(
    conn: &mut PgConnection,
    principal: &Principal,
    contact: ContactRef,
) -> Result<ContactRow, ApiError> {
    let row = match contact {
        ContactRef::Me => return requester_contact(conn, principal).await,
        ContactRef::Id(id) => queries::find_contact_row(conn, id)
            .await?
            .ok_or(ApiError::NotFound)?,
    };
    if principal.is_staff || row.account_id == principal.account_id {
        Ok(row)
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to perform this action.",
        ))
    }
}

/// Resolves `{contact}` for reads open to any authenticated account.
pub async fn any_contact(
    conn: &mut PgConnection,
    principal: &Principal,
    contact: ContactRef,
) -> Result<ContactRow, ApiError> {
    match contact {
        ContactRef::Me => requester_contact(conn, principal).await,
        ContactRef::Id(id) => queries::find_contact_row(conn, id)
            .await?
            .ok_or(ApiError::NotFound),
    }
}

pub fn require_staff(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_staff {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to perform this action.",
        ))
    }
}

/// Groups the contact created or belongs to, each once, ordered by id.
pub async fn accessible_for(
    conn: &mut PgConnection,
    contact_id: i64,
) -> Result<Vec<GroupRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {GROUP_COLUMNS} FROM groups g \
         WHERE g.created_by = $1 \
         OR EXISTS (SELECT 1 FROM contact_groups cg WHERE cg.group_id = g.id AND cg.contact_id = $1) \
         ORDER BY g.id"
    );
    sqlx::query_as::<_, GroupRow>(&sql)
        .bind(contact_id)
        .fetch_all(conn)
        .await
}

pub async fn membership_role(
    conn: &mut PgConnection,
    group_id: i64,
    contact_id: i64,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_scalar("SELECT role FROM contact_groups WHERE group_id = $1 AND contact_id = $2")
        .bind(group_id)
        .bind(contact_id)
        .fetch_optional(conn)
        .await
}

pub async fn is_group_admin(
    conn: &mut PgConnection,
    group_id: i64,
    contact_id: i64,
) -> Result<bool, sqlx::Error> {
    Ok(membership_role(conn, group_id, contact_id).await? == Some(Role::Admin))
}

pub async fn is_group_member(
    conn: &mut PgConnection,
    group_id: i64,
    contact_id: i64,
) -> Result<bool, sqlx::Error> {
    Ok(membership_role(conn, group_id, contact_id).await?.is_some())
}

pub async fn count_admins(conn: &mut PgConnection, group_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM contact_groups WHERE group_id = $1 AND role = 'admin'")
        .bind(group_id)
        .fetch_one(conn)
        .await
}

/// Loads a group together with the requester's relation to it. Groups that
/// do not exist and groups the requester cannot see are both `NotFound`.
pub async fn accessible_group(
    conn: &mut PgConnection,
    requester: &ContactRow,
    group_id: i64,
) -> Result<(GroupRow, GroupAccess), ApiError> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM groups g WHERE g.id = $1");
    let group = sqlx::query_as::<_, GroupRow>(&sql)
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ApiError::NotFound)?;

    let access = GroupAccess {
        is_creator: group.created_by == requester.id,
        role: membership_role(conn, group_id, requester.id).await?,
    };
    if !access.is_accessible() {
        return Err(ApiError::NotFound);
    }
    Ok((group, access))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_ref_parses_me_and_ids() {
        assert_eq!("me".parse::<ContactRef>().unwrap(), ContactRef::Me);
        assert_eq!("17".parse::<ContactRef>().unwrap(), ContactRef::Id(17));
        assert!(matches!("abc".parse::<ContactRef>(), Err(ApiError::NotFound)));
    }

    #[test]
    fn creator_without_membership_sees_group_but_not_members() {
        let access = GroupAccess {
            is_creator: true,
            role: None,
        };
        assert!(access.is_accessible());
        assert!(matches!(access.require_member(), Err(ApiError::Forbidden(_))));
        assert!(matches!(access.require_admin(), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn member_may_read_but_not_mutate() {
        let access = GroupAccess {
            is_creator: false,
            role: Some(Role::Member),
        };
        assert!(access.require_member().is_ok());
        assert!(matches!(access.require_admin(), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn admin_passes_both_gates() {
        let access = GroupAccess {
            is_creator: false,
            role: Some(Role::Admin),
        };
        assert!(access.require_member().is_ok());
        assert!(access.require_admin().is_ok());
    }

    #[test]
    fn outsider_cannot_see_group() {
        let access = GroupAccess {
            is_creator: false,
            role: None,
        };
        assert!(!access.is_accessible());
    }

    #[test]
    fn last_admin_cannot_step_down_or_leave() {
        assert!(check_keeps_an_admin(Role::Admin, Some(Role::Member), 1).is_err());
        assert!(check_keeps_an_admin(Role::Admin, None, 1).is_err());
        assert!(check_keeps_an_admin(Role::Admin, Some(Role::Member), 2).is_ok());
        assert!(check_keeps_an_admin(Role::Member, None, 1).is_ok());
        assert!(check_keeps_an_admin(Role::Admin, Some(Role::Admin), 1).is_ok());
    }

    #[test]
    fn only_staff_pass_staff_gate() {
        let staff = Principal {
            account_id: 1,
            is_staff: true,
        };
        let user = Principal {
            account_id: 2,
            is_staff: false,
        };
        assert!(require_staff(&staff).is_ok());
        assert!(matches!(require_staff(&user), Err(ApiError::Forbidden(_))));
    }
}
