//! Read views over the contact graph.
//!
//! Every listing runs one query for the primary rows and one batch query for
//! their phone numbers, then joins the two in memory. Nothing here issues a
//! query per row.

use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::models::{
    ContactPhoneRow, ContactRow, ContactView, ListedContactView, MemberView, PhoneView, Role,
};

pub const DEFAULT_LIMIT: i64 = 10_000;

const CONTACT_COLUMNS: &str = "c.id, c.account_id, a.first_name, a.last_name, a.email, \
     c.nickname, c.company, c.title, c.address, c.created_at, c.updated_at";

const PHONE_COLUMNS: &str = "cp.contact_id, p.id, p.national_number, p.country_code, \
     p.country_code_source, p.phone_type, cp.is_primary, p.created_at, p.updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
struct ListedContactRow {
    #[sqlx(flatten)]
    contact: ContactRow,
    starred: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MemberRow {
    #[sqlx(flatten)]
    contact: ContactRow,
    role: Role,
    invited_by: Option<i64>,
    joined_at: chrono::DateTime<chrono::Utc>,
}

/// Filters accepted by the all-contacts listing.
#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    /// Substring matched against the E.164 form of any of the contact's phones.
    pub phone_number: Option<String>,
    /// Restrict to contacts sharing a group accessible to this contact.
    pub in_common_groups_with: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Groups phone rows by contact id, keeping the query's order within each
/// contact.
pub fn group_phones(phones: Vec<ContactPhoneRow>) -> HashMap<i64, Vec<PhoneView>> {
    let mut by_contact: HashMap<i64, Vec<PhoneView>> = HashMap::new();
    for row in phones {
        by_contact.entry(row.contact_id).or_default().push(row.into());
    }
    by_contact
}

/// Joins contact rows with their phones. Contacts without phones get an empty
/// list; phones of contacts not in `rows` are dropped.
pub fn attach_phones(rows: Vec<ContactRow>, phones: Vec<ContactPhoneRow>) -> Vec<ContactView> {
    let mut by_contact = group_phones(phones);
    rows.into_iter()
        .map(|row| {
            let phones = by_contact.remove(&row.id).unwrap_or_default();
            ContactView::new(row, phones)
        })
        .collect()
}

pub async fn phones_for(
    conn: &mut PgConnection,
    contact_ids: &[i64],
) -> Result<Vec<ContactPhoneRow>, sqlx::Error> {
    if contact_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {PHONE_COLUMNS} FROM contact_phones cp \
         JOIN phones p ON p.id = cp.phone_id \
         WHERE cp.contact_id = ANY($1) \
         ORDER BY cp.contact_id, p.id"
    );
    sqlx::query_as::<_, ContactPhoneRow>(&sql)
        .bind(contact_ids)
        .fetch_all(conn)
        .await
}

async fn with_phones(
    conn: &mut PgConnection,
    rows: Vec<ContactRow>,
) -> Result<Vec<ContactView>, sqlx::Error> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let phones = phones_for(conn, &ids).await?;
    Ok(attach_phones(rows, phones))
}

pub async fn list_contacts(
    conn: &mut PgConnection,
    filter: &ContactFilter,
) -> Result<Vec<ContactView>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts c JOIN accounts a ON a.id = c.account_id WHERE TRUE"
    ));

    if let Some(fragment) = filter.phone_number.as_deref().map(phone_fragment) {
        qb.push(
            " AND EXISTS (SELECT 1 FROM contact_phones cp JOIN phones p ON p.id = cp.phone_id \
             WHERE cp.contact_id = c.id \
             AND ('+' || p.country_code::text || p.national_number) LIKE ",
        );
        qb.push_bind(format!("%{fragment}%"));
        qb.push(")");
    }

    if let Some(requester) = filter.in_common_groups_with {
        qb.push(
            " AND EXISTS (SELECT 1 FROM contact_groups cg \
             JOIN groups g ON g.id = cg.group_id \
             WHERE cg.contact_id = c.id AND (g.created_by = ",
        );
        qb.push_bind(requester);
        qb.push(
            " OR EXISTS (SELECT 1 FROM contact_groups mine \
             WHERE mine.group_id = g.id AND mine.contact_id = ",
        );
        qb.push_bind(requester);
        qb.push(")))");
    }

    qb.push(" ORDER BY c.id LIMIT ");
    qb.push_bind(filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(0, DEFAULT_LIMIT));
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset.unwrap_or(0).max(0));

    let rows = qb.build_query_as::<ContactRow>().fetch_all(&mut *conn).await?;
    with_phones(conn, rows).await
}

pub async fn find_contact_row(
    conn: &mut PgConnection,
    contact_id: i64,
) -> Result<Option<ContactRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts c JOIN accounts a ON a.id = c.account_id \
         WHERE c.id = $1"
    );
    sqlx::query_as::<_, ContactRow>(&sql)
        .bind(contact_id)
        .fetch_optional(conn)
        .await
}

pub async fn find_contact_by_account(
    conn: &mut PgConnection,
    account_id: i64,
) -> Result<Option<ContactRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts c JOIN accounts a ON a.id = c.account_id \
         WHERE c.account_id = $1"
    );
    sqlx::query_as::<_, ContactRow>(&sql)
        .bind(account_id)
        .fetch_optional(conn)
        .await
}

pub async fn get_contact(
    conn: &mut PgConnection,
    contact_id: i64,
) -> Result<Option<ContactView>, sqlx::Error> {
    match find_contact_row(&mut *conn, contact_id).await? {
        Some(row) => Ok(with_phones(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Phones of one contact, `is_primary` taken from the association row.
pub async fn list_phones(
    conn: &mut PgConnection,
    contact_id: i64,
) -> Result<Vec<PhoneView>, sqlx::Error> {
    let rows = phones_for(conn, &[contact_id]).await?;
    Ok(rows.into_iter().map(PhoneView::from).collect())
}

pub async fn get_phone(
    conn: &mut PgConnection,
    contact_id: i64,
    phone_id: i64,
) -> Result<Option<PhoneView>, sqlx::Error> {
    let sql = format!(
        "SELECT {PHONE_COLUMNS} FROM contact_phones cp \
         JOIN phones p ON p.id = cp.phone_id \
         WHERE cp.contact_id = $1 AND cp.phone_id = $2"
    );
    let row = sqlx::query_as::<_, ContactPhoneRow>(&sql)
        .bind(contact_id)
        .bind(phone_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(PhoneView::from))
}

fn listed_views(rows: Vec<ListedContactRow>, phones: Vec<ContactPhoneRow>) -> Vec<ListedContactView> {
    let mut by_contact = group_phones(phones);
    rows.into_iter()
        .map(|row| {
            let phones = by_contact.remove(&row.contact.id).unwrap_or_default();
            ListedContactView {
                contact: ContactView::new(row.contact, phones),
                starred: row.starred,
            }
        })
        .collect()
}

async fn fetch_contact_list(
    conn: &mut PgConnection,
    owner_id: i64,
    contact_id: Option<i64>,
) -> Result<Vec<ListedContactView>, sqlx::Error> {
    let sql = format!(
        "SELECT {CONTACT_COLUMNS}, m.starred FROM contact_memberships m \
         JOIN contacts c ON c.id = m.contact_id \
         JOIN accounts a ON a.id = c.account_id \
         WHERE m.owner_id = $1 AND ($2::BIGINT IS NULL OR m.contact_id = $2) \
         ORDER BY c.id"
    );
    let rows = sqlx::query_as::<_, ListedContactRow>(&sql)
        .bind(owner_id)
        .bind(contact_id)
        .fetch_all(&mut *conn)
        .await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.contact.id).collect();
    let phones = phones_for(conn, &ids).await?;
    Ok(listed_views(rows, phones))
}

/// The owner's personal contact list, each entry annotated with `starred`.
pub async fn list_contact_list(
    conn: &mut PgConnection,
    owner_id: i64,
) -> Result<Vec<ListedContactView>, sqlx::Error> {
    fetch_contact_list(conn, owner_id, None).await
}

pub async fn get_contact_list_entry(
    conn: &mut PgConnection,
    owner_id: i64,
    contact_id: i64,
) -> Result<Option<ListedContactView>, sqlx::Error> {
    Ok(fetch_contact_list(conn, owner_id, Some(contact_id))
        .await?
        .pop())
}

fn member_views(rows: Vec<MemberRow>, phones: Vec<ContactPhoneRow>) -> Vec<MemberView> {
    let mut by_contact = group_phones(phones);
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.contact.id))
        .map(|row| {
            let phones = by_contact.remove(&row.contact.id).unwrap_or_default();
            MemberView {
                contact: ContactView::new(row.contact, phones),
                role: row.role,
                invited_by: row.invited_by,
                joined_at: row.joined_at,
            }
        })
        .collect()
}

async fn fetch_members(
    conn: &mut PgConnection,
    group_id: i64,
    contact_id: Option<i64>,
) -> Result<Vec<MemberView>, sqlx::Error> {
    let sql = format!(
        "SELECT DISTINCT ON (c.id) {CONTACT_COLUMNS}, cg.role, cg.inviter_id AS invited_by, \
         cg.joined_at FROM contact_groups cg \
         JOIN contacts c ON c.id = cg.contact_id \
         JOIN accounts a ON a.id = c.account_id \
         WHERE cg.group_id = $1 AND ($2::BIGINT IS NULL OR cg.contact_id = $2) \
         ORDER BY c.id"
    );
    let rows = sqlx::query_as::<_, MemberRow>(&sql)
        .bind(group_id)
        .bind(contact_id)
        .fetch_all(&mut *conn)
        .await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.contact.id).collect();
    let phones = phones_for(conn, &ids).await?;
    Ok(member_views(rows, phones))
}

/// Members of a group with their role, inviter and join time.
pub async fn list_group_members(
    conn: &mut PgConnection,
    group_id: i64,
) -> Result<Vec<MemberView>, sqlx::Error> {
    fetch_members(conn, group_id, None).await
}

pub async fn get_group_member(
    conn: &mut PgConnection,
    group_id: i64,
    contact_id: i64,
) -> Result<Option<MemberView>, sqlx::Error> {
    Ok(fetch_members(conn, group_id, Some(contact_id)).await?.pop())
}

/// Keeps the characters that can appear in a stored E.164 number.
fn phone_fragment(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhoneType;
    use crate::phone_number::CountryCodeSource;
    use chrono::Utc;

    fn contact(id: i64) -> ContactRow {
        let now = Utc::now();
        ContactRow {
            id,
            account_id: id * 10,
            first_name: format!("First{id}"),
            last_name: format!("Last{id}"),
            email: format!("c{id}@example.com"),
            nickname: String::new(),
            company: String::new(),
            title: String::new(),
            address: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn phone(contact_id: i64, id: i64, is_primary: bool) -> ContactPhoneRow {
        let now = Utc::now();
        ContactPhoneRow {
            contact_id,
            id,
            national_number: format!("415555{id:04}"),
            country_code: 1,
            country_code_source: CountryCodeSource::FromDefaultCountry,
            phone_type: PhoneType::Cellphone,
            is_primary,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn phones_are_attached_to_their_own_contact() {
        let views = attach_phones(
            vec![contact(1), contact(2), contact(3)],
            vec![phone(1, 10, true), phone(3, 11, false), phone(1, 12, false)],
        );

        assert_eq!(views.len(), 3);
        let ids: Vec<Vec<i64>> = views
            .iter()
            .map(|v| v.phone_numbers.iter().map(|p| p.id).collect())
            .collect();
        assert_eq!(ids, vec![vec![10, 12], vec![], vec![11]]);
        assert!(views[0].phone_numbers[0].is_primary);
        assert!(!views[0].phone_numbers[1].is_primary);
    }

    #[test]
    fn stray_phones_are_ignored() {
        let views = attach_phones(vec![contact(1)], vec![phone(9, 1, true)]);
        assert!(views[0].phone_numbers.is_empty());
    }

    #[test]
    fn contact_order_is_preserved() {
        let views = attach_phones(vec![contact(5), contact(2)], Vec::new());
        let ids: Vec<i64> = views.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![5, 2]);
    }

    #[test]
    fn member_views_drop_duplicate_contacts() {
        let now = Utc::now();
        let row = |id: i64, role: Role| MemberRow {
            contact: contact(id),
            role,
            invited_by: Some(1),
            joined_at: now,
        };
        let views = member_views(
            vec![row(1, Role::Admin), row(1, Role::Admin), row(2, Role::Member)],
            vec![phone(2, 7, true)],
        );

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].role, Role::Admin);
        assert_eq!(views[1].contact.phone_numbers.len(), 1);
    }

    #[test]
    fn listed_views_carry_starred_flag() {
        let views = listed_views(
            vec![
                ListedContactRow {
                    contact: contact(2),
                    starred: true,
                },
                ListedContactRow {
                    contact: contact(4),
                    starred: false,
                },
            ],
            vec![phone(4, 3, false)],
        );
        assert!(views[0].starred);
        assert!(!views[1].starred);
        assert_eq!(views[1].contact.phone_numbers[0].id, 3);
    }

    #[test]
    fn phone_fragment_keeps_digits_and_plus() {
        assert_eq!(phone_fragment("+1 (415) 555"), "+1415555");
    }
}
