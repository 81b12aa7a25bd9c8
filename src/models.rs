//! Row types returned by the store and the JSON views built from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgTypeInfo, PgValueRef};
use sqlx::{Decode, FromRow, Postgres, Type};
use thiserror::Error;

use crate::phone_number::{CountryCodeSource, PhoneNumber};

#[derive(Debug, Error)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidChoice(pub String);

/// Implements text-column decoding for a string-backed enum.
macro_rules! text_enum_decode {
    ($ty:ty) => {
        impl Type<Postgres> for $ty {
            fn type_info() -> PgTypeInfo {
                <&str as Type<Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <&str as Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $ty {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let raw = <&'r str as Decode<'r, Postgres>>::decode(value)?;
                Ok(raw.parse()?)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

text_enum_decode!(Role);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneType {
    Cellphone,
    Telephone,
    Telefax,
}

impl PhoneType {
    pub fn as_str(self) -> &'static str {
        match self {
            PhoneType::Cellphone => "cellphone",
            PhoneType::Telephone => "telephone",
            PhoneType::Telefax => "telefax",
        }
    }
}

impl FromStr for PhoneType {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cellphone" => Ok(PhoneType::Cellphone),
            "telephone" => Ok(PhoneType::Telephone),
            "telefax" => Ok(PhoneType::Telefax),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

text_enum_decode!(PhoneType);
text_enum_decode!(CountryCodeSource);

/// A contact joined with the account fields it exposes.
#[derive(Debug, Clone, FromRow)]
pub struct ContactRow {
    pub id: i64,
    pub account_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub nickname: String,
    pub company: String,
    pub title: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A phone as seen through one contact's association row.
#[derive(Debug, Clone, FromRow)]
pub struct ContactPhoneRow {
    pub contact_id: i64,
    pub id: i64,
    pub national_number: String,
    #[sqlx(try_from = "i32")]
    pub country_code: u16,
    pub country_code_source: CountryCodeSource,
    pub phone_type: PhoneType,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_by: i64,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type GroupView = GroupRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneView {
    pub id: i64,
    pub phone_number: PhoneNumber,
    #[serde(rename = "type")]
    pub phone_type: PhoneType,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ContactPhoneRow> for PhoneView {
    fn from(row: ContactPhoneRow) -> Self {
        PhoneView {
            id: row.id,
            phone_number: PhoneNumber {
                value: row.national_number,
                country_code: row.country_code,
                country_code_source: row.country_code_source,
            },
            phone_type: row.phone_type,
            is_primary: row.is_primary,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactView {
    pub id: i64,
    pub account: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub nickname: String,
    pub company: String,
    pub title: String,
    pub phone_numbers: Vec<PhoneView>,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactView {
    pub fn new(row: ContactRow, phone_numbers: Vec<PhoneView>) -> Self {
        ContactView {
            id: row.id,
            account: row.account_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            nickname: row.nickname,
            company: row.company,
            title: row.title,
            phone_numbers,
            address: row.address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// An entry of an owner's contact list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedContactView {
    #[serde(flatten)]
    pub contact: ContactView,
    pub starred: bool,
}

/// A group member with the attributes of its membership row. `invited_by`
/// is null once the inviting contact has been deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    #[serde(flatten)]
    pub contact: ContactView,
    pub role: Role,
    pub invited_by: Option<i64>,
    pub joined_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::Member.to_string(), "member");
        assert_eq!(Role::default(), Role::Member);
    }

    #[test]
    fn unknown_role_is_an_invalid_choice() {
        let err = "owner".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "\"owner\" is not a valid choice.");
    }

    #[test]
    fn phone_type_rejects_unknown_values() {
        assert_eq!("telefax".parse::<PhoneType>().unwrap(), PhoneType::Telefax);
        assert!("pager".parse::<PhoneType>().is_err());
    }

    #[test]
    fn member_view_flattens_contact_fields() {
        let now = Utc::now();
        let contact = ContactView {
            id: 2,
            account: 20,
            first_name: "Bea".into(),
            last_name: "Ng".into(),
            email: "bea@example.com".into(),
            nickname: String::new(),
            company: String::new(),
            title: String::new(),
            phone_numbers: Vec::new(),
            address: String::new(),
            created_at: now,
            updated_at: now,
        };
        let view = MemberView {
            contact,
            role: Role::Member,
            invited_by: Some(1),
            joined_at: now,
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 2);
        assert_eq!(json["role"], "member");
        assert_eq!(json["invited_by"], 1);
        assert!(json.get("contact").is_none());

        let orphaned = MemberView {
            invited_by: None,
            ..view
        };
        let json = serde_json::to_value(&orphaned).unwrap();
        assert!(json["invited_by"].is_null());
    }
}
