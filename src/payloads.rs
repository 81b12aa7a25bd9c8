//! Inbound JSON payloads and their validation.

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ApiError, FieldErrors, NON_FIELD_ERRORS};
use crate::models::{PhoneType, Role};

pub const SHORT_TEXT_MAX: usize = 128;
pub const LONG_TEXT_MAX: usize = 256;

pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

/// `Json<T>` that reports malformed bodies and failed validation as 400 with
/// field-level detail.
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(rejection_to_error)?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

const BODY_ERROR_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

fn rejection_to_error(rejection: JsonRejection) -> ApiError {
    body_error(&rejection.body_text())
}

/// Attaches a body deserialization failure to the field it names, falling
/// back to `non_field_errors` for syntax errors and nested paths.
fn body_error(text: &str) -> ApiError {
    let mut errors = FieldErrors::new();
    if let Some(field) = missing_field(text) {
        errors.add(field, "This field is required.");
    } else if let Some((field, message)) = field_error(text) {
        errors.add(field, message);
    } else {
        errors.add(NON_FIELD_ERRORS, text);
    }
    ApiError::Validation(errors)
}

/// Extracts `name` from serde's "missing field `name`" message.
fn missing_field(text: &str) -> Option<&str> {
    let start = text.find("missing field `")? + "missing field `".len();
    let len = text[start..].find('`')?;
    Some(&text[start..start + len])
}

/// Splits "field: message at line L column C" into the top-level field and
/// a client-facing message.
fn field_error(text: &str) -> Option<(&str, String)> {
    let detail = text.strip_prefix(BODY_ERROR_PREFIX)?;
    let (path, message) = detail.split_once(": ")?;
    if path.is_empty() || !path.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let message = match message.rfind(" at line ") {
        Some(end) => &message[..end],
        None => message,
    };
    let message = invalid_choice(message).unwrap_or_else(|| message.to_string());
    Some((path, message))
}

fn invalid_choice(message: &str) -> Option<String> {
    let rest = message.strip_prefix("unknown variant `")?;
    let value = &rest[..rest.find('`')?];
    Some(format!("\"{value}\" is not a valid choice."))
}

fn check_len(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        if value.chars().count() > max {
            errors.add(
                field,
                format!("Ensure this field has no more than {max} characters."),
            );
        }
    }
}

fn check_not_blank(errors: &mut FieldErrors, field: &str, value: Option<&str>) {
    if matches!(value, Some(v) if v.trim().is_empty()) {
        errors.add(field, "This field may not be blank.");
    }
}

/// Profile fields shared by contact create and update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFields {
    pub nickname: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub address: Option<String>,
}

impl ProfileFields {
    fn collect_errors(&self, errors: &mut FieldErrors) {
        check_len(errors, "nickname", self.nickname.as_deref(), SHORT_TEXT_MAX);
        check_len(errors, "company", self.company.as_deref(), SHORT_TEXT_MAX);
        check_len(errors, "title", self.title.as_deref(), SHORT_TEXT_MAX);
        check_len(errors, "address", self.address.as_deref(), LONG_TEXT_MAX);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContactPayload {
    pub account: i64,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

impl Validate for CreateContactPayload {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        self.profile.collect_errors(&mut errors);
        errors.into_result()
    }
}

/// Partial update. `account` is accepted only when it names the current
/// owner; the owning account never changes.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateContactPayload {
    pub account: Option<i64>,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

impl Validate for UpdateContactPayload {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        self.profile.collect_errors(&mut errors);
        errors.into_result()
    }
}

impl UpdateContactPayload {
    pub fn check_account_unchanged(&self, current_account: i64) -> Result<(), ApiError> {
        match self.account {
            Some(account) if account != current_account => Err(ApiError::field(
                "account",
                "The owning account of a contact cannot be changed.",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePhonePayload {
    pub phone_number: String,
    pub phone_type: PhoneType,
    #[serde(default)]
    pub is_primary: bool,
}

impl Validate for CreatePhonePayload {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        check_not_blank(&mut errors, "phone_number", Some(&self.phone_number));
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePhonePayload {
    pub phone_number: Option<String>,
    pub phone_type: Option<PhoneType>,
    pub is_primary: Option<bool>,
}

impl Validate for UpdatePhonePayload {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        check_not_blank(&mut errors, "phone_number", self.phone_number.as_deref());
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddContactPayload {
    pub contact: i64,
    #[serde(default)]
    pub starred: bool,
}

impl Validate for AddContactPayload {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StarPayload {
    pub starred: bool,
}

impl Validate for StarPayload {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Validate for CreateGroupPayload {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        check_not_blank(&mut errors, "name", Some(&self.name));
        check_len(&mut errors, "name", Some(&self.name), SHORT_TEXT_MAX);
        check_len(&mut errors, "description", Some(&self.description), LONG_TEXT_MAX);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateGroupPayload {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Validate for UpdateGroupPayload {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        check_not_blank(&mut errors, "name", self.name.as_deref());
        check_len(&mut errors, "name", self.name.as_deref(), SHORT_TEXT_MAX);
        check_len(&mut errors, "description", self.description.as_deref(), LONG_TEXT_MAX);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberPayload {
    pub contact: i64,
    #[serde(default)]
    pub role: Role,
}

impl Validate for AddMemberPayload {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemberPayload {
    pub role: Role,
}

impl Validate for UpdateMemberPayload {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Query string of the all-contacts listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactQuery {
    pub phone_number: Option<String>,
    #[serde(default)]
    pub in_common_groups: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Validate for ContactQuery {
    /// A filter without digits would match every contact.
    fn validate(&self) -> Result<(), ApiError> {
        match self.phone_number.as_deref() {
            Some(raw) if !raw.chars().any(|c| c.is_ascii_digit()) => {
                Err(ApiError::field("phone_number", "Enter a valid phone number."))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::Validation(errors) => errors,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_field_is_extracted_from_serde_message() {
        assert_eq!(
            missing_field("Failed to deserialize the JSON body into the target type: missing field `name` at line 1 column 2"),
            Some("name")
        );
        assert_eq!(missing_field("expected value at line 1 column 1"), None);
    }

    #[test]
    fn unknown_variant_is_reported_on_its_field() {
        let errors = field_errors(body_error(
            "Failed to deserialize the JSON body into the target type: role: unknown variant `owner`, expected `admin` or `member` at line 1 column 30",
        ));
        assert_eq!(
            errors.get("role").map(|m| m[0].as_str()),
            Some("\"owner\" is not a valid choice.")
        );
        assert!(errors.get(NON_FIELD_ERRORS).is_none());
    }

    #[test]
    fn wrong_type_is_reported_on_its_field() {
        let errors = field_errors(body_error(
            "Failed to deserialize the JSON body into the target type: contact: invalid type: string \"x\", expected i64 at line 1 column 15",
        ));
        assert_eq!(
            errors.get("contact").map(|m| m[0].as_str()),
            Some("invalid type: string \"x\", expected i64")
        );
    }

    #[test]
    fn syntax_errors_stay_non_field() {
        let errors = field_errors(body_error(
            "Failed to parse the request body as JSON: EOF while parsing a value at line 1 column 12",
        ));
        assert!(errors.get(NON_FIELD_ERRORS).is_some());
    }

    #[test]
    fn blank_group_name_is_rejected() {
        let payload: CreateGroupPayload =
            serde_json::from_value(serde_json::json!({ "name": "  " })).unwrap();
        let errors = field_errors(payload.validate().unwrap_err());
        assert!(errors.get("name").is_some());
        assert!(errors.get("description").is_none());
    }

    #[test]
    fn overlong_profile_fields_are_reported_per_field() {
        let payload: CreateContactPayload = serde_json::from_value(serde_json::json!({
            "account": 1,
            "nickname": "n".repeat(129),
            "address": "a".repeat(257),
        }))
        .unwrap();
        let errors = field_errors(payload.validate().unwrap_err());
        assert!(errors.get("nickname").is_some());
        assert!(errors.get("address").is_some());
        assert!(errors.get("company").is_none());
    }

    #[test]
    fn account_is_write_once() {
        let payload: UpdateContactPayload =
            serde_json::from_value(serde_json::json!({ "account": 9, "title": "CTO" })).unwrap();
        assert!(payload.check_account_unchanged(9).is_ok());
        let errors = field_errors(payload.check_account_unchanged(3).unwrap_err());
        assert!(errors.get("account").is_some());
    }

    #[test]
    fn member_role_defaults_to_member() {
        let payload: AddMemberPayload =
            serde_json::from_value(serde_json::json!({ "contact": 2 })).unwrap();
        assert_eq!(payload.role, Role::Member);
        assert!(serde_json::from_value::<AddMemberPayload>(
            serde_json::json!({ "contact": 2, "role": "owner" })
        )
        .is_err());
    }

    #[test]
    fn phone_filter_needs_a_digit() {
        let query = |raw: &str| ContactQuery {
            phone_number: Some(raw.to_string()),
            ..ContactQuery::default()
        };
        let errors = field_errors(query("abc").validate().unwrap_err());
        assert!(errors.get("phone_number").is_some());
        assert!(query(" ").validate().is_err());
        assert!(query("+44 20").validate().is_ok());
        assert!(ContactQuery::default().validate().is_ok());
    }

    #[test]
    fn phone_primary_defaults_to_false() {
        let payload: CreatePhonePayload = serde_json::from_value(serde_json::json!({
            "phone_number": "+1 415 555 2671",
            "phone_type": "cellphone",
        }))
        .unwrap();
        assert!(!payload.is_primary);
        assert_eq!(payload.phone_type, PhoneType::Cellphone);
    }
}
