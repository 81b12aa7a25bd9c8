//! `/contacts/:contact/phone-numbers` and `/contacts/:contact/phone-numbers/:phone_id`.
//!
//! Writes lock the contact row before checking the primary flag, so the
//! check and the write see the same set of primary phones.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::access::{self, ContactRef};
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::invariants;
use crate::models::PhoneView;
use crate::payloads::{CreatePhonePayload, UpdatePhonePayload, ValidJson};
use crate::phone_number::PhoneNumber;
use crate::queries;
use crate::store;
use crate::AppState;

fn parse_number(raw: &str, default_country_code: u16) -> ApiResult<PhoneNumber> {
    PhoneNumber::parse(raw, default_country_code)
        .map_err(|e| ApiError::field("phone_number", e.to_string()))
}

pub async fn list_phones_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(contact): Path<String>,
) -> ApiResult<Json<Vec<PhoneView>>> {
    let contact: ContactRef = contact.parse()?;
    let mut conn = state.db_pool.acquire().await?;
    let owner = access::any_contact(&mut conn, &principal, contact).await?;
    Ok(Json(queries::list_phones(&mut conn, owner.id).await?))
}

pub async fn get_phone_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((contact, phone_id)): Path<(String, i64)>,
) -> ApiResult<Json<PhoneView>> {
    let contact: ContactRef = contact.parse()?;
    let mut conn = state.db_pool.acquire().await?;
    let owner = access::any_contact(&mut conn, &principal, contact).await?;
    queries::get_phone(&mut conn, owner.id, phone_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn create_phone_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(contact): Path<String>,
    ValidJson(payload): ValidJson<CreatePhonePayload>,
) -> ApiResult<(StatusCode, Json<PhoneView>)> {
    let contact: ContactRef = contact.parse()?;
    let number = parse_number(&payload.phone_number, state.config.default_country_code)?;

    let mut tx = state.db_pool.begin().await?;
    let owner = access::owned_contact(&mut tx, &principal, contact).await?;
    if !invariants::lock_contact(&mut tx, owner.id).await? {
        return Err(ApiError::NotFound);
    }
    invariants::ensure_single_primary(&mut tx, owner.id, payload.is_primary, None).await?;

    let phone_id = store::find_or_create_phone(&mut tx, &number, payload.phone_type).await?;
    store::link_phone(&mut tx, owner.id, phone_id, payload.is_primary).await?;
    let view = queries::get_phone(&mut tx, owner.id, phone_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(
        contact_id = owner.id,
        phone_id,
        is_primary = payload.is_primary,
        "phone number added"
    );
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_phone_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((contact, phone_id)): Path<(String, i64)>,
    ValidJson(payload): ValidJson<UpdatePhonePayload>,
) -> ApiResult<Json<PhoneView>> {
    let contact: ContactRef = contact.parse()?;
    let new_number = payload
        .phone_number
        .as_deref()
        .map(|raw| parse_number(raw, state.config.default_country_code))
        .transpose()?;

    let mut tx = state.db_pool.begin().await?;
    let owner = access::owned_contact(&mut tx, &principal, contact).await?;
    if !invariants::lock_contact(&mut tx, owner.id).await? {
        return Err(ApiError::NotFound);
    }
    let current = queries::get_phone(&mut tx, owner.id, phone_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let is_primary = payload.is_primary.unwrap_or(current.is_primary);
    invariants::ensure_single_primary(&mut tx, owner.id, is_primary, Some(phone_id)).await?;

    let number = new_number.unwrap_or_else(|| current.phone_number.clone());
    let phone_type = payload.phone_type.unwrap_or(current.phone_type);
    let same_phone = number.value == current.phone_number.value
        && number.country_code == current.phone_number.country_code
        && phone_type == current.phone_type;

    let target_id = if same_phone {
        phone_id
    } else {
        store::find_or_create_phone(&mut tx, &number, phone_type).await?
    };
    store::relink_phone(&mut tx, owner.id, phone_id, target_id, is_primary).await?;
    if target_id != phone_id {
        store::delete_orphan_phone(&mut tx, phone_id).await?;
    }

    let view = queries::get_phone(&mut tx, owner.id, target_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(contact_id = owner.id, phone_id = target_id, is_primary, "phone number updated");
    Ok(Json(view))
}

pub async fn delete_phone_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((contact, phone_id)): Path<(String, i64)>,
) -> ApiResult<StatusCode> {
    let contact: ContactRef = contact.parse()?;

    let mut tx = state.db_pool.begin().await?;
    let owner = access::owned_contact(&mut tx, &principal, contact).await?;
    if !store::unlink_phone(&mut tx, owner.id, phone_id).await? {
        return Err(ApiError::NotFound);
    }
    store::delete_orphan_phone(&mut tx, phone_id).await?;
    tx.commit().await?;

    tracing::info!(contact_id = owner.id, phone_id, "phone number removed");
    Ok(StatusCode::NO_CONTENT)
}
