//! `/contacts/:contact/contact-list` and `/contacts/:contact/contact-list/:contact_id`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::access::{self, ContactRef};
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::models::ListedContactView;
use crate::payloads::{AddContactPayload, StarPayload, ValidJson};
use crate::queries;
use crate::store;
use crate::AppState;

pub async fn list_contact_list_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(owner): Path<String>,
) -> ApiResult<Json<Vec<ListedContactView>>> {
    let owner: ContactRef = owner.parse()?;
    let mut conn = state.db_pool.acquire().await?;
    let owner = access::owned_contact(&mut conn, &principal, owner).await?;
    Ok(Json(queries::list_contact_list(&mut conn, owner.id).await?))
}

pub async fn add_to_contact_list_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(owner): Path<String>,
    ValidJson(payload): ValidJson<AddContactPayload>,
) -> ApiResult<(StatusCode, Json<ListedContactView>)> {
    let owner: ContactRef = owner.parse()?;

    let mut tx = state.db_pool.begin().await?;
    let owner = access::owned_contact(&mut tx, &principal, owner).await?;
    if payload.contact == owner.id {
        return Err(store::self_listing());
    }
    if !store::contact_exists(&mut tx, payload.contact).await? {
        return Err(store::unknown_pk("contact", payload.contact));
    }
    if store::membership_exists(&mut tx, owner.id, payload.contact).await? {
        return Err(store::already_listed(payload.contact));
    }
    store::insert_membership(&mut tx, owner.id, payload.contact, payload.starred).await?;
    let view = queries::get_contact_list_entry(&mut tx, owner.id, payload.contact)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(
        owner_id = owner.id,
        contact_id = payload.contact,
        starred = payload.starred,
        "contact added to contact list"
    );
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_contact_list_entry_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((owner, contact_id)): Path<(String, i64)>,
) -> ApiResult<Json<ListedContactView>> {
    let owner: ContactRef = owner.parse()?;
    let mut conn = state.db_pool.acquire().await?;
    let owner = access::owned_contact(&mut conn, &principal, owner).await?;
    queries::get_contact_list_entry(&mut conn, owner.id, contact_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn star_contact_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((owner, contact_id)): Path<(String, i64)>,
    ValidJson(payload): ValidJson<StarPayload>,
) -> ApiResult<Json<ListedContactView>> {
    let owner: ContactRef = owner.parse()?;

    let mut tx = state.db_pool.begin().await?;
    let owner = access::owned_contact(&mut tx, &principal, owner).await?;
    if !store::set_starred(&mut tx, owner.id, contact_id, payload.starred).await? {
        return Err(ApiError::NotFound);
    }
    let view = queries::get_contact_list_entry(&mut tx, owner.id, contact_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    Ok(Json(view))
}

pub async fn remove_from_contact_list_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((owner, contact_id)): Path<(String, i64)>,
) -> ApiResult<StatusCode> {
    let owner: ContactRef = owner.parse()?;
    let mut conn = state.db_pool.acquire().await?;
    let owner = access::owned_contact(&mut conn, &principal, owner).await?;
    if !store::delete_membership(&mut conn, owner.id, contact_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(owner_id = owner.id, contact_id, "contact removed from contact list");
    Ok(StatusCode::NO_CONTENT)
}
