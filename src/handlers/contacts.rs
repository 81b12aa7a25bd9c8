//! `/contacts` and `/contacts/:id`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::access;
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::models::ContactView;
use crate::payloads::{
    ContactQuery, CreateContactPayload, UpdateContactPayload, ValidJson, Validate,
};
use crate::queries::{self, ContactFilter};
use crate::store;
use crate::AppState;

pub async fn list_contacts_handler(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ContactQuery>,
) -> ApiResult<Json<Vec<ContactView>>> {
    params.validate()?;
    let mut conn = state.db_pool.acquire().await?;

    let in_common_groups_with = if params.in_common_groups {
        Some(access::requester_contact(&mut conn, &principal).await?.id)
    } else {
        None
    };
    let filter = ContactFilter {
        phone_number: params.phone_number,
        in_common_groups_with,
        limit: params.limit,
        offset: params.offset,
    };

    Ok(Json(queries::list_contacts(&mut conn, &filter).await?))
}

pub async fn create_contact_handler(
    State(state): State<AppState>,
    principal: Principal,
    ValidJson(payload): ValidJson<CreateContactPayload>,
) -> ApiResult<(StatusCode, Json<ContactView>)> {
    access::require_staff(&principal)?;

    let mut tx = state.db_pool.begin().await?;
    if !store::account_exists(&mut tx, payload.account).await? {
        return Err(store::unknown_pk("account", payload.account));
    }
    let id = store::insert_contact(&mut tx, payload.account, &payload.profile).await?;
    let view = queries::get_contact(&mut tx, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(contact_id = id, account_id = payload.account, "contact created");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_contact_handler(
    State(state): State<AppState>,
    _principal: Principal,
    Path(contact_id): Path<i64>,
) -> ApiResult<Json<ContactView>> {
    let mut conn = state.db_pool.acquire().await?;
    queries::get_contact(&mut conn, contact_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn update_contact_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(contact_id): Path<i64>,
    ValidJson(payload): ValidJson<UpdateContactPayload>,
) -> ApiResult<Json<ContactView>> {
    access::require_staff(&principal)?;

    let mut tx = state.db_pool.begin().await?;
    let current = queries::find_contact_row(&mut tx, contact_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    payload.check_account_unchanged(current.account_id)?;

    store::update_contact(&mut tx, contact_id, &payload.profile).await?;
    let view = queries::get_contact(&mut tx, contact_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(contact_id, "contact updated");
    Ok(Json(view))
}

pub async fn delete_contact_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(contact_id): Path<i64>,
) -> ApiResult<StatusCode> {
    access::require_staff(&principal)?;

    let mut conn = state.db_pool.acquire().await?;
    if !store::delete_contact(&mut conn, contact_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(contact_id, "contact deleted");
    Ok(StatusCode::NO_CONTENT)
}
