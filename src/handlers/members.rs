//! `/groups/:group_id/contacts` and `/groups/:group_id/contacts/:contact_id`.
//!
//! Role changes and removals lock the group's membership rows first, so two
//! admins stepping down at once cannot both pass the last-admin check.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::access;
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::models::MemberView;
use crate::payloads::{AddMemberPayload, UpdateMemberPayload, ValidJson};
use crate::queries;
use crate::store::{self, NewContactGroup};
use crate::AppState;

pub async fn list_members_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<Vec<MemberView>>> {
    let mut conn = state.db_pool.acquire().await?;
    let requester = access::requester_contact(&mut conn, &principal).await?;
    let (_, group_access) = access::accessible_group(&mut conn, &requester, group_id).await?;
    group_access.require_member()?;

    Ok(Json(queries::list_group_members(&mut conn, group_id).await?))
}

pub async fn add_member_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(group_id): Path<i64>,
    ValidJson(payload): ValidJson<AddMemberPayload>,
) -> ApiResult<(StatusCode, Json<MemberView>)> {
    let mut tx = state.db_pool.begin().await?;
    let requester = access::requester_contact(&mut tx, &principal).await?;
    let (_, group_access) = access::accessible_group(&mut tx, &requester, group_id).await?;
    group_access.require_admin()?;

    if !store::contact_exists(&mut tx, payload.contact).await? {
        return Err(store::unknown_pk("contact", payload.contact));
    }
    if access::is_group_member(&mut tx, group_id, payload.contact).await? {
        return Err(store::already_member(payload.contact));
    }
    store::insert_contact_group(
        &mut tx,
        NewContactGroup::invited(group_id, payload.contact, payload.role, requester.id),
    )
    .await?;
    let view = queries::get_group_member(&mut tx, group_id, payload.contact)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(
        group_id,
        contact_id = payload.contact,
        role = %payload.role,
        invited_by = requester.id,
        "member added"
    );
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_member_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((group_id, contact_id)): Path<(i64, i64)>,
) -> ApiResult<Json<MemberView>> {
    let mut conn = state.db_pool.acquire().await?;
    let requester = access::requester_contact(&mut conn, &principal).await?;
    let (_, group_access) = access::accessible_group(&mut conn, &requester, group_id).await?;
    group_access.require_member()?;

    queries::get_group_member(&mut conn, group_id, contact_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn update_member_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((group_id, contact_id)): Path<(i64, i64)>,
    ValidJson(payload): ValidJson<UpdateMemberPayload>,
) -> ApiResult<Json<MemberView>> {
    let mut tx = state.db_pool.begin().await?;
    let requester = access::requester_contact(&mut tx, &principal).await?;
    let (_, group_access) = access::accessible_group(&mut tx, &requester, group_id).await?;
    group_access.require_admin()?;

    store::lock_group_members(&mut tx, group_id).await?;
    let current = access::membership_role(&mut tx, group_id, contact_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let admins = access::count_admins(&mut tx, group_id).await?;
    access::check_keeps_an_admin(current, Some(payload.role), admins)?;

    store::update_member_role(&mut tx, group_id, contact_id, payload.role).await?;
    let view = queries::get_group_member(&mut tx, group_id, contact_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(group_id, contact_id, role = %payload.role, "member role changed");
    Ok(Json(view))
}

/// Admins may remove anyone; any member may remove itself.
pub async fn remove_member_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path((group_id, contact_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db_pool.begin().await?;
    let requester = access::requester_contact(&mut tx, &principal).await?;
    let (_, group_access) = access::accessible_group(&mut tx, &requester, group_id).await?;
    if contact_id == requester.id {
        group_access.require_member()?;
    } else {
        group_access.require_admin()?;
    }

    store::lock_group_members(&mut tx, group_id).await?;
    let current = access::membership_role(&mut tx, group_id, contact_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let admins = access::count_admins(&mut tx, group_id).await?;
    access::check_keeps_an_admin(current, None, admins)?;

    store::delete_member(&mut tx, group_id, contact_id).await?;
    tx.commit().await?;

    tracing::info!(group_id, contact_id, removed_by = requester.id, "member removed");
    Ok(StatusCode::NO_CONTENT)
}
