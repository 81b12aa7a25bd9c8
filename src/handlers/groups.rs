//! `/groups` and `/groups/:group_id`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::access;
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::models::GroupView;
use crate::payloads::{CreateGroupPayload, UpdateGroupPayload, ValidJson};
use crate::store;
use crate::AppState;

pub async fn list_groups_handler(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Json<Vec<GroupView>>> {
    let mut conn = state.db_pool.acquire().await?;
    let requester = access::requester_contact(&mut conn, &principal).await?;
    Ok(Json(access::accessible_for(&mut conn, requester.id).await?))
}

/// Creates the group and registers the creator as its first admin. Both rows
/// commit together or not at all.
pub async fn create_group_handler(
    State(state): State<AppState>,
    principal: Principal,
    ValidJson(payload): ValidJson<CreateGroupPayload>,
) -> ApiResult<(StatusCode, Json<GroupView>)> {
    let mut tx = state.db_pool.begin().await?;
    let requester = access::requester_contact(&mut tx, &principal).await?;

    let group = store::create_group(&mut tx, requester.id, &payload.name, &payload.description).await?;
    tx.commit().await?;

    tracing::info!(group_id = group.id, created_by = requester.id, "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<GroupView>> {
    let mut conn = state.db_pool.acquire().await?;
    let requester = access::requester_contact(&mut conn, &principal).await?;
    let (group, _) = access::accessible_group(&mut conn, &requester, group_id).await?;
    Ok(Json(group))
}

pub async fn update_group_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(group_id): Path<i64>,
    ValidJson(payload): ValidJson<UpdateGroupPayload>,
) -> ApiResult<Json<GroupView>> {
    let mut tx = state.db_pool.begin().await?;
    let requester = access::requester_contact(&mut tx, &principal).await?;
    let (_, group_access) = access::accessible_group(&mut tx, &requester, group_id).await?;
    group_access.require_admin()?;

    let group = store::update_group(
        &mut tx,
        group_id,
        payload.name.as_deref(),
        payload.description.as_deref(),
        requester.id,
    )
    .await?
    .ok_or(ApiError::NotFound)?;
    tx.commit().await?;

    tracing::info!(group_id, updated_by = requester.id, "group updated");
    Ok(Json(group))
}

pub async fn delete_group_handler(
    State(state): State<AppState>,
    principal: Principal,
    Path(group_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db_pool.begin().await?;
    let requester = access::requester_contact(&mut tx, &principal).await?;
    let (_, group_access) = access::accessible_group(&mut tx, &requester, group_id).await?;
    group_access.require_admin()?;

    if !store::delete_group(&mut tx, group_id).await? {
        return Err(ApiError::NotFound);
    }
    tx.commit().await?;

    tracing::info!(group_id, deleted_by = requester.id, "group deleted");
    Ok(StatusCode::NO_CONTENT)
}
