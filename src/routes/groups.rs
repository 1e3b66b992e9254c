use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::{Json, Path, Query};
use crate::jwt::AuthUser;
use crate::models::group::{
    GroupCreateRequest, GroupDetail, GroupListQuery, GroupListResponse, GroupRoleLink, GroupUpdateRequest,
    LinkRoleRequest, PermissionGroup,
};
use crate::models::role::EffectivePermissions;
use crate::services::groups;

#[utoipa::path(
    get,
    path = "/api/permission-groups",
    tag = "Permission Groups",
    params(GroupListQuery),
    responses((status = 200, description = "Paginated permission groups", body = GroupListResponse))
)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<GroupListQuery>,
) -> AppResult<Json<GroupListResponse>> {
    Ok(Json(groups::list_groups(&state.pool, &query).await?))
}

#[utoipa::path(
    post,
    path = "/api/permission-groups",
    tag = "Permission Groups",
    request_body = GroupCreateRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Group created; Dynamic groups are resolved immediately", body = PermissionGroup),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<GroupCreateRequest>,
) -> AppResult<(StatusCode, Json<PermissionGroup>)> {
    let new_group = payload.validate()?;
    let group = groups::create_group(&state.pool, new_group).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.subject.as_str()),
        &group,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/api/permission-groups/{id}",
    tag = "Permission Groups",
    params(("id" = String, Path, description = "Numeric groupId or internal id")),
    responses(
        (status = 200, description = "Group with member profiles and roles", body = GroupDetail),
        (status = 404, description = "Group not found")
    )
)]
pub async fn get_group(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<GroupDetail>> {
    Ok(Json(groups::get_group_detail(&state.pool, &id).await?))
}

#[utoipa::path(
    put,
    path = "/api/permission-groups/{id}",
    tag = "Permission Groups",
    params(("id" = String, Path, description = "Numeric groupId or internal id")),
    request_body = GroupUpdateRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Group updated", body = PermissionGroup),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Group not found"),
        (status = 500, description = "Membership resolution failed; nothing was changed")
    )
)]
pub async fn update_group(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<GroupUpdateRequest>,
) -> AppResult<Json<PermissionGroup>> {
    let patch = payload.validate()?;
    let (old, group) = groups::update_group(&state.pool, &id, patch).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.subject.as_str()),
        &group,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(group))
}

#[utoipa::path(
    delete,
    path = "/api/permission-groups/{id}",
    tag = "Permission Groups",
    params(("id" = String, Path, description = "Numeric groupId or internal id")),
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn delete_group(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let group = groups::delete_group(&state.pool, &id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.subject.as_str()),
        &group,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/permission-groups/{id}/link-role",
    tag = "Permission Groups",
    params(("id" = String, Path, description = "Numeric groupId or internal id")),
    request_body = LinkRoleRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Role linked (no-op if already linked)", body = PermissionGroup),
        (status = 404, description = "Group or role not found")
    )
)]
pub async fn link_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<LinkRoleRequest>,
) -> AppResult<Json<PermissionGroup>> {
    let group = groups::link_role(&state.pool, &id, payload.role_id).await?;

    let link = GroupRoleLink {
        group: group.id,
        group_id: group.group_id,
        role_id: payload.role_id,
    };
    log_activity_with_context(
        &state.event_bus,
        "linked",
        Some(auth.subject.as_str()),
        &link,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(group))
}

#[utoipa::path(
    delete,
    path = "/api/permission-groups/{id}/unlink-role/{roleId}",
    tag = "Permission Groups",
    params(
        ("id" = String, Path, description = "Numeric groupId or internal id"),
        ("roleId" = i64, Path, description = "role_id to unlink")
    ),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Role unlinked (no-op if not linked)", body = PermissionGroup),
        (status = 404, description = "Group not found")
    )
)]
pub async fn unlink_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((id, role_id)): Path<(String, i64)>,
) -> AppResult<Json<PermissionGroup>> {
    let group = groups::unlink_role(&state.pool, &id, role_id).await?;

    let link = GroupRoleLink {
        group: group.id,
        group_id: group.group_id,
        role_id,
    };
    log_activity_with_context(
        &state.event_bus,
        "unlinked",
        Some(auth.subject.as_str()),
        &link,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(group))
}

#[utoipa::path(
    get,
    path = "/api/permission-groups/{id}/effective-permissions",
    tag = "Permission Groups",
    params(("id" = String, Path, description = "Numeric groupId or internal id")),
    responses(
        (status = 200, description = "Union of the linked roles' permissions", body = EffectivePermissions),
        (status = 404, description = "Group not found")
    )
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EffectivePermissions>> {
    Ok(Json(groups::effective_permissions(&state.pool, &id).await?))
}
