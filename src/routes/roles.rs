use axum::extract::State;
use axum::http::HeaderMap;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::{Json, Path, Query};
use crate::jwt::AuthUser;
use crate::models::role::Role;
use crate::services::import::{self, ImportSummary};
use crate::services::roles::{self, RoleListQuery};

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "Roles",
    params(RoleListQuery),
    responses((status = 200, description = "Roles ordered by role_id", body = [Role]))
)]
pub async fn list_roles(State(state): State<AppState>, Query(query): Query<RoleListQuery>) -> AppResult<Json<Vec<Role>>> {
    Ok(Json(roles::list_roles(&state.pool, &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/roles/{roleId}",
    tag = "Roles",
    params(("roleId" = i64, Path, description = "role_id")),
    responses(
        (status = 200, description = "Role detail", body = Role),
        (status = 404, description = "Role not found")
    )
)]
pub async fn get_role(State(state): State<AppState>, Path(role_id): Path<i64>) -> AppResult<Json<Role>> {
    Ok(Json(roles::get_role(&state.pool, role_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/roles/import",
    tag = "Roles",
    request_body(
        content = String,
        description = "JSON document with a `roles` array, or the same document wrapped as `handler('<id>','<id>', {...});`",
        content_type = "text/plain"
    ),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Role population replaced", body = ImportSummary),
        (status = 400, description = "Unparseable payload or invalid records; existing roles kept")
    )
)]
pub async fn import_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let records = import::decode_role_payload(&body)?;
    let summary = import::replace_roles(&state.pool, records).await?;

    log_activity_with_context(
        &state.event_bus,
        "roles_replaced",
        Some(auth.subject.as_str()),
        &summary,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(summary))
}
