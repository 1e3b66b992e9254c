use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::{Json, Path, Query};
use crate::jwt::AuthUser;
use crate::models::user::{User, UserDetail, UserListQuery, UserListResponse, UserRecord, UserUpdateRequest};
use crate::services::import::{self, ImportSummary};
use crate::services::users;

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(UserListQuery),
    responses((status = 200, description = "Paginated users sorted by name", body = UserListResponse))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> AppResult<Json<UserListResponse>> {
    Ok(Json(users::list_users(&state.pool, &query).await?))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = UserRecord,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "userId already exists")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<UserRecord>,
) -> AppResult<(StatusCode, Json<User>)> {
    let new_user = payload.validate("").map_err(AppError::Validation)?;
    let user = users::create_user(&state.pool, new_user).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.subject.as_str()),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/users/{userId}",
    tag = "Users",
    params(("userId" = String, Path, description = "External user id")),
    responses(
        (status = 200, description = "User with the groups listing them", body = UserDetail),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> AppResult<Json<UserDetail>> {
    Ok(Json(users::get_user_detail(&state.pool, &user_id).await?))
}

#[utoipa::path(
    put,
    path = "/api/users/{userId}",
    tag = "Users",
    params(("userId" = String, Path, description = "External user id")),
    request_body = UserUpdateRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let (old, user) = users::update_user(&state.pool, &user_id, &payload).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.subject.as_str()),
        &user,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/api/users/{userId}",
    tag = "Users",
    params(("userId" = String, Path, description = "External user id")),
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<StatusCode> {
    let user = users::delete_user(&state.pool, &user_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.subject.as_str()),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/users/import",
    tag = "Users",
    request_body(content = String, description = "JSON document with a `users` array", content_type = "application/json"),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "User population replaced", body = ImportSummary),
        (status = 400, description = "Unparseable payload or invalid records; nothing was changed")
    )
)]
pub async fn import_users(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let records = import::decode_user_payload(&body)?;
    let summary = import::replace_users(&state.pool, records).await?;

    log_activity_with_context(
        &state.event_bus,
        "users_replaced",
        Some(auth.subject.as_str()),
        &summary,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(summary))
}
