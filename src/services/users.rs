use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::begin_write;
use crate::db::row_parsers::{group_from_row, user_from_row};
use crate::errors::{AppError, AppResult};
use crate::models::role::RoleSummary;
use crate::models::user::{NewUser, User, UserDetail, UserGroupSummary, UserListQuery, UserListResponse, UserUpdateRequest};
use crate::models::PageRequest;
use crate::services::roles::linked_roles;
use crate::utils::{to_db_timestamp, utc_now};

fn push_user_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &UserListQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        builder
            .push(" AND (instr(lower(name), ")
            .push_bind(needle.clone())
            .push(") > 0 OR instr(lower(email), ")
            .push_bind(needle.clone())
            .push(") > 0 OR instr(lower(user_id), ")
            .push_bind(needle)
            .push(") > 0)");
    }
    if let Some(department) = query.department.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND department = ").push_bind(department.to_string());
    }
}

pub async fn list_users(pool: &SqlitePool, query: &UserListQuery) -> AppResult<UserListResponse> {
    let page = PageRequest::new(query.page, query.limit);

    let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut count, query);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM users");
    push_user_filters(&mut select, query);
    select
        .push(" ORDER BY name, user_id LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = select.build().fetch_all(pool).await?;
    let users = rows.iter().map(user_from_row).collect::<AppResult<Vec<_>>>()?;

    Ok(UserListResponse {
        users,
        pagination: page.pagination(total),
    })
}

pub async fn find_user(conn: &mut SqliteConnection, user_id: &str) -> AppResult<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

async fn require_user(conn: &mut SqliteConnection, user_id: &str) -> AppResult<User> {
    find_user(conn, user_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User '{}' not found", user_id)))
}

/// A user with the groups currently listing them as a member.
pub async fn get_user_detail(pool: &SqlitePool, user_id: &str) -> AppResult<UserDetail> {
    let mut conn = pool.acquire().await?;
    let user = require_user(&mut conn, user_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT pg.* FROM group_members gm
        JOIN permission_groups pg ON pg.id = gm.group_ref
        WHERE gm.user_id = ?
        ORDER BY pg.group_id
        "#,
    )
    .bind(&user.user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut groups = Vec::with_capacity(rows.len());
    for row in &rows {
        let group = group_from_row(row)?;
        let roles = linked_roles(&mut conn, group.id).await?;
        groups.push(UserGroupSummary {
            group_id: group.group_id,
            group_name: group.group_name,
            group_type: group.group_type.to_string(),
            related_permission_roles: roles.iter().map(RoleSummary::from).collect(),
        });
    }

    Ok(UserDetail { user, groups })
}

/// Inserts a user. `identity` keeps the internal id and creation time of a
/// user being re-imported.
pub async fn insert_user(
    conn: &mut SqliteConnection,
    user: &NewUser,
    identity: Option<(Uuid, DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let (id, created_at) = identity.unwrap_or_else(|| (Uuid::new_v4(), now));

    sqlx::query(
        r#"
        INSERT INTO users (id, user_id, name, email, department, job_title, location, country, gender, division, user_type, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&user.user_id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.department)
    .bind(&user.job_title)
    .bind(&user.location)
    .bind(&user.country)
    .bind(&user.gender)
    .bind(&user.division)
    .bind(&user.user_type)
    .bind(user.status.as_str())
    .bind(to_db_timestamp(created_at))
    .bind(to_db_timestamp(now))
    .execute(&mut *conn)
    .await?;

    Ok(User {
        id,
        user_id: user.user_id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        department: user.department.clone(),
        job_title: user.job_title.clone(),
        location: user.location.clone(),
        country: user.country.clone(),
        gender: user.gender.clone(),
        division: user.division.clone(),
        user_type: user.user_type.clone(),
        status: user.status,
        created_at,
        updated_at: now,
    })
}

pub async fn create_user(pool: &SqlitePool, user: NewUser) -> AppResult<User> {
    let mut tx = begin_write(pool).await?;

    if find_user(&mut tx, &user.user_id).await?.is_some() {
        return Err(AppError::conflict(format!("User '{}' already exists", user.user_id)));
    }

    let created = insert_user(&mut tx, &user, None, utc_now()).await?;
    tx.commit().await?;

    tracing::info!(user_id = %created.user_id, "user created");
    Ok(created)
}

/// Applies a patch; returns the previous and the updated record.
/// Group memberships are not re-resolved here.
pub async fn update_user(pool: &SqlitePool, user_id: &str, patch: &UserUpdateRequest) -> AppResult<(User, User)> {
    let mut tx = begin_write(pool).await?;
    let old = require_user(&mut tx, user_id).await?;

    let mut user = old.clone();
    patch.apply(&mut user).map_err(AppError::Validation)?;
    user.updated_at = utc_now();

    sqlx::query(
        r#"
        UPDATE users SET name = ?, email = ?, department = ?, job_title = ?, location = ?, country = ?,
            gender = ?, division = ?, user_type = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.department)
    .bind(&user.job_title)
    .bind(&user.location)
    .bind(&user.country)
    .bind(&user.gender)
    .bind(&user.division)
    .bind(&user.user_type)
    .bind(user.status.as_str())
    .bind(to_db_timestamp(user.updated_at))
    .bind(user.id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.user_id, "user updated");
    Ok((old, user))
}

/// Deletes a user. Group member lists keep the stale id until the next resolution.
pub async fn delete_user(pool: &SqlitePool, user_id: &str) -> AppResult<User> {
    let mut tx = begin_write(pool).await?;
    let user = require_user(&mut tx, user_id).await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user.id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.user_id, "user deleted");
    Ok(user)
}
