use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::db::row_parsers::role_from_row;
use crate::errors::{AppError, AppResult};
use crate::models::role::Role;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleListQuery {
    /// Case-insensitive substring of the role name
    pub search: Option<String>,
    pub status: Option<String>,
}

pub async fn list_roles(pool: &SqlitePool, query: &RoleListQuery) -> AppResult<Vec<Role>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM roles WHERE 1 = 1");
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        builder.push(" AND instr(lower(name), lower(").push_bind(search.trim().to_string()).push(")) > 0");
    }
    if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        builder.push(" AND status = ").push_bind(status.trim().to_ascii_lowercase());
    }
    builder.push(" ORDER BY role_id");

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(role_from_row).collect()
}

pub async fn get_role(pool: &SqlitePool, role_id: i64) -> AppResult<Role> {
    let row = sqlx::query("SELECT * FROM roles WHERE role_id = ?")
        .bind(role_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Role {} not found", role_id)))?;

    role_from_row(&row)
}

pub async fn role_exists(conn: &mut SqliteConnection, role_id: i64) -> AppResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT role_id FROM roles WHERE role_id = ?")
        .bind(role_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Roles linked to a group in link order. Links to roles that no longer exist are skipped.
pub async fn linked_roles(conn: &mut SqliteConnection, group_ref: Uuid) -> AppResult<Vec<Role>> {
    let rows = sqlx::query(
        r#"
        SELECT r.* FROM group_roles gr
        JOIN roles r ON r.role_id = gr.role_id
        WHERE gr.group_ref = ?
        ORDER BY gr.position
        "#,
    )
    .bind(group_ref.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(role_from_row).collect()
}
