use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::begin_write;
use crate::db::row_parsers::{group_from_row, user_from_row};
use crate::errors::{AppError, AppResult};
use crate::membership::{load_population, materialize, replace_members, triggers_on_create, triggers_on_update};
use crate::models::group::{
    GroupDetail, GroupListQuery, GroupListResponse, GroupPatch, GroupType, MemberSummary, NewGroup, PermissionGroup,
};
use crate::models::role::{EffectivePermissions, RoleSummary};
use crate::models::PageRequest;
use crate::services::address::resolve_group;
use crate::services::roles::{linked_roles, role_exists};
use crate::utils::{to_db_timestamp, utc_now};

/// Loads a group with its member and role lists.
pub async fn fetch_group(conn: &mut SqliteConnection, id: Uuid) -> AppResult<PermissionGroup> {
    let row = sqlx::query("SELECT * FROM permission_groups WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Permission group '{}' not found", id)))?;

    let mut group = group_from_row(&row)?;
    load_links(conn, &mut group).await?;
    Ok(group)
}

async fn load_links(conn: &mut SqliteConnection, group: &mut PermissionGroup) -> AppResult<()> {
    let group_ref = group.id.to_string();

    group.members = sqlx::query_scalar("SELECT user_id FROM group_members WHERE group_ref = ? ORDER BY position")
        .bind(&group_ref)
        .fetch_all(&mut *conn)
        .await?;

    group.related_permission_roles =
        sqlx::query_scalar("SELECT role_id FROM group_roles WHERE group_ref = ? ORDER BY position")
            .bind(&group_ref)
            .fetch_all(&mut *conn)
            .await?;

    Ok(())
}

/// Issues the next `groupId`: one past the highest ever issued, so ids of
/// deleted groups are never handed out again.
async fn next_group_id(conn: &mut SqliteConnection) -> AppResult<i64> {
    let next: i64 = sqlx::query_scalar(
        r#"
        UPDATE id_sequences
        SET value = MAX(value, (SELECT COALESCE(MAX(group_id), 0) FROM permission_groups)) + 1
        WHERE name = 'permission_groups'
        RETURNING value
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    Ok(next)
}

async fn insert_group_row(conn: &mut SqliteConnection, group: &PermissionGroup) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO permission_groups (id, group_id, group_name, user_type, group_type, is_rbp_only, status,
            include_criteria, exclude_criteria, active_membership_count, last_modified, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(group.id.to_string())
    .bind(group.group_id)
    .bind(&group.group_name)
    .bind(&group.user_type)
    .bind(group.group_type.as_str())
    .bind(group.is_rbp_only)
    .bind(group.status.as_str())
    .bind(criteria_json(&group.include_criteria)?)
    .bind(criteria_json(&group.exclude_criteria)?)
    .bind(group.active_membership_count)
    .bind(to_db_timestamp(group.last_modified))
    .bind(to_db_timestamp(group.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn update_group_row(conn: &mut SqliteConnection, group: &PermissionGroup) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE permission_groups SET group_name = ?, user_type = ?, group_type = ?, is_rbp_only = ?, status = ?,
            include_criteria = ?, exclude_criteria = ?, active_membership_count = ?, last_modified = ?
        WHERE id = ?
        "#,
    )
    .bind(&group.group_name)
    .bind(&group.user_type)
    .bind(group.group_type.as_str())
    .bind(group.is_rbp_only)
    .bind(group.status.as_str())
    .bind(criteria_json(&group.include_criteria)?)
    .bind(criteria_json(&group.exclude_criteria)?)
    .bind(group.active_membership_count)
    .bind(to_db_timestamp(group.last_modified))
    .bind(group.id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn touch_group(conn: &mut SqliteConnection, id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE permission_groups SET last_modified = ? WHERE id = ?")
        .bind(to_db_timestamp(utc_now()))
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn criteria_json<T: serde::Serialize>(criteria: &T) -> AppResult<String> {
    serde_json::to_string(criteria).map_err(|e| AppError::internal(format!("failed to encode criteria: {}", e)))
}

/// Creates a group; a Dynamic group is resolved before it is first stored.
pub async fn create_group(pool: &SqlitePool, new: NewGroup) -> AppResult<PermissionGroup> {
    let mut tx = begin_write(pool).await?;

    let now = utc_now();
    let mut group = PermissionGroup {
        id: Uuid::new_v4(),
        group_id: next_group_id(&mut tx).await?,
        group_name: new.group_name,
        user_type: new.user_type,
        group_type: new.group_type,
        is_rbp_only: new.is_rbp_only,
        status: Default::default(),
        include_criteria: new.include_criteria,
        exclude_criteria: new.exclude_criteria,
        members: Vec::new(),
        active_membership_count: 0,
        related_permission_roles: Vec::new(),
        last_modified: now,
        created_at: now,
    };

    if triggers_on_create(group.group_type) {
        let population = load_population(&mut tx).await?;
        materialize(&mut group, &population);
    }

    insert_group_row(&mut tx, &group).await?;
    replace_members(&mut tx, group.id, &group.members).await?;
    tx.commit().await?;

    tracing::info!(group_id = group.group_id, group_type = %group.group_type, "permission group created");
    Ok(group)
}

/// Applies a patch; returns the previous and the updated group.
pub async fn update_group(pool: &SqlitePool, address: &str, patch: GroupPatch) -> AppResult<(PermissionGroup, PermissionGroup)> {
    let mut tx = begin_write(pool).await?;
    let id = resolve_group(&mut tx, address).await?;
    let old = fetch_group(&mut tx, id).await?;

    let resulting_type = patch.group_type.unwrap_or(old.group_type);
    let resolve = triggers_on_update(&patch, resulting_type);

    let mut group = old.clone();
    let GroupPatch {
        group_name,
        user_type,
        group_type,
        is_rbp_only,
        status,
        include_criteria,
        exclude_criteria,
        members,
    } = patch;

    if let Some(members) = members {
        if resulting_type != GroupType::Static {
            return Err(AppError::validation("members can only be set on Static groups"));
        }
        ensure_users_exist(&mut tx, &members).await?;
        group.active_membership_count = members.len() as i64;
        group.members = members;
    }

    if let Some(group_name) = group_name {
        group.group_name = group_name;
    }
    if let Some(user_type) = user_type {
        group.user_type = user_type;
    }
    if let Some(is_rbp_only) = is_rbp_only {
        group.is_rbp_only = is_rbp_only;
    }
    if let Some(status) = status {
        group.status = status;
    }
    if let Some(include_criteria) = include_criteria {
        group.include_criteria = include_criteria;
    }
    if let Some(exclude_criteria) = exclude_criteria {
        group.exclude_criteria = exclude_criteria;
    }
    group.group_type = group_type.unwrap_or(group.group_type);

    if resolve {
        let population = load_population(&mut tx).await?;
        materialize(&mut group, &population);
    }

    group.last_modified = utc_now();
    update_group_row(&mut tx, &group).await?;
    if group.members != old.members {
        replace_members(&mut tx, group.id, &group.members).await?;
    }
    tx.commit().await?;

    tracing::info!(
        group_id = group.group_id,
        resolved = resolve,
        members = group.active_membership_count,
        "permission group updated"
    );
    Ok((old, group))
}

async fn ensure_users_exist(conn: &mut SqliteConnection, members: &[String]) -> AppResult<()> {
    let mut errors = Vec::new();
    for (index, user_id) in members.iter().enumerate() {
        let found: Option<String> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_none() {
            errors.push(format!("members[{index}]: unknown user '{user_id}'"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub async fn delete_group(pool: &SqlitePool, address: &str) -> AppResult<PermissionGroup> {
    let mut tx = begin_write(pool).await?;
    let id = resolve_group(&mut tx, address).await?;
    let group = fetch_group(&mut tx, id).await?;

    sqlx::query("DELETE FROM permission_groups WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(group_id = group.group_id, "permission group deleted");
    Ok(group)
}

pub async fn get_group(pool: &SqlitePool, address: &str) -> AppResult<PermissionGroup> {
    let mut conn = pool.acquire().await?;
    let id = resolve_group(&mut conn, address).await?;
    fetch_group(&mut conn, id).await
}

/// The group with member profiles and role summaries. References to users or
/// roles that no longer exist are left out of the populated lists.
pub async fn get_group_detail(pool: &SqlitePool, address: &str) -> AppResult<GroupDetail> {
    let mut conn = pool.acquire().await?;
    let id = resolve_group(&mut conn, address).await?;
    let group = fetch_group(&mut conn, id).await?;

    let rows = sqlx::query(
        r#"
        SELECT u.* FROM group_members gm
        JOIN users u ON u.user_id = gm.user_id
        WHERE gm.group_ref = ?
        ORDER BY gm.position
        "#,
    )
    .bind(id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut member_profiles = Vec::with_capacity(rows.len());
    for row in &rows {
        let user = user_from_row(row)?;
        member_profiles.push(MemberSummary {
            user_id: user.user_id,
            name: user.name,
            email: user.email,
            department: user.department,
            job_title: user.job_title,
        });
    }

    let roles = linked_roles(&mut conn, id).await?;

    Ok(GroupDetail {
        group,
        member_profiles,
        roles: roles.iter().map(RoleSummary::from).collect(),
    })
}

fn push_group_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &GroupListQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(" AND instr(lower(group_name), ")
            .push_bind(search.to_lowercase())
            .push(") > 0");
    }
    if let Some(user_type) = query.user_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND user_type = ").push_bind(user_type.to_string());
    }
    if let Some(status) = query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder.push(" AND status = ").push_bind(status.to_string());
    }
}

/// Most recently modified first.
pub async fn list_groups(pool: &SqlitePool, query: &GroupListQuery) -> AppResult<GroupListResponse> {
    let page = PageRequest::new(query.page, query.limit);
    let mut conn = pool.acquire().await?;

    let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM permission_groups");
    push_group_filters(&mut count, query);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut select: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM permission_groups");
    push_group_filters(&mut select, query);
    select
        .push(" ORDER BY last_modified DESC, group_id DESC LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = select.build().fetch_all(&mut *conn).await?;

    let mut groups = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut group = group_from_row(row)?;
        load_links(&mut conn, &mut group).await?;
        groups.push(group);
    }

    Ok(GroupListResponse {
        groups,
        pagination: page.pagination(total),
    })
}

/// Links a role to a group. Linking an already linked role only refreshes `lastModified`.
pub async fn link_role(pool: &SqlitePool, address: &str, role_id: i64) -> AppResult<PermissionGroup> {
    let mut tx = begin_write(pool).await?;
    let id = resolve_group(&mut tx, address).await?;

    if !role_exists(&mut tx, role_id).await? {
        return Err(AppError::not_found(format!("Role {} not found", role_id)));
    }

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO group_roles (group_ref, role_id, position)
        VALUES (?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM group_roles WHERE group_ref = ?))
        "#,
    )
    .bind(id.to_string())
    .bind(role_id)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    touch_group(&mut tx, id).await?;
    let group = fetch_group(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(group_id = group.group_id, role_id, "role linked");
    Ok(group)
}

/// Removes a role link if present. The role itself need not exist.
pub async fn unlink_role(pool: &SqlitePool, address: &str, role_id: i64) -> AppResult<PermissionGroup> {
    let mut tx = begin_write(pool).await?;
    let id = resolve_group(&mut tx, address).await?;

    let removed = sqlx::query("DELETE FROM group_roles WHERE group_ref = ? AND role_id = ?")
        .bind(id.to_string())
        .bind(role_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    touch_group(&mut tx, id).await?;
    let group = fetch_group(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(group_id = group.group_id, role_id, removed, "role unlinked");
    Ok(group)
}

/// Union of the linked roles' actions and permission payloads, computed on every call.
pub async fn effective_permissions(pool: &SqlitePool, address: &str) -> AppResult<EffectivePermissions> {
    let mut conn = pool.acquire().await?;
    let id = resolve_group(&mut conn, address).await?;
    let group = fetch_group(&mut conn, id).await?;
    let roles = linked_roles(&mut conn, id).await?;

    Ok(EffectivePermissions::from_roles(group.group_id, &roles))
}
