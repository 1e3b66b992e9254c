//! Sample directory for local development, loaded by `cli seed`.
//!
//! Goes through the regular import and group services so Dynamic groups are
//! resolved by the membership engine.

use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::db::begin_write;
use crate::errors::AppResult;
use crate::models::criteria::{AttributeCategory, Criterion};
use crate::models::group::{GroupPatch, GroupType, NewGroup, PermissionGroup};
use crate::models::role::NewRole;
use crate::models::user::{NewUser, UserStatus, DEFAULT_USER_TYPE};
use crate::services::{groups, import};

#[derive(Debug, Clone)]
pub struct SeedSummary {
    pub roles: usize,
    pub users: usize,
    pub groups: Vec<PermissionGroup>,
}

fn role(role_id: i64, name: &str, description: &str) -> NewRole {
    NewRole {
        role_id,
        name: name.to_string(),
        description: Some(description.to_string()),
        user_type: Some(DEFAULT_USER_TYPE.to_string()),
        status: "active".to_string(),
        rbp_only: false,
        last_modified: None,
        actions: Vec::new(),
        permissions: Value::Object(Default::default()),
    }
}

fn sample_roles() -> Vec<NewRole> {
    let mut hr_admin = role(1, "HR Administrator", "Full access to HR functions");
    hr_admin.actions = vec!["view".to_string(), "edit".to_string(), "approve".to_string()];
    hr_admin.permissions = json!({"userPermissions": ["hire", "terminate"]});

    let mut manager = role(2, "Manager", "Team management access");
    manager.actions = vec!["view".to_string(), "approve".to_string()];

    let mut self_service = role(3, "Employee Self-Service", "Basic employee access");
    self_service.actions = vec!["view".to_string()];

    vec![hr_admin, manager, self_service]
}

fn user(user_id: &str, name: &str, email: &str, department: &str, job_title: &str, location: &str, country: &str) -> NewUser {
    NewUser {
        user_id: user_id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        department: Some(department.to_string()),
        job_title: Some(job_title.to_string()),
        location: Some(location.to_string()),
        country: Some(country.to_string()),
        gender: None,
        division: None,
        user_type: DEFAULT_USER_TYPE.to_string(),
        status: UserStatus::Active,
    }
}

fn sample_users() -> Vec<NewUser> {
    vec![
        user("EMP001", "John Doe", "john.doe@company.com", "Engineering", "Software Engineer", "New York", "USA"),
        user("EMP002", "Jane Smith", "jane.smith@company.com", "HR", "HR Manager", "London", "UK"),
        user("EMP003", "Bob Johnson", "bob.johnson@company.com", "Engineering", "Senior Developer", "San Francisco", "USA"),
        user("demo-user", "Demo Employee", "demo@company.com", "Sales", "Sales Representative", "Berlin", "Germany"),
    ]
}

fn new_group(name: &str, group_type: GroupType, is_rbp_only: bool, include_criteria: Vec<Criterion>) -> NewGroup {
    NewGroup {
        group_name: name.to_string(),
        user_type: DEFAULT_USER_TYPE.to_string(),
        group_type,
        is_rbp_only,
        include_criteria,
        exclude_criteria: Vec::new(),
    }
}

async fn link_all(pool: &SqlitePool, group: &PermissionGroup, role_ids: &[i64]) -> AppResult<PermissionGroup> {
    let address = group.group_id.to_string();
    let mut linked = group.clone();
    for role_id in role_ids {
        linked = groups::link_role(pool, &address, *role_id).await?;
    }
    Ok(linked)
}

/// Drops every group and replaces users and roles with the sample directory.
pub async fn seed_sample_data(pool: &SqlitePool) -> AppResult<SeedSummary> {
    let mut tx = begin_write(pool).await?;
    sqlx::query("DELETE FROM permission_groups").execute(&mut *tx).await?;
    tx.commit().await?;

    let roles = import::replace_roles(pool, sample_roles()).await?;
    let users = import::replace_users(pool, sample_users()).await?;

    let engineering = groups::create_group(
        pool,
        new_group(
            "Engineering Team",
            GroupType::Dynamic,
            false,
            vec![Criterion::new(AttributeCategory::Department, "Engineering")],
        ),
    )
    .await?;
    let engineering = link_all(pool, &engineering, &[3]).await?;

    let hr = groups::create_group(
        pool,
        new_group(
            "HR Administrators",
            GroupType::Static,
            true,
            vec![Criterion::new(AttributeCategory::Department, "HR")],
        ),
    )
    .await?;
    let patch = GroupPatch {
        members: Some(vec!["EMP002".to_string()]),
        ..Default::default()
    };
    let (_, hr) = groups::update_group(pool, &hr.group_id.to_string(), patch).await?;
    let hr = link_all(pool, &hr, &[1, 2]).await?;

    let everyone = groups::create_group(pool, new_group("All Employees", GroupType::Dynamic, false, Vec::new())).await?;
    let everyone = link_all(pool, &everyone, &[3]).await?;

    tracing::info!(
        roles = roles.imported,
        users = users.imported,
        groups = 3,
        "sample data seeded"
    );

    Ok(SeedSummary {
        roles: roles.imported,
        users: users.imported,
        groups: vec![engineering, hr, everyone],
    })
}
