use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, Type};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::group::{GroupStatus, GroupType, PermissionGroup};
use crate::models::role::Role;
use crate::models::user::{User, UserStatus};

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 (what we write)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, AppError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

fn uuid_column(row: &SqliteRow, name: &str) -> Result<Uuid, AppError> {
    let raw: String = column(row, name)?;
    Uuid::parse_str(&raw).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", name, e)))
}

fn datetime_column(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, AppError> {
    let raw: String = column(row, name)?;
    parse_datetime(&raw)
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, name: &str) -> Result<T, AppError> {
    let raw: String = column(row, name)?;
    serde_json::from_str(&raw).map_err(|e| AppError::internal(format!("invalid json in {}: {}", name, e)))
}

pub fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    let status: String = column(row, "status")?;
    let status = UserStatus::parse(&status)
        .ok_or_else(|| AppError::internal(format!("invalid user status: {}", status)))?;

    Ok(User {
        id: uuid_column(row, "id")?,
        user_id: column(row, "user_id")?,
        name: column(row, "name")?,
        email: column(row, "email")?,
        department: column(row, "department")?,
        job_title: column(row, "job_title")?,
        location: column(row, "location")?,
        country: column(row, "country")?,
        gender: column(row, "gender")?,
        division: column(row, "division")?,
        user_type: column(row, "user_type")?,
        status,
        created_at: datetime_column(row, "created_at")?,
        updated_at: datetime_column(row, "updated_at")?,
    })
}

pub fn role_from_row(row: &SqliteRow) -> Result<Role, AppError> {
    let rbp_only: i64 = column(row, "rbp_only")?;

    Ok(Role {
        role_id: column(row, "role_id")?,
        name: column(row, "name")?,
        description: column(row, "description")?,
        user_type: column(row, "user_type")?,
        status: column(row, "status")?,
        rbp_only: rbp_only != 0,
        actions: json_column(row, "actions")?,
        permissions: json_column(row, "permissions")?,
        last_modified: datetime_column(row, "last_modified")?,
        created_at: datetime_column(row, "created_at")?,
    })
}

/// Parses a `permission_groups` row. `members` and `related_permission_roles`
/// live in their own tables and are left empty for the caller to fill.
pub fn group_from_row(row: &SqliteRow) -> Result<PermissionGroup, AppError> {
    let group_type: String = column(row, "group_type")?;
    let group_type = GroupType::parse(&group_type)
        .ok_or_else(|| AppError::internal(format!("invalid group type: {}", group_type)))?;
    let status: String = column(row, "status")?;
    let status = GroupStatus::parse(&status)
        .ok_or_else(|| AppError::internal(format!("invalid group status: {}", status)))?;
    let is_rbp_only: i64 = column(row, "is_rbp_only")?;

    Ok(PermissionGroup {
        id: uuid_column(row, "id")?,
        group_id: column(row, "group_id")?,
        group_name: column(row, "group_name")?,
        user_type: column(row, "user_type")?,
        group_type,
        is_rbp_only: is_rbp_only != 0,
        status,
        include_criteria: json_column(row, "include_criteria")?,
        exclude_criteria: json_column(row, "exclude_criteria")?,
        members: Vec::new(),
        active_membership_count: column(row, "active_membership_count")?,
        related_permission_roles: Vec::new(),
        last_modified: datetime_column(row, "last_modified")?,
        created_at: datetime_column(row, "created_at")?,
    })
}
