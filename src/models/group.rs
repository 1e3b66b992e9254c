use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::events::{Loggable, Severity};
use crate::models::criteria::{validate_criteria, Criterion, CriterionInput};
use crate::models::role::RoleSummary;
use crate::models::Pagination;
use crate::utils::non_blank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum GroupType {
    Static,
    #[default]
    Dynamic,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Static => "Static",
            GroupType::Dynamic => "Dynamic",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Static" => Some(GroupType::Static),
            "Dynamic" => Some(GroupType::Dynamic),
            _ => None,
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    #[default]
    Active,
    Inactive,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Active => "active",
            GroupStatus::Inactive => "inactive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "active" => Some(GroupStatus::Active),
            "inactive" => Some(GroupStatus::Inactive),
            _ => None,
        }
    }
}

/// A permission group with its criteria, materialized members and linked roles.
///
/// For `Dynamic` groups `members` is derived by the resolution engine; for
/// `Static` groups it is the curated list. `active_membership_count` always
/// equals `members.len()` after a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGroup {
    /// Internal storage identity
    pub id: Uuid,
    /// Numeric business key
    #[schema(example = 7)]
    pub group_id: i64,
    #[schema(example = "Engineering NY")]
    pub group_name: String,
    #[schema(example = "Employee")]
    pub user_type: String,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub is_rbp_only: bool,
    pub status: GroupStatus,
    pub include_criteria: Vec<Criterion>,
    pub exclude_criteria: Vec<Criterion>,
    /// External `userId`s of the members
    pub members: Vec<String>,
    pub active_membership_count: i64,
    /// `role_id`s of the linked roles
    pub related_permission_roles: Vec<i64>,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Loggable for PermissionGroup {
    fn entity_type() -> &'static str { "permission_group" }
    fn subject_id(&self) -> String { self.id.to_string() }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupCreateRequest {
    #[schema(example = "Engineering NY")]
    pub group_name: Option<String>,
    #[schema(example = "Employee")]
    pub user_type: Option<String>,
    /// `Static` or `Dynamic` (default)
    #[serde(rename = "type")]
    #[schema(example = "Dynamic")]
    pub group_type: Option<String>,
    pub is_rbp_only: Option<bool>,
    pub include_criteria: Option<Vec<CriterionInput>>,
    pub exclude_criteria: Option<Vec<CriterionInput>>,
}

/// Validated creation payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub group_name: String,
    pub user_type: String,
    pub group_type: GroupType,
    pub is_rbp_only: bool,
    pub include_criteria: Vec<Criterion>,
    pub exclude_criteria: Vec<Criterion>,
}

impl GroupCreateRequest {
    pub fn validate(&self) -> AppResult<NewGroup> {
        let mut errors = Vec::new();

        let group_name = non_blank(self.group_name.as_deref());
        if group_name.is_none() {
            errors.push("Group name is required".to_string());
        }

        let user_type = non_blank(self.user_type.as_deref());
        if user_type.is_none() {
            errors.push("User type is required".to_string());
        }

        let group_type = match self.group_type.as_deref() {
            None => GroupType::default(),
            Some(raw) => GroupType::parse(raw).unwrap_or_else(|| {
                errors.push("Type must be either Static or Dynamic".to_string());
                GroupType::default()
            }),
        };

        let include_criteria = validate_criteria(
            "includeCriteria",
            self.include_criteria.as_deref().unwrap_or_default(),
            &mut errors,
        );
        let exclude_criteria = validate_criteria(
            "excludeCriteria",
            self.exclude_criteria.as_deref().unwrap_or_default(),
            &mut errors,
        );

        match (group_name, user_type) {
            (Some(group_name), Some(user_type)) if errors.is_empty() => Ok(NewGroup {
                group_name,
                user_type,
                group_type,
                is_rbp_only: self.is_rbp_only.unwrap_or(false),
                include_criteria,
                exclude_criteria,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdateRequest {
    pub group_name: Option<String>,
    pub user_type: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<String>,
    pub is_rbp_only: Option<bool>,
    pub status: Option<String>,
    pub include_criteria: Option<Vec<CriterionInput>>,
    pub exclude_criteria: Option<Vec<CriterionInput>>,
    /// Curated member `userId`s; only accepted for Static groups
    pub members: Option<Vec<String>>,
}

/// Validated update payload; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupPatch {
    pub group_name: Option<String>,
    pub user_type: Option<String>,
    pub group_type: Option<GroupType>,
    pub is_rbp_only: Option<bool>,
    pub status: Option<GroupStatus>,
    pub include_criteria: Option<Vec<Criterion>>,
    pub exclude_criteria: Option<Vec<Criterion>>,
    pub members: Option<Vec<String>>,
}

impl GroupUpdateRequest {
    pub fn validate(&self) -> AppResult<GroupPatch> {
        let mut errors = Vec::new();

        let group_name = self.group_name.as_deref().and_then(|raw| {
            let value = non_blank(Some(raw));
            if value.is_none() {
                errors.push("Group name must not be blank".to_string());
            }
            value
        });

        let user_type = self.user_type.as_deref().and_then(|raw| {
            let value = non_blank(Some(raw));
            if value.is_none() {
                errors.push("User type must not be blank".to_string());
            }
            value
        });

        let group_type = self.group_type.as_deref().and_then(|raw| {
            let value = GroupType::parse(raw);
            if value.is_none() {
                errors.push("Type must be either Static or Dynamic".to_string());
            }
            value
        });

        let status = self.status.as_deref().and_then(|raw| {
            let value = GroupStatus::parse(raw);
            if value.is_none() {
                errors.push("Status must be either active or inactive".to_string());
            }
            value
        });

        let include_criteria = self
            .include_criteria
            .as_deref()
            .map(|inputs| validate_criteria("includeCriteria", inputs, &mut errors));
        let exclude_criteria = self
            .exclude_criteria
            .as_deref()
            .map(|inputs| validate_criteria("excludeCriteria", inputs, &mut errors));

        let members = self.members.as_ref().map(|ids| dedup_members(ids, &mut errors));

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(GroupPatch {
            group_name,
            user_type,
            group_type,
            is_rbp_only: self.is_rbp_only,
            status,
            include_criteria,
            exclude_criteria,
            members,
        })
    }
}

impl GroupPatch {
    /// Whether the patch touches a field that feeds membership resolution.
    pub fn touches_resolution_inputs(&self) -> bool {
        self.group_type.is_some() || self.include_criteria.is_some() || self.exclude_criteria.is_some()
    }
}

/// Trims ids, keeps the first occurrence of each, rejects blanks.
fn dedup_members(ids: &[String], errors: &mut Vec<String>) -> Vec<String> {
    let mut members: Vec<String> = Vec::with_capacity(ids.len());
    for (index, raw) in ids.iter().enumerate() {
        let id = raw.trim();
        if id.is_empty() {
            errors.push(format!("members[{index}]: userId must not be blank"));
        } else if !members.iter().any(|m| m == id) {
            members.push(id.to_string());
        }
    }
    members
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkRoleRequest {
    #[schema(example = 42)]
    pub role_id: i64,
}

/// Member profile on the group detail view; stale member ids are omitted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: PermissionGroup,
    pub member_profiles: Vec<MemberSummary>,
    pub roles: Vec<RoleSummary>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct GroupListQuery {
    /// Case-insensitive substring of the group name
    pub search: Option<String>,
    pub user_type: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupListResponse {
    pub groups: Vec<PermissionGroup>,
    pub pagination: Pagination,
}

/// Activity-log entry for a role link or unlink.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRoleLink {
    pub group: Uuid,
    pub group_id: i64,
    pub role_id: i64,
}

impl Loggable for GroupRoleLink {
    fn entity_type() -> &'static str { "group_role" }
    fn subject_id(&self) -> String { self.group.to_string() }
    fn severity(&self) -> Severity { Severity::Critical }
}
