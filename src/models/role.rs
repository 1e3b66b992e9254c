use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::utils::non_blank;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(rename = "role_id")]
    #[schema(example = 42)]
    pub role_id: i64,
    #[schema(example = "HR Administrator")]
    pub name: String,
    pub description: Option<String>,
    pub user_type: Option<String>,
    #[schema(example = "active")]
    pub status: String,
    pub rbp_only: bool,
    pub actions: Vec<String>,
    /// Opaque permissions payload carried over from the source system
    #[schema(value_type = Object)]
    pub permissions: Value,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Compact role reference used in group and user views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RoleSummary {
    pub role_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Role> for RoleSummary {
    fn from(role: &Role) -> Self {
        RoleSummary {
            role_id: role.role_id,
            name: role.name.clone(),
            description: role.description.clone(),
        }
    }
}

/// One entry of a role import document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    #[serde(rename = "role_id", alias = "roleId")]
    pub role_id: Option<i64>,
    #[serde(alias = "role_name")]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "user_type")]
    pub user_type: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "rbp_only")]
    pub rbp_only: Option<bool>,
    #[serde(alias = "last_modified")]
    pub last_modified: Option<DateTime<Utc>>,
    pub actions: Option<Vec<String>>,
    #[schema(value_type = Object)]
    pub permissions: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRole {
    pub role_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub user_type: Option<String>,
    pub status: String,
    pub rbp_only: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub actions: Vec<String>,
    pub permissions: Value,
}

impl RoleRecord {
    pub fn validate(&self, label: &str) -> Result<NewRole, Vec<String>> {
        let mut errors = Vec::new();

        let role_id = match self.role_id {
            Some(id) if id >= 1 => Some(id),
            Some(_) => {
                errors.push(format!("{label}role_id must be a positive number"));
                None
            }
            None => {
                errors.push(format!("{label}role_id is required"));
                None
            }
        };

        let name = non_blank(self.name.as_deref());
        if name.is_none() {
            errors.push(format!("{label}role name is required"));
        }

        // The source system exports both upper- and lower-case statuses.
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => "active".to_string(),
            Some(raw) => {
                let lowered = raw.to_ascii_lowercase();
                if lowered != "active" && lowered != "inactive" {
                    errors.push(format!("{label}status must be either active or inactive"));
                }
                lowered
            }
        };

        match (role_id, name) {
            (Some(role_id), Some(name)) if errors.is_empty() => Ok(NewRole {
                role_id,
                name,
                description: non_blank(self.description.as_deref()),
                user_type: non_blank(self.user_type.as_deref()),
                status,
                rbp_only: self.rbp_only.unwrap_or(false),
                last_modified: self.last_modified,
                actions: self.actions.clone().unwrap_or_default(),
                permissions: self.permissions.clone().unwrap_or_else(|| Value::Object(Default::default())),
            }),
            _ => Err(errors),
        }
    }
}

/// Permissions a group grants through its linked roles, computed on read.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePermissions {
    pub group_id: i64,
    pub roles: Vec<RoleSummary>,
    /// Union of the linked roles' actions, sorted
    pub actions: Vec<String>,
    /// Distinct permission payloads of the linked roles, in link order
    #[schema(value_type = Vec<Object>)]
    pub permissions: Vec<Value>,
}

impl EffectivePermissions {
    pub fn from_roles(group_id: i64, roles: &[Role]) -> Self {
        let mut actions: Vec<String> = roles
            .iter()
            .flat_map(|role| role.actions.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        actions.sort();

        let mut permissions: Vec<Value> = Vec::new();
        for role in roles {
            let empty = role.permissions.is_null()
                || role.permissions.as_object().is_some_and(|o| o.is_empty());
            if !empty && !permissions.contains(&role.permissions) {
                permissions.push(role.permissions.clone());
            }
        }

        EffectivePermissions {
            group_id,
            roles: roles.iter().map(RoleSummary::from).collect(),
            actions,
            permissions,
        }
    }
}
