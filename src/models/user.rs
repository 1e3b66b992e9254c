use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::events::Loggable;
use crate::models::criteria::AttributeCategory;
use crate::models::Pagination;
use crate::utils::{is_valid_email, non_blank};

pub const DEFAULT_USER_TYPE: &str = "Employee";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    #[schema(example = "E1001")]
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub division: Option<String>,
    pub user_type: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Typed lookup of the attribute a criterion category refers to.
    pub fn attribute(&self, category: AttributeCategory) -> Option<&str> {
        match category {
            AttributeCategory::Department => self.department.as_deref(),
            AttributeCategory::Location => self.location.as_deref(),
            AttributeCategory::Country => self.country.as_deref(),
            AttributeCategory::JobTitle => self.job_title.as_deref(),
            AttributeCategory::Division => self.division.as_deref(),
            AttributeCategory::Gender => self.gender.as_deref(),
            AttributeCategory::UserType => Some(self.user_type.as_str()),
            AttributeCategory::Status => Some(self.status.as_str()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

impl Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> String { self.user_id.clone() }
}

/// A user as submitted by a direct write or an import file, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[schema(example = "E1001")]
    pub user_id: Option<String>,
    #[schema(example = "Ada Lovelace")]
    pub name: Option<String>,
    #[schema(example = "ada@example.com")]
    pub email: Option<String>,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub division: Option<String>,
    #[schema(example = "Employee")]
    pub user_type: Option<String>,
    #[schema(example = "active")]
    pub status: Option<String>,
}

/// Validated user fields ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub division: Option<String>,
    pub user_type: String,
    pub status: UserStatus,
}

impl UserRecord {
    /// Checks required fields and enums; every problem is reported, prefixed with `label`.
    pub fn validate(&self, label: &str) -> Result<NewUser, Vec<String>> {
        let mut errors = Vec::new();

        let user_id = non_blank(self.user_id.as_deref());
        if user_id.is_none() {
            errors.push(format!("{label}userId is required"));
        }

        let name = non_blank(self.name.as_deref());
        if name.is_none() {
            errors.push(format!("{label}name is required"));
        }

        let email = non_blank(self.email.as_deref());
        match email.as_deref() {
            None => errors.push(format!("{label}email is required")),
            Some(email) if !is_valid_email(email) => errors.push(format!("{label}invalid email format")),
            Some(_) => {}
        }

        let status = match self.status.as_deref() {
            None => UserStatus::Active,
            Some(raw) => UserStatus::parse(raw).unwrap_or_else(|| {
                errors.push(format!("{label}status must be either active or inactive"));
                UserStatus::Active
            }),
        };

        match (user_id, name, email) {
            (Some(user_id), Some(name), Some(email)) if errors.is_empty() => Ok(NewUser {
                user_id,
                name,
                email,
                department: non_blank(self.department.as_deref()),
                job_title: non_blank(self.job_title.as_deref()),
                location: non_blank(self.location.as_deref()),
                country: non_blank(self.country.as_deref()),
                gender: non_blank(self.gender.as_deref()),
                division: non_blank(self.division.as_deref()),
                user_type: non_blank(self.user_type.as_deref()).unwrap_or_else(|| DEFAULT_USER_TYPE.to_string()),
                status,
            }),
            _ => Err(errors),
        }
    }
}

/// Partial update; `userId` is the stable key and cannot be changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub division: Option<String>,
    pub user_type: Option<String>,
    pub status: Option<String>,
}

impl UserUpdateRequest {
    /// Applies the patch in place. Blank optional attributes clear the field.
    pub fn apply(&self, user: &mut User) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Some(name) = self.name.as_deref() {
            match non_blank(Some(name)) {
                Some(name) => user.name = name,
                None => errors.push("name must not be blank".to_string()),
            }
        }

        if let Some(email) = self.email.as_deref() {
            let email = email.trim();
            if is_valid_email(email) {
                user.email = email.to_string();
            } else {
                errors.push("invalid email format".to_string());
            }
        }

        if let Some(user_type) = self.user_type.as_deref() {
            match non_blank(Some(user_type)) {
                Some(user_type) => user.user_type = user_type,
                None => errors.push("userType must not be blank".to_string()),
            }
        }

        if let Some(status) = self.status.as_deref() {
            match UserStatus::parse(status) {
                Some(status) => user.status = status,
                None => errors.push("status must be either active or inactive".to_string()),
            }
        }

        let optional = [
            (&self.department, &mut user.department),
            (&self.job_title, &mut user.job_title),
            (&self.location, &mut user.location),
            (&self.country, &mut user.country),
            (&self.gender, &mut user.gender),
            (&self.division, &mut user.division),
        ];
        for (patch, field) in optional {
            if let Some(value) = patch.as_deref() {
                *field = non_blank(Some(value));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Case-insensitive substring of name, email or userId
    pub search: Option<String>,
    pub department: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

/// Group summary shown on a user's detail view.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupSummary {
    pub group_id: i64,
    pub group_name: String,
    #[serde(rename = "type")]
    pub group_type: String,
    pub related_permission_roles: Vec<crate::models::role::RoleSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub groups: Vec<UserGroupSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UserRecord {
        UserRecord {
            user_id: Some("E1".to_string()),
            name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            department: Some("Eng".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_applied() {
        let user = record().validate("").unwrap();
        assert_eq!(user.user_type, DEFAULT_USER_TYPE);
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.department.as_deref(), Some("Eng"));
        assert_eq!(user.location, None);
    }

    #[test]
    fn every_problem_is_reported() {
        let bad = UserRecord {
            email: Some("not-an-email".to_string()),
            status: Some("retired".to_string()),
            ..Default::default()
        };
        let errors = bad.validate("users[3]: ").unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().all(|e| e.starts_with("users[3]: ")));
    }

    #[test]
    fn update_clears_blank_attributes() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            user_id: "E1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            department: Some("Eng".to_string()),
            job_title: None,
            location: Some("SF".to_string()),
            country: None,
            gender: None,
            division: None,
            user_type: DEFAULT_USER_TYPE.to_string(),
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let patch = UserUpdateRequest {
            location: Some(String::new()),
            department: Some("HR".to_string()),
            status: Some("inactive".to_string()),
            ..Default::default()
        };
        patch.apply(&mut user).unwrap();

        assert_eq!(user.location, None);
        assert_eq!(user.department.as_deref(), Some("HR"));
        assert!(!user.is_active());
        assert_eq!(user.attribute(AttributeCategory::Status), Some("inactive"));
    }
}
