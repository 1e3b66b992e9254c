//! Bulk replacement of the user and role populations.
//!
//! Role exports arrive either as plain JSON or wrapped in a legacy callback
//! invocation, `handler('<id>','<id>', {...});`, from which the document
//! argument is cut out before parsing.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::begin_write;
use crate::db::row_parsers::parse_datetime;
use crate::errors::{AppError, AppResult};
use crate::events::{Loggable, Severity};
use crate::models::role::{NewRole, RoleRecord};
use crate::models::user::{NewUser, UserRecord};
use crate::services::users::insert_user;
use crate::utils::{to_db_timestamp, utc_now};

/// Outcome of a replace, also recorded in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImportSummary {
    /// `users` or `roles`
    #[schema(example = "roles")]
    pub kind: String,
    pub imported: usize,
}

impl Loggable for ImportSummary {
    fn entity_type() -> &'static str { "directory" }
    fn subject_id(&self) -> String { self.kind.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Finds the first `callee('<digits>','<digits>', <json>)` call in `raw` and
/// returns its JSON argument. Text before the call (DWR reply preambles such as
/// `//#DWR-REPLY`) and after the final `)` is ignored.
pub fn extract_callback_argument(raw: &str) -> Option<&str> {
    let close = raw.rfind(')')?;
    let body = &raw[..close];

    body.match_indices('(').find_map(|(open, _)| {
        let callee = body[..open].rsplit(|c: char| !is_callee_char(c)).next()?;
        if callee.is_empty() {
            return None;
        }

        let mut rest = &body[open + 1..];
        for _ in 0..2 {
            rest = skip_quoted_id(rest)?;
            rest = rest.trim_start().strip_prefix(',')?;
        }

        let argument = rest.trim();
        (!argument.is_empty()).then_some(argument)
    })
}

fn is_callee_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$')
}

fn skip_quoted_id(input: &str) -> Option<&str> {
    let input = input.trim_start();
    let quote = input.chars().next().filter(|c| matches!(c, '\'' | '"'))?;
    let inner = &input[1..];
    let end = inner.find(quote)?;
    let id = &inner[..end];
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(&inner[end + 1..])
}

/// Parses a payload that is either a JSON document or a callback-wrapped one.
fn parse_document(raw: &str) -> AppResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::parse("payload is empty"));
    }

    let json = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        trimmed
    } else {
        extract_callback_argument(trimmed)
            .ok_or_else(|| AppError::parse("payload is neither JSON nor a callback-wrapped document"))?
    };

    serde_json::from_str(json).map_err(|e| AppError::parse(format!("invalid JSON payload: {}", e)))
}

/// Pulls the `key` array out of a document and deserializes each entry,
/// reporting type errors with their path.
fn decode_records<T: DeserializeOwned>(document: Value, key: &str) -> AppResult<Vec<T>> {
    let Value::Object(mut object) = document else {
        return Err(AppError::parse(format!("payload must be an object with a '{}' array", key)));
    };
    let Some(Value::Array(entries)) = object.remove(key) else {
        return Err(AppError::parse(format!("payload has no '{}' array", key)));
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_path_to_error::deserialize::<_, T>(entry) {
            Ok(record) => records.push(record),
            Err(e) => errors.push(format!("{key}[{index}].{}: {}", e.path(), e.inner())),
        }
    }

    if errors.is_empty() {
        Ok(records)
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn decode_user_payload(raw: &str) -> AppResult<Vec<NewUser>> {
    let records: Vec<UserRecord> = decode_records(parse_document(raw)?, "users")?;

    let mut users = Vec::with_capacity(records.len());
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, record) in records.iter().enumerate() {
        let label = format!("users[{index}]: ");
        match record.validate(&label) {
            Ok(user) if !seen.insert(user.user_id.clone()) => {
                errors.push(format!("{label}duplicate userId '{}'", user.user_id));
            }
            Ok(user) => users.push(user),
            Err(mut problems) => errors.append(&mut problems),
        }
    }

    if errors.is_empty() {
        Ok(users)
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn decode_role_payload(raw: &str) -> AppResult<Vec<NewRole>> {
    let records: Vec<RoleRecord> = decode_records(parse_document(raw)?, "roles")?;

    let mut roles = Vec::with_capacity(records.len());
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, record) in records.iter().enumerate() {
        let label = format!("roles[{index}]: ");
        match record.validate(&label) {
            Ok(role) if !seen.insert(role.role_id) => {
                errors.push(format!("{label}duplicate role_id {}", role.role_id));
            }
            Ok(role) => roles.push(role),
            Err(mut problems) => errors.append(&mut problems),
        }
    }

    if errors.is_empty() {
        Ok(roles)
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Replaces every user in one transaction. Users that survive the import keep
/// their internal id and creation time. Group member lists are not re-resolved.
pub async fn replace_users(pool: &SqlitePool, users: Vec<NewUser>) -> AppResult<ImportSummary> {
    let mut tx = begin_write(pool).await?;

    let existing: Vec<(String, String, String)> = sqlx::query_as("SELECT user_id, id, created_at FROM users")
        .fetch_all(&mut *tx)
        .await?;
    let mut identities: HashMap<String, (Uuid, DateTime<Utc>)> = HashMap::with_capacity(existing.len());
    for (user_id, id, created_at) in existing {
        let id = Uuid::parse_str(&id).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))?;
        identities.insert(user_id, (id, parse_datetime(&created_at)?));
    }

    sqlx::query("DELETE FROM users").execute(&mut *tx).await?;

    let now = utc_now();
    for user in &users {
        insert_user(&mut tx, user, identities.get(&user.user_id).copied(), now).await?;
    }
    tx.commit().await?;

    tracing::info!(users = users.len(), "user population replaced");
    Ok(ImportSummary {
        kind: "users".to_string(),
        imported: users.len(),
    })
}

/// Replaces every role in one transaction. Group links to vanished roles stay
/// until unlinked and are skipped by populated views.
pub async fn replace_roles(pool: &SqlitePool, roles: Vec<NewRole>) -> AppResult<ImportSummary> {
    let mut tx = begin_write(pool).await?;

    sqlx::query("DELETE FROM roles").execute(&mut *tx).await?;

    let now = utc_now();
    for role in &roles {
        let actions = serde_json::to_string(&role.actions)
            .map_err(|e| AppError::internal(format!("failed to encode actions: {}", e)))?;
        let permissions = serde_json::to_string(&role.permissions)
            .map_err(|e| AppError::internal(format!("failed to encode permissions: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO roles (role_id, name, description, user_type, status, rbp_only, actions, permissions, last_modified, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(role.role_id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(&role.user_type)
        .bind(&role.status)
        .bind(role.rbp_only)
        .bind(actions)
        .bind(permissions)
        .bind(to_db_timestamp(role.last_modified.unwrap_or(now)))
        .bind(to_db_timestamp(now))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(roles = roles.len(), "role population replaced");
    Ok(ImportSummary {
        kind: "roles".to_string(),
        imported: roles.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"dwr.engine._remoteHandleCallback('4','0',{"roles":[{"role_id":12,"role_name":"Payroll Admin","status":"ACTIVE","actions":["view","edit"]}]});"#;

    #[test]
    fn callback_argument_is_extracted() {
        assert_eq!(extract_callback_argument("cb('1','2', {\"a\":1});"), Some("{\"a\":1}"));
        assert_eq!(extract_callback_argument("cb('1','2',[1,2])"), Some("[1,2]"));
        assert!(extract_callback_argument(LEGACY).is_some());
    }

    #[test]
    fn reply_preamble_before_callback_is_skipped() {
        let raw = format!("throw 'allowScriptTagRemoting is false.';\n//#DWR-INSERT\n//#DWR-REPLY\n{LEGACY}\n");
        assert_eq!(extract_callback_argument(&raw), extract_callback_argument(LEGACY));

        let roles = decode_role_payload(&raw).unwrap();
        assert_eq!(roles[0].role_id, 12);

        let reply_only = format!("//#DWR-REPLY\n{LEGACY}");
        assert_eq!(decode_role_payload(&reply_only).unwrap().len(), 1);
    }

    #[test]
    fn first_well_formed_call_wins() {
        let raw = "log(1); cb('x','0',[]); cb('3','0', {\"roles\":[]});";
        assert_eq!(extract_callback_argument(raw), Some("{\"roles\":[]}"));
    }

    #[test]
    fn malformed_wrappers_are_rejected() {
        assert_eq!(extract_callback_argument("cb({\"a\":1});"), None);
        assert_eq!(extract_callback_argument("cb('x','2',{});"), None);
        assert_eq!(extract_callback_argument("cb('1','2',);"), None);
        assert_eq!(extract_callback_argument("cb('1','2',{}"), None);
        assert_eq!(extract_callback_argument("('1','2',{});"), None);
    }

    #[test]
    fn legacy_role_payload_decodes() {
        let roles = decode_role_payload(LEGACY).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].role_id, 12);
        assert_eq!(roles[0].name, "Payroll Admin");
        assert_eq!(roles[0].status, "active");
        assert_eq!(roles[0].actions, vec!["view", "edit"]);
    }

    #[test]
    fn direct_role_payload_decodes() {
        let roles = decode_role_payload(r#"{"roles":[{"roleId":1,"name":"Viewer"}]}"#).unwrap();
        assert_eq!(roles[0].role_id, 1);
    }

    #[test]
    fn unparseable_payloads_are_parse_errors() {
        for raw in ["", "not json", "cb('1','2',{broken);", r#"{"items":[]}"#, "[1,2]"] {
            let err = decode_role_payload(raw).unwrap_err();
            assert!(matches!(err, AppError::Parse(_)), "{raw}: {err:?}");
        }
    }

    #[test]
    fn bad_records_are_validation_errors() {
        let err = decode_role_payload(r#"{"roles":[{"role_id":"twelve","name":"x"}]}"#).unwrap_err();
        match err {
            AppError::Validation(errors) => assert!(errors[0].starts_with("roles[0].role_id"), "{errors:?}"),
            other => panic!("unexpected {other:?}"),
        }

        let err = decode_role_payload(r#"{"roles":[{"role_id":1,"name":"a"},{"role_id":1,"name":"b"}]}"#).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e[0].contains("duplicate role_id 1")), "{err:?}");
    }

    #[test]
    fn user_payload_rejects_duplicates() {
        let raw = r#"{"users":[
            {"userId":"E1","name":"Ada","email":"ada@example.com"},
            {"userId":"E1","name":"Bob","email":"bob@example.com"}
        ]}"#;
        let err = decode_user_payload(raw).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.len() == 1), "{err:?}");

        let ok = decode_user_payload(r#"{"users":[{"userId":"E1","name":"Ada","email":"ada@example.com"}]}"#).unwrap();
        assert_eq!(ok[0].user_id, "E1");
    }
}
