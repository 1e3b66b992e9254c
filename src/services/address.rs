use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// The two ways a group can be addressed from a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAddress {
    pub group_id: Option<i64>,
    pub internal: Option<Uuid>,
}

impl GroupAddress {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            group_id: raw.parse::<i64>().ok(),
            internal: Uuid::parse_str(raw).ok(),
        }
    }
}

/// Resolves a group address to its internal identity: numeric `groupId`
/// first, then the internal id.
pub async fn resolve_group(conn: &mut SqliteConnection, raw: &str) -> AppResult<Uuid> {
    let address = GroupAddress::parse(raw);

    if let Some(group_id) = address.group_id {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM permission_groups WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(id) = found {
            return Uuid::parse_str(&id).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)));
        }
    }

    if let Some(internal) = address.internal {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM permission_groups WHERE id = ?")
            .bind(internal.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_some() {
            return Ok(internal);
        }
    }

    Err(AppError::not_found(format!("Permission group '{}' not found", raw.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_uuid_addresses() {
        assert_eq!(GroupAddress::parse("7").group_id, Some(7));
        assert_eq!(GroupAddress::parse(" 7 ").internal, None);

        let id = Uuid::new_v4();
        let address = GroupAddress::parse(&id.to_string());
        assert_eq!(address.group_id, None);
        assert_eq!(address.internal, Some(id));

        assert_eq!(GroupAddress::parse("engineering"), GroupAddress { group_id: None, internal: None });
    }
}
