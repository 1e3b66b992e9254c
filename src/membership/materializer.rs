use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::row_parsers::user_from_row;
use crate::errors::{AppError, AppResult};
use crate::membership::evaluator::evaluate;
use crate::models::group::{GroupPatch, GroupType, PermissionGroup};
use crate::models::user::User;

/// Dynamic groups are resolved as soon as they are created, even with no criteria.
pub fn triggers_on_create(group_type: GroupType) -> bool {
    group_type == GroupType::Dynamic
}

/// An update re-resolves when it supplies the type or either rule list and
/// the group ends up Dynamic. Supplying unchanged criteria still refreshes.
pub fn triggers_on_update(patch: &GroupPatch, resulting_type: GroupType) -> bool {
    resulting_type == GroupType::Dynamic && patch.touches_resolution_inputs()
}

/// Replaces the members and count of a Dynamic `group` with the evaluator's
/// output over `population`. Static groups are left untouched.
///
/// Returns whether the member list changed.
pub fn materialize(group: &mut PermissionGroup, population: &[User]) -> bool {
    if group.group_type != GroupType::Dynamic {
        return false;
    }

    let members = evaluate(&group.include_criteria, &group.exclude_criteria, population);
    let changed = members != group.members;

    group.active_membership_count = members.len() as i64;
    group.members = members;

    tracing::info!(
        group_id = group.group_id,
        members = group.active_membership_count,
        changed,
        "membership materialized"
    );

    changed
}

/// Snapshot of the attribute store, ordered by `userId` so resolution output is stable.
pub async fn load_population(conn: &mut SqliteConnection) -> AppResult<Vec<User>> {
    let rows = sqlx::query("SELECT * FROM users ORDER BY user_id")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::resolution(format!("failed to read user population: {}", e)))?;

    rows.iter()
        .map(user_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::resolution(format!("failed to read user population: {}", e)))
}

/// Rewrites the stored member list of a group, keeping the given order.
pub async fn replace_members(conn: &mut SqliteConnection, group_ref: Uuid, members: &[String]) -> AppResult<()> {
    let group_ref = group_ref.to_string();

    sqlx::query("DELETE FROM group_members WHERE group_ref = ?")
        .bind(&group_ref)
        .execute(&mut *conn)
        .await?;

    for (position, user_id) in members.iter().enumerate() {
        sqlx::query("INSERT INTO group_members (group_ref, user_id, position) VALUES (?, ?, ?)")
            .bind(&group_ref)
            .bind(user_id)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    use super::*;
    use crate::membership::evaluator::tests::population;
    use crate::models::criteria::{AttributeCategory, Criterion};
    use crate::models::group::GroupStatus;
    use crate::utils::to_db_timestamp;

    fn group(group_type: GroupType, include: Vec<Criterion>, exclude: Vec<Criterion>) -> PermissionGroup {
        let now = Utc::now();
        PermissionGroup {
            id: Uuid::new_v4(),
            group_id: 1,
            group_name: "Eng".to_string(),
            user_type: "Employee".to_string(),
            group_type,
            is_rbp_only: false,
            status: GroupStatus::Active,
            include_criteria: include,
            exclude_criteria: exclude,
            members: Vec::new(),
            active_membership_count: 0,
            related_permission_roles: Vec::new(),
            last_modified: now,
            created_at: now,
        }
    }

    fn dept(value: &str) -> Criterion {
        Criterion::new(AttributeCategory::Department, value)
    }

    #[test]
    fn dynamic_group_gets_members_and_count() {
        let mut g = group(GroupType::Dynamic, vec![dept("Eng")], vec![]);
        assert!(materialize(&mut g, &population()));
        assert_eq!(g.members, vec!["E1", "E2"]);
        assert_eq!(g.active_membership_count, 2);

        assert!(!materialize(&mut g, &population()), "second run reports no change");
        assert_eq!(g.active_membership_count, g.members.len() as i64);
    }

    #[test]
    fn end_to_end_exclude_narrows_membership() {
        let users = population();
        let mut g = group(GroupType::Dynamic, vec![dept("Eng")], vec![]);
        materialize(&mut g, &users);
        assert_eq!(g.active_membership_count, 2);

        g.exclude_criteria = vec![Criterion::new(AttributeCategory::Location, "SF")];
        materialize(&mut g, &users);
        assert_eq!(g.members, vec!["E1"]);
        assert_eq!(g.active_membership_count, 1);
    }

    #[test]
    fn static_group_is_never_touched() {
        let mut g = group(GroupType::Static, vec![dept("Eng")], vec![]);
        g.members = vec!["E3".to_string()];
        g.active_membership_count = 1;

        assert!(!materialize(&mut g, &population()));
        assert_eq!(g.members, vec!["E3"]);
        assert_eq!(g.active_membership_count, 1);
    }

    #[test]
    fn trigger_policy() {
        assert!(triggers_on_create(GroupType::Dynamic));
        assert!(!triggers_on_create(GroupType::Static));

        let rename = GroupPatch {
            group_name: Some("New".to_string()),
            ..Default::default()
        };
        assert!(!triggers_on_update(&rename, GroupType::Dynamic));

        let criteria = GroupPatch {
            include_criteria: Some(vec![dept("Eng")]),
            ..Default::default()
        };
        assert!(triggers_on_update(&criteria, GroupType::Dynamic));
        assert!(!triggers_on_update(&criteria, GroupType::Static));

        let to_dynamic = GroupPatch {
            group_type: Some(GroupType::Dynamic),
            ..Default::default()
        };
        assert!(triggers_on_update(&to_dynamic, GroupType::Dynamic));
    }

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        pool
    }

    async fn insert_user(pool: &SqlitePool, user_id: &str, department: &str) {
        let now = to_db_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO users (id, user_id, name, email, department, user_type, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 'Employee', 'active', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(format!("User {user_id}"))
        .bind(format!("{user_id}@example.com"))
        .bind(department)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn population_is_read_in_user_id_order() {
        let pool = memory_pool().await;
        insert_user(&pool, "E3", "Eng").await;
        insert_user(&pool, "E1", "Eng").await;
        insert_user(&pool, "E2", "HR").await;

        let mut conn = pool.acquire().await.unwrap();
        let users = load_population(&mut conn).await.unwrap();
        let ids: Vec<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["E1", "E2", "E3"]);
    }

    #[tokio::test]
    async fn unreadable_population_is_a_resolution_error() {
        let pool = memory_pool().await;
        sqlx::query("DROP TABLE users").execute(&pool).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let err = load_population(&mut conn).await.unwrap_err();
        assert!(matches!(err, AppError::Resolution(_)), "{err:?}");
    }
}
