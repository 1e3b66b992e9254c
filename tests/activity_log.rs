mod common;

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use common::spawn_app;
use perm_registry::events::chain_hash;

/// The listener writes asynchronously; poll until `event_name` shows up.
async fn wait_for_event(pool: &SqlitePool, event_name: &str) -> Result<(Option<String>, String, String)> {
    for _ in 0..50 {
        let row: Option<(Option<String>, String, String)> = sqlx::query_as(
            "SELECT actor_id, severity, properties FROM activity_log WHERE event_name = ? ORDER BY occurred_at DESC LIMIT 1",
        )
        .bind(event_name)
        .fetch_optional(pool)
        .await?;
        if let Some(row) = row {
            return Ok(row);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("event {} was never recorded", event_name)
}

#[tokio::test]
async fn group_mutations_are_audited() -> Result<()> {
    let t = spawn_app().await?;
    t.import_roles(json!([{"role_id": 3, "name": "Auditor"}])).await?;

    let group = t.create_group(json!({"groupName": "Audit", "userType": "Employee"})).await?;
    let uri = format!("/api/permission-groups/{}", group["groupId"]);
    t.call("PUT", &uri, Some(json!({"groupName": "Audit 2"}))).await?;
    t.call("POST", &format!("{uri}/link-role"), Some(json!({"roleId": 3}))).await?;
    t.call("DELETE", &uri, None).await?;

    let (actor, severity, properties) = wait_for_event(&t.pool, "permission_group.created").await?;
    assert_eq!(actor.as_deref(), Some("test-operator"));
    assert_eq!(severity, "critical");
    let properties: Value = serde_json::from_str(&properties)?;
    assert_eq!(properties["payload"]["new"]["groupName"], "Audit");

    let (_, _, properties) = wait_for_event(&t.pool, "permission_group.updated").await?;
    let properties: Value = serde_json::from_str(&properties)?;
    assert_eq!(properties["payload"]["old"]["groupName"], "Audit");
    assert_eq!(properties["payload"]["new"]["groupName"], "Audit 2");

    wait_for_event(&t.pool, "group_role.linked").await?;
    wait_for_event(&t.pool, "permission_group.deleted").await?;
    wait_for_event(&t.pool, "directory.roles_replaced").await?;

    Ok(())
}

#[tokio::test]
async fn event_store_is_hash_chained() -> Result<()> {
    let t = spawn_app().await?;
    t.create_group(json!({"groupName": "One", "userType": "Employee"})).await?;
    t.create_group(json!({"groupName": "Two", "userType": "Employee"})).await?;

    let mut rows: Vec<(Option<String>, String, String)> = Vec::new();
    for _ in 0..50 {
        rows = sqlx::query_as("SELECT prev_hash, hash, payload FROM event_store ORDER BY seq")
            .fetch_all(&t.pool)
            .await?;
        if rows.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(rows.len(), 2);

    let (first_prev, first_hash, first_payload) = &rows[0];
    assert!(first_prev.is_none());
    assert_eq!(first_hash, &chain_hash(None, first_payload));

    let (second_prev, second_hash, second_payload) = &rows[1];
    let second_prev = second_prev.as_deref().context("second event must link to the first")?;
    assert_eq!(second_prev, first_hash);
    assert_eq!(second_hash, &chain_hash(Some(second_prev), second_payload));
    Ok(())
}
