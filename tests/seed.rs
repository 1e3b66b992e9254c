mod common;

use anyhow::Result;
use axum::http::StatusCode;

use common::{members, spawn_app};
use perm_registry::services::seed::seed_sample_data;

#[tokio::test]
async fn sample_groups_are_resolved_by_the_engine() -> Result<()> {
    let t = spawn_app().await?;

    let summary = seed_sample_data(&t.pool).await?;
    assert_eq!(summary.users, 4);
    assert_eq!(summary.roles, 3);
    assert_eq!(summary.groups.len(), 3);

    let (status, list) = t.get("/api/permission-groups?search=all%20employees").await?;
    assert_eq!(status, StatusCode::OK);
    let everyone = &list["groups"][0];
    assert_eq!(everyone["groupName"], "All Employees");
    assert_eq!(everyone["activeMembershipCount"], 4);
    assert_eq!(members(everyone), vec!["EMP001", "EMP002", "EMP003", "demo-user"]);

    let (_, list) = t.get("/api/permission-groups?search=engineering").await?;
    assert_eq!(members(&list["groups"][0]), vec!["EMP001", "EMP003"]);

    let (_, list) = t.get("/api/permission-groups?search=hr%20admin").await?;
    let hr = &list["groups"][0];
    assert_eq!(hr["type"], "Static");
    assert_eq!(members(hr), vec!["EMP002"]);

    let uri = format!("/api/permission-groups/{}/effective-permissions", hr["groupId"]);
    let (_, effective) = t.get(&uri).await?;
    assert_eq!(effective["roles"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn reseeding_replaces_previous_groups() -> Result<()> {
    let t = spawn_app().await?;

    seed_sample_data(&t.pool).await?;
    let again = seed_sample_data(&t.pool).await?;

    let (_, list) = t.get("/api/permission-groups").await?;
    assert_eq!(list["pagination"]["total"], 3);

    // groupIds keep climbing across seeds
    assert!(again.groups.iter().all(|g| g.group_id > 3), "{:?}", again.groups);
    Ok(())
}
