mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{directory, members, spawn_app};

const LEGACY_ROLES: &str = r#"dwr.engine._remoteHandleCallback('4','0',{"roles":[
    {"role_id":1,"role_name":"Employee Self Service","status":"ACTIVE","actions":["view"]},
    {"role_id":2,"role_name":"HR Admin","userType":"Employee","rbpOnly":true,"actions":["view","edit"],"permissions":{"userPermissions":["hire"]}}
]});"#;

#[tokio::test]
async fn legacy_role_payload_is_imported() -> Result<()> {
    let t = spawn_app().await?;

    let (status, summary) = t.post_raw("/api/roles/import", LEGACY_ROLES).await?;
    assert_eq!(status, StatusCode::OK, "{summary}");
    assert_eq!(summary, json!({"kind": "roles", "imported": 2}));

    let (_, roles) = t.get("/api/roles").await?;
    assert_eq!(roles.as_array().unwrap().len(), 2);
    assert_eq!(roles[0]["name"], "Employee Self Service");
    assert_eq!(roles[0]["status"], "active");

    let (status, role) = t.get("/api/roles/2").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role["rbpOnly"], true);
    assert_eq!(role["permissions"]["userPermissions"], json!(["hire"]));

    let (status, _) = t.get("/api/roles/3").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn dwr_reply_with_preamble_is_imported() -> Result<()> {
    let t = spawn_app().await?;

    let reply = format!("throw 'allowScriptTagRemoting is false.';\n//#DWR-INSERT\n//#DWR-REPLY\n{LEGACY_ROLES}\n");
    let (status, summary) = t.post_raw("/api/roles/import", &reply).await?;
    assert_eq!(status, StatusCode::OK, "{summary}");
    assert_eq!(summary["imported"], 2);

    let (status, role) = t.get("/api/roles/1").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role["name"], "Employee Self Service");
    Ok(())
}

#[tokio::test]
async fn malformed_payload_keeps_existing_roles() -> Result<()> {
    let t = spawn_app().await?;
    t.import_roles(json!([{"role_id": 7, "name": "Keeper"}])).await?;

    let (status, body) = t.post_raw("/api/roles/import", "dwr.engine._remoteHandleCallback('4','0',{\"roles\":[);").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "parse");

    let (status, body) = t.post_raw("/api/roles/import", r#"{"roles":[{"role_id":8}]}"#).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (_, roles) = t.get("/api/roles").await?;
    assert_eq!(roles.as_array().unwrap().len(), 1);
    assert_eq!(roles[0]["role_id"], 7);
    Ok(())
}

#[tokio::test]
async fn user_import_replaces_population_without_reresolving() -> Result<()> {
    let t = spawn_app().await?;
    t.import_users(directory()).await?;

    let group = t
        .create_group(json!({
            "groupName": "Eng",
            "userType": "Employee",
            "includeCriteria": [{"category": "department", "value": "Eng"}]
        }))
        .await?;
    assert_eq!(members(&group), vec!["E1", "E2"]);

    let (_, before) = t.get("/api/users/E1").await?;

    t.import_users(json!([
        {"userId": "E1", "name": "Ada", "email": "ada@example.com", "department": "Eng"},
        {"userId": "E5", "name": "Eve", "email": "eve@example.com", "department": "Eng"}
    ]))
    .await?;

    let (_, users) = t.get("/api/users").await?;
    assert_eq!(users["pagination"]["total"], 2);

    let (_, after) = t.get("/api/users/E1").await?;
    assert_eq!(after["id"], before["id"], "surviving users keep their identity");

    // Stored membership is stale until the next resolving write.
    let uri = format!("/api/permission-groups/{}", group["groupId"]);
    let (_, detail) = t.get(&uri).await?;
    assert_eq!(members(&detail), vec!["E1", "E2"]);
    let profiles: Vec<&str> = detail["memberProfiles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["userId"].as_str().unwrap())
        .collect();
    assert_eq!(profiles, vec!["E1"]);

    let (_, refreshed) = t.call("PUT", &uri, Some(json!({"type": "Dynamic"}))).await?;
    assert_eq!(members(&refreshed), vec!["E1", "E5"]);
    Ok(())
}

#[tokio::test]
async fn invalid_user_records_reject_whole_import() -> Result<()> {
    let t = spawn_app().await?;
    t.import_users(directory()).await?;

    let payload = json!({"users": [
        {"userId": "E9", "name": "Ok", "email": "ok@example.com"},
        {"userId": "E10", "name": "Bad", "email": "not-an-email"}
    ]});
    let (status, body) = t.post_raw("/api/users/import", &payload.to_string()).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"][0].as_str().unwrap().starts_with("users[1]"), "{body}");

    let (_, users) = t.get("/api/users").await?;
    assert_eq!(users["pagination"]["total"], 4);

    let (status, body) = t.post_raw("/api/users/import", r#"{"people": []}"#).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "parse");
    Ok(())
}
