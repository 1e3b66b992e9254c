#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt; // for `oneshot`

use perm_registry::create_app;
use perm_registry::jwt::JwtConfig;

pub const TEST_SECRET: &str = "test-secret";

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub token: String,
    _dir: TempDir,
}

/// Fresh SQLite file with migrations applied, plus a router and an operator token.
pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempdir()?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", TEST_SECRET);
    let app = create_app(pool.clone()).await?;
    let token = JwtConfig::new(TEST_SECRET, 1).encode("test-operator")?;

    Ok(TestApp {
        app,
        pool,
        token,
        _dir: dir,
    })
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let resp = self.app.clone().oneshot(request).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        let req = Request::builder().method("GET").uri(uri).body(Body::empty())?;
        self.send(req).await
    }

    /// Authenticated JSON request.
    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.token));

        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        self.send(req).await
    }

    /// Authenticated request with a raw text body.
    pub async fn post_raw(&self, uri: &str, body: &str) -> Result<(StatusCode, Value)> {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.token))
            .header("content-type", "text/plain")
            .body(Body::from(body.to_string()))?;
        self.send(req).await
    }

    pub async fn import_users(&self, users: Value) -> Result<()> {
        let (status, body) = self.post_raw("/api/users/import", &json!({ "users": users }).to_string()).await?;
        anyhow::ensure!(status == StatusCode::OK, "user import failed: {} {}", status, body);
        Ok(())
    }

    pub async fn import_roles(&self, roles: Value) -> Result<()> {
        let (status, body) = self.post_raw("/api/roles/import", &json!({ "roles": roles }).to_string()).await?;
        anyhow::ensure!(status == StatusCode::OK, "role import failed: {} {}", status, body);
        Ok(())
    }

    pub async fn create_group(&self, body: Value) -> Result<Value> {
        let (status, group) = self.call("POST", "/api/permission-groups", Some(body)).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "group create failed: {} {}", status, group);
        Ok(group)
    }
}

/// Three active users (Eng/NY, Eng/SF, HR/NY) and one inactive Eng/NY user.
pub fn directory() -> Value {
    json!([
        {"userId": "E1", "name": "Ada", "email": "ada@example.com", "department": "Eng", "location": "NY"},
        {"userId": "E2", "name": "Brian", "email": "brian@example.com", "department": "Eng", "location": "SF"},
        {"userId": "E3", "name": "Chen", "email": "chen@example.com", "department": "HR", "location": "NY"},
        {"userId": "E4", "name": "Dana", "email": "dana@example.com", "department": "Eng", "location": "NY", "status": "inactive"}
    ])
}

pub fn members(group: &Value) -> Vec<String> {
    group["members"]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}
