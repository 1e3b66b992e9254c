use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{groups, health, roles, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }
}

/// Builds the API router and spawns the activity-log listener on the current runtime.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let group_routes = Router::new()
        .route("/", get(groups::list_groups).post(groups::create_group))
        .route(
            "/:id",
            get(groups::get_group)
                .put(groups::update_group)
                .delete(groups::delete_group),
        )
        .route("/:id/link-role", post(groups::link_role))
        .route("/:id/unlink-role/:role_id", delete(groups::unlink_role))
        .route("/:id/effective-permissions", get(groups::effective_permissions));

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/import", post(users::import_users))
        .route(
            "/:user_id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        );

    let role_routes = Router::new()
        .route("/", get(roles::list_roles))
        .route("/import", post(roles::import_roles))
        .route("/:role_id", get(roles::get_role));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/permission-groups", group_routes)
        .nest("/api/users", user_routes)
        .nest("/api/roles", role_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
