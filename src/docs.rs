use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;
use crate::services;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::groups::list_groups,
		routes::groups::create_group,
		routes::groups::get_group,
		routes::groups::update_group,
		routes::groups::delete_group,
		routes::groups::link_role,
		routes::groups::unlink_role,
		routes::groups::effective_permissions,
		routes::users::list_users,
		routes::users::create_user,
		routes::users::get_user,
		routes::users::update_user,
		routes::users::delete_user,
		routes::users::import_users,
		routes::roles::list_roles,
		routes::roles::get_role,
		routes::roles::import_roles
	),
	components(
		schemas(
			routes::health::HealthResponse,
			models::Pagination,
			models::criteria::AttributeCategory,
			models::criteria::Criterion,
			models::criteria::CriterionInput,
			models::group::GroupType,
			models::group::GroupStatus,
			models::group::PermissionGroup,
			models::group::GroupCreateRequest,
			models::group::GroupUpdateRequest,
			models::group::GroupDetail,
			models::group::GroupListResponse,
			models::group::MemberSummary,
			models::group::LinkRoleRequest,
			models::role::Role,
			models::role::RoleSummary,
			models::role::EffectivePermissions,
			models::user::User,
			models::user::UserStatus,
			models::user::UserRecord,
			models::user::UserUpdateRequest,
			models::user::UserDetail,
			models::user::UserGroupSummary,
			models::user::UserListResponse,
			services::import::ImportSummary
		)
	),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Permission Groups", description = "Static and dynamic permission groups"),
		(name = "Users", description = "User directory"),
		(name = "Roles", description = "Permission roles")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	add_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

/// Serves the document at `/api-docs/openapi.json` and Swagger UI at `/docs`.
pub fn swagger_routes(doc: &utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else { return; };

	let Some(components) = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};

	let Some(schemes) = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
	else {
		return;
	};

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn add_examples(doc: &mut Value) {
	let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) else { return; };

	for item in paths.values_mut() {
		let Some(operations) = item.as_object_mut() else { continue; };
		for operation in operations.values_mut() {
			apply_request_examples(operation);
		}
	}
}

fn apply_request_examples(operation: &mut Value) {
	let Some(app_json) = operation
		.get_mut("requestBody")
		.and_then(|body| body.get_mut("content"))
		.and_then(|content| content.get_mut("application/json"))
		.and_then(Value::as_object_mut)
	else {
		return;
	};

	let schema_ref = app_json
		.get("schema")
		.and_then(|schema| schema.get("$ref"))
		.and_then(Value::as_str)
		.unwrap_or_default();

	let example = match schema_ref {
		"#/components/schemas/GroupCreateRequest" => Some(json!({
			"groupName": "Engineering NY",
			"userType": "Employee",
			"type": "Dynamic",
			"includeCriteria": [
				{"category": "department", "value": "Engineering"},
				{"category": "location", "value": "New York"}
			],
			"excludeCriteria": [
				{"category": "jobTitle", "value": "Contractor"}
			]
		})),
		"#/components/schemas/GroupUpdateRequest" => Some(json!({
			"excludeCriteria": [
				{"category": "location", "value": "San Francisco"}
			]
		})),
		"#/components/schemas/LinkRoleRequest" => Some(json!({ "roleId": 42 })),
		"#/components/schemas/UserRecord" => Some(json!({
			"userId": "E1001",
			"name": "Ada Lovelace",
			"email": "ada@example.com",
			"department": "Engineering",
			"location": "New York",
			"userType": "Employee"
		})),
		_ => None,
	};

	if let Some(example) = example {
		app_json.insert("example".to_string(), example);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_group_routes_and_bearer_scheme() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();

		assert!(doc["paths"]["/api/permission-groups"]["post"].is_object());
		assert!(doc["paths"]["/api/permission-groups/{id}/link-role"]["post"].is_object());
		assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
		assert_eq!(doc["servers"][0]["url"], "http://localhost:8000");
	}
}
