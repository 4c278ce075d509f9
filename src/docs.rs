use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{models, routes, workflow};

pub const OPENAPI_JSON_ROUTE: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
	info(title = "RMA service", description = "Return merchandise authorization lifecycle"),
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::rma::create_rma,
		routes::rma::list_rmas,
		routes::rma::rma_stats,
		routes::rma::get_rma,
		routes::rma::rma_history,
		routes::rma::approve,
		routes::rma::reject,
		routes::rma::mark_evaluating,
		routes::rma::mark_payment,
		routes::rma::mark_processing,
		routes::rma::mark_inshipping,
		routes::rma::mark_complete,
		routes::users::update_role
	),
	components(
		schemas(
			crate::authz::Role,
			workflow::Status,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::MeResponse,
			models::user::RoleUpdateRequest,
			models::rma::ServiceType,
			models::rma::Evidence,
			models::rma::RmaItem,
			models::rma::Rma,
			models::rma::RmaItemRequest,
			models::rma::RmaCreateRequest,
			models::rma::RejectRequest,
			models::rma::InShippingRequest,
			models::rma::StatusCount,
			models::rma::RmaStats,
			models::rma::RmaHistoryEntry,
			routes::rma::EvidenceUpload,
			routes::auth::MessageResponse,
			routes::health::HealthResponse
		)
	),
	tags(
		(name = "Health", description = "Liveness and database check"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "RMA", description = "Return requests and their status pipeline"),
		(name = "Users", description = "Role administration")
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

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new([OPENAPI_JSON_ROUTE])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route(OPENAPI_JSON_ROUTE, json_route)
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
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		for item in paths.values_mut() {
			if let Some(operations) = item.as_object_mut() {
				for operation in operations.values_mut() {
					apply_parameter_examples(operation);
					apply_request_examples(operation);
				}
			}
		}
	}
}

fn apply_parameter_examples(operation: &mut Value) {
	let Some(parameters) = operation.get_mut("parameters").and_then(Value::as_array_mut) else { return; };

	for parameter in parameters.iter_mut() {
		let example = match parameter.get("name").and_then(Value::as_str) {
			Some("id") => json!("00000000-0000-0000-0000-000000000000"),
			Some("status") => json!("EVALUATING"),
			Some("start_date") => json!("2025-01-01T00:00:00Z"),
			Some("end_date") => json!("2025-12-31T23:59:59Z"),
			_ => continue,
		};
		if let Some(obj) = parameter.as_object_mut() {
			obj.entry("example").or_insert(example);
		}
	}
}

fn apply_request_examples(operation: &mut Value) {
	let Some(request_body) = operation.get_mut("requestBody") else { return; };
	let Some(content) = request_body.get_mut("content").and_then(Value::as_object_mut) else { return; };
	let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else { return; };
	let Some(schema) = app_json.get("schema").and_then(Value::as_object) else { return; };
	let Some(reference) = schema.get("$ref").and_then(Value::as_str) else { return; };

	let example = match reference {
		"#/components/schemas/RegisterRequest" => Some(json!({
			"name": "Ada Lovelace",
			"email": "ada@example.com",
			"password": "S3cureP@ssw0rd",
			"company": "Tech Solutions S.A."
		})),
		"#/components/schemas/RmaCreateRequest" => Some(json!({
			"company_name": "Tech Solutions S.A.",
			"address": "Av. Reforma 123, Col. Centro",
			"postal_code": "06000",
			"service_type": "REPAIR",
			"items": [{
				"product_id": "11111111-1111-1111-1111-111111111111",
				"serial_number": "SN-99812",
				"model": "FX-200"
			}]
		})),
		"#/components/schemas/RejectRequest" => Some(json!({
			"rejection_reason": "Documentación incompleta"
		})),
		"#/components/schemas/InShippingRequest" => Some(json!({
			"tracking_information": "TRK001234567"
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
	fn document_lists_transition_endpoints() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();
		let paths = doc["paths"].as_object().unwrap();
		for path in [
			"/rma",
			"/rma/{id}/approve",
			"/rma/{id}/reject",
			"/rma/{id}/mark-payment",
			"/rma/{id}/mark-complete",
			"/users/{id}/role",
		] {
			assert!(paths.contains_key(path), "missing {path}");
		}
		assert!(doc["components"]["securitySchemes"]["bearerAuth"].is_object());
		assert_eq!(doc["servers"][0]["url"], "http://localhost:8000");
	}
}
