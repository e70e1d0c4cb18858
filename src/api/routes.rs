use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{change_log_handlers, docs, graphql, handlers, relation_handlers};
use crate::config::ServerConfig;
use crate::context::AppState;
use crate::store::Store;

/// Large schema definitions and instance payloads are accepted up to 50 MB
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub fn create_router<S: Store>(state: AppState<S>) -> Router {
    let mut inventory = Router::new()
        // Schemas
        .route(
            "/schemas",
            get(handlers::list_schemas::<S>).post(handlers::create_schema::<S>),
        )
        .route(
            "/schemas/:id",
            get(handlers::get_schema::<S>)
                .patch(handlers::update_schema::<S>)
                .delete(handlers::delete_schema::<S>),
        )
        // Instances
        .route(
            "/instances",
            get(handlers::list_instances::<S>).post(handlers::create_instance::<S>),
        )
        .route(
            "/instances/:id",
            get(handlers::get_instance::<S>)
                .patch(handlers::update_instance::<S>)
                .delete(handlers::delete_instance::<S>),
        )
        // Relations
        .route(
            "/relations",
            get(relation_handlers::list_relations::<S>)
                .post(relation_handlers::create_relation::<S>),
        )
        .route(
            "/relations/:id",
            get(relation_handlers::get_relation::<S>)
                .patch(relation_handlers::update_relation::<S>)
                .delete(relation_handlers::delete_relation::<S>),
        )
        // Instance relations
        .route(
            "/instance-relations",
            get(relation_handlers::list_instance_relations::<S>)
                .post(relation_handlers::create_instance_relation::<S>),
        )
        .route(
            "/instance-relations/:id",
            get(relation_handlers::get_instance_relation::<S>)
                .patch(relation_handlers::update_instance_relation::<S>)
                .delete(relation_handlers::delete_instance_relation::<S>),
        )
        // Audit trail
        .route(
            "/change-logs",
            get(change_log_handlers::list_change_logs::<S>),
        )
        // GraphQL
        .route(
            "/graphql",
            get(graphql::graphiql).post(graphql::graphql_handler),
        );

    if state.config.is_development() {
        inventory = inventory
            .route("/docs", get(docs::get_api_docs))
            .route("/docs/openapi.json", get(docs::get_openapi_spec));
    }

    let graphql_schema = graphql::build_schema(state.clone());

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v2/inventory", inventory)
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(Extension(graphql_schema))
        .layer(middleware::from_fn(log_requests))
        .layer(cors_layer(&state.config.server))
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(Any)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{} {} {} {}ms",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::services::test_support::context;

    fn app() -> Router {
        create_router(Arc::new(context()))
    }

    async fn send(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn battery() -> Value {
        json!({
            "name": "Battery",
            "schema_definition": r#"{"type": "object", "properties": {"title": {"type": "string"}}, "required": ["title"]}"#
        })
    }

    #[tokio::test]
    async fn test_health_and_unknown_route() {
        let app = app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/v2/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"code": 404, "message": "Not found"}));
    }

    #[tokio::test]
    async fn test_mutations_require_user_header() {
        let app = app();
        let (status, body) = send(&app, "POST", "/v2/inventory/schemas", None, Some(battery())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Please authenticate");
    }

    #[tokio::test]
    async fn test_schema_lifecycle() {
        let app = app();
        let (status, created) =
            send(&app, "POST", "/v2/inventory/schemas", Some("u1"), Some(battery())).await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/v2/inventory/schemas/{}", created["id"].as_str().unwrap());

        let (status, listed) = send(&app, "GET", "/v2/inventory/schemas?search=batt&limit=5", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["totalResults"], 1);
        assert_eq!(listed["limit"], 5);

        let (status, _) = send(&app, "PATCH", &uri, Some("u2"), Some(json!({"name": "Cell"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated) = send(&app, "PATCH", &uri, Some("u1"), Some(json!({"name": "Cell"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Cell");

        let (status, _) = send(&app, "DELETE", &uri, Some("admin"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Schema not found");
    }

    #[tokio::test]
    async fn test_accepts_bodies_past_default_limit() {
        let app = app();
        let definition = json!({
            "type": "object",
            "description": "x".repeat(3 * 1024 * 1024),
        });
        let body = json!({"name": "Large", "schema_definition": definition.to_string()});

        let (status, created) = send(&app, "POST", "/v2/inventory/schemas", Some("u1"), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "Large");
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let app = app();
        let (_, schema) = send(&app, "POST", "/v2/inventory/schemas", Some("u1"), Some(battery())).await;

        let (status, body) = send(
            &app,
            "POST",
            "/v2/inventory/instances",
            Some("u1"),
            Some(json!({"name": "b1", "schema": schema["id"], "data": "{}"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Data validation error"));

        let (status, _) = send(&app, "POST", "/v2/inventory/schemas", Some("u1"), Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/v2/inventory/schemas?page=0", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_change_logs_are_admin_only() {
        let app = app();
        send(&app, "POST", "/v2/inventory/schemas", Some("u1"), Some(battery())).await;

        let (status, _) = send(&app, "GET", "/v2/inventory/change-logs", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/v2/inventory/change-logs", Some("u1"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send(&app, "GET", "/v2/inventory/change-logs?action=CREATE", Some("admin"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["ref_type"], "Schema");
    }

    #[tokio::test]
    async fn test_graphql_requires_user_header() {
        let app = app();
        let query = json!({"query": "{ schemas { totalResults } }"});

        let (status, _) = send(&app, "POST", "/v2/inventory/graphql", None, Some(query.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, "POST", "/v2/inventory/graphql", Some("u1"), Some(query)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["schemas"]["totalResults"], 0);
    }

    #[tokio::test]
    async fn test_docs_only_in_development() {
        let (status, _) = send(&app(), "GET", "/v2/inventory/docs/openapi.json", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let mut ctx = context();
        ctx.config.env = "production".to_string();
        let production = create_router(Arc::new(ctx));
        let (status, _) = send(&production, "GET", "/v2/inventory/docs", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
