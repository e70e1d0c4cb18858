use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::api::extract::{ApiJson, ApiQuery};
use crate::context::AppState;
use crate::error::ApiError;
use crate::model::{InstanceUpdate, NewInstance, NewSchema, Page, SchemaUpdate, UserContext};
use crate::services::instance_service::{self, InstanceQuery};
use crate::services::schema_service::{self, SchemaQuery};
use crate::store::Store;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

// Schema handlers
pub async fn create_schema<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    ApiJson(body): ApiJson<NewSchema>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let schema = schema_service::create_schema(&ctx, body, &user).await?;
    Ok((StatusCode::CREATED, Json(schema)))
}

pub async fn list_schemas<S: Store>(
    State(ctx): State<AppState<S>>,
    ApiQuery(query): ApiQuery<SchemaQuery>,
) -> Result<Json<Page<Value>>, ApiError> {
    Ok(Json(schema_service::query_schemas(&ctx, &query).await?))
}

pub async fn get_schema<S: Store>(
    State(ctx): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(schema_service::get_schema(&ctx, &id).await?))
}

pub async fn update_schema<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SchemaUpdate>,
) -> Result<Json<Value>, ApiError> {
    if !schema_service::is_writer(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to update this schema",
        ));
    }
    Ok(Json(schema_service::update_schema(&ctx, &id, body, &user).await?))
}

pub async fn delete_schema<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !schema_service::is_writer(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to delete this schema",
        ));
    }
    schema_service::delete_schema(&ctx, &id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Instance handlers
pub async fn create_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    ApiJson(body): ApiJson<NewInstance>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let instance = instance_service::create_instance(&ctx, body, &user).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn list_instances<S: Store>(
    State(ctx): State<AppState<S>>,
    ApiQuery(query): ApiQuery<InstanceQuery>,
) -> Result<Json<Page<Value>>, ApiError> {
    Ok(Json(instance_service::query_instances(&ctx, &query).await?))
}

pub async fn get_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(instance_service::get_instance(&ctx, &id).await?))
}

pub async fn update_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<InstanceUpdate>,
) -> Result<Json<Value>, ApiError> {
    if !instance_service::is_writer(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to update this instance",
        ));
    }
    Ok(Json(instance_service::update_instance(&ctx, &id, body, &user).await?))
}

pub async fn delete_instance<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !instance_service::is_writer(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to delete this instance",
        ));
    }
    instance_service::delete_instance(&ctx, &id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
