use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;

use crate::api::extract::{ApiJson, ApiQuery};
use crate::context::AppState;
use crate::error::ApiError;
use crate::model::{
    InstanceRelationUpdate, NewInstanceRelation, NewRelation, Page, RelationUpdate, UserContext,
};
use crate::services::instance_relation_service::{self, InstanceRelationQuery};
use crate::services::relation_service::{self, RelationQuery};
use crate::store::Store;

// Relation handlers
pub async fn create_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    ApiJson(body): ApiJson<NewRelation>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let relation = relation_service::create_relation(&ctx, body, &user).await?;
    Ok((StatusCode::CREATED, Json(relation)))
}

pub async fn list_relations<S: Store>(
    State(ctx): State<AppState<S>>,
    ApiQuery(query): ApiQuery<RelationQuery>,
) -> Result<Json<Page<Value>>, ApiError> {
    Ok(Json(relation_service::query_relations(&ctx, &query).await?))
}

pub async fn get_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(relation_service::get_relation(&ctx, &id).await?))
}

pub async fn update_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RelationUpdate>,
) -> Result<Json<Value>, ApiError> {
    if !relation_service::is_writer(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to update this relation",
        ));
    }
    Ok(Json(relation_service::update_relation(&ctx, &id, body, &user).await?))
}

pub async fn delete_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !relation_service::is_writer(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to delete this relation",
        ));
    }
    relation_service::delete_relation(&ctx, &id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Instance relation handlers
pub async fn create_instance_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    ApiJson(body): ApiJson<NewInstanceRelation>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let edge = instance_relation_service::create_instance_relation(&ctx, body, &user).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

pub async fn list_instance_relations<S: Store>(
    State(ctx): State<AppState<S>>,
    ApiQuery(query): ApiQuery<InstanceRelationQuery>,
) -> Result<Json<Page<Value>>, ApiError> {
    Ok(Json(
        instance_relation_service::query_instance_relations(&ctx, &query).await?,
    ))
}

pub async fn get_instance_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(
        instance_relation_service::get_instance_relation(&ctx, &id).await?,
    ))
}

pub async fn update_instance_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<InstanceRelationUpdate>,
) -> Result<Json<Value>, ApiError> {
    if !instance_relation_service::is_owner(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to update this instance relation",
        ));
    }
    Ok(Json(
        instance_relation_service::update_instance_relation(&ctx, &id, body, &user).await?,
    ))
}

pub async fn delete_instance_relation<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !instance_relation_service::is_owner(&ctx, &id, &user).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to delete this instance relation",
        ));
    }
    instance_relation_service::delete_instance_relation(&ctx, &id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
