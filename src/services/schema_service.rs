use serde::Deserialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::logic::search_filter::SCHEMA_SEARCH_FIELDS;
use crate::logic::views::{raw_view, schema_view};
use crate::logic::{build_search_filter, validate_schema_definition};
use crate::model::{Filter, ListOptions, ListQuery, NewSchema, Page, Schema, SchemaUpdate, UserContext};
use crate::services::{
    owner_or_admin, page_options, populate_created_by, populate_created_by_one, require_non_empty,
    require_update_fields, LimitPolicy,
};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaQuery {
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl SchemaQuery {
    fn list_options(&self) -> ListOptions {
        ListOptions {
            sort_by: self.sort_by.clone(),
            limit: self.limit,
            page: self.page,
        }
    }
}

pub async fn create_schema<S: Store>(
    ctx: &AppContext<S>,
    body: NewSchema,
    user: &UserContext,
) -> Result<Value, ApiError> {
    require_non_empty("name", &body.name)?;
    validate_schema_definition(&body.schema_definition)?;

    let schema = Schema::new(body, user.user_id.clone());
    ctx.store.create_schema(&schema).await?;
    log::info!("Schema {} created by {}", schema.id, user.user_id);

    Ok(raw_view(&schema))
}

pub async fn query_schemas<S: Store>(
    ctx: &AppContext<S>,
    params: &SchemaQuery,
) -> Result<Page<Value>, ApiError> {
    let base = Filter::new()
        .eq_opt("name", params.name.clone())
        .eq_opt("created_by", params.created_by.clone());
    let query = ListQuery {
        filter: build_search_filter(base, params.search.as_deref(), SCHEMA_SEARCH_FIELDS),
        options: page_options(&params.list_options(), &ctx.config.constraints, LimitPolicy::Clamp)?,
    };

    let page = ctx.store.query_schemas(&query).await?;
    let docs = page.results.iter().map(schema_view).collect();
    let docs = populate_created_by(ctx, docs).await?;
    Ok(page.map_results(docs))
}

/// Stored schema, or `NotFound`
pub async fn load_schema<S: Store>(ctx: &AppContext<S>, id: &str) -> Result<Schema, ApiError> {
    ctx.store
        .get_schema(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::not_found("Schema not found"))
}

pub async fn get_schema<S: Store>(ctx: &AppContext<S>, id: &str) -> Result<Value, ApiError> {
    let schema = load_schema(ctx, id).await?;
    populate_created_by_one(ctx, schema_view(&schema)).await
}

pub async fn is_writer<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<bool, ApiError> {
    let schema = load_schema(ctx, id).await?;
    owner_or_admin(ctx, &schema.created_by, user).await
}

pub async fn update_schema<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    update: SchemaUpdate,
    user: &UserContext,
) -> Result<Value, ApiError> {
    require_update_fields(update.is_empty())?;
    if let Some(name) = &update.name {
        require_non_empty("name", name)?;
    }

    let mut schema = load_schema(ctx, id).await?;
    if let Some(definition) = &update.schema_definition {
        validate_schema_definition(definition)?;
    }

    schema.apply(update);
    ctx.store.update_schema(&schema, &user.user_id).await?;
    Ok(raw_view(&schema))
}

pub async fn delete_schema<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<(), ApiError> {
    let schema = load_schema(ctx, id).await?;
    ctx.store.delete_schema(&schema.id, &user.user_id).await?;
    log::info!("Schema {} deleted by {}", schema.id, user.user_id);
    Ok(())
}
