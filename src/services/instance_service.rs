use std::collections::HashMap;

use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::logic::search_filter::INSTANCE_SEARCH_FIELDS;
use crate::logic::views::{instance_view, raw_view, schema_ref, schema_view};
use crate::logic::{build_search_filter, validate_data_against_schema};
use crate::model::{
    Filter, Id, Instance, InstanceUpdate, ListOptions, ListQuery, NewInstance, Page, UserContext,
};
use crate::services::{
    owner_or_admin, page_options, populate_created_by, populate_created_by_one, require_non_empty,
    require_update_fields, LimitPolicy,
};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceQuery {
    pub name: Option<String>,
    pub schema: Option<String>,
    pub created_by: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl InstanceQuery {
    fn list_options(&self) -> ListOptions {
        ListOptions {
            sort_by: self.sort_by.clone(),
            limit: self.limit,
            page: self.page,
        }
    }
}

pub async fn create_instance<S: Store>(
    ctx: &AppContext<S>,
    body: NewInstance,
    user: &UserContext,
) -> Result<Value, ApiError> {
    require_non_empty("name", &body.name)?;
    validate_data_against_schema(ctx.store.as_ref(), &body.schema, &body.data).await?;

    let instance = Instance::new(body, user.user_id.clone());
    ctx.store.create_instance(&instance).await?;
    log::info!("Instance {} created by {}", instance.id, user.user_id);

    Ok(raw_view(&instance))
}

pub async fn query_instances<S: Store>(
    ctx: &AppContext<S>,
    params: &InstanceQuery,
) -> Result<Page<Value>, ApiError> {
    let base = Filter::new()
        .eq_opt("name", params.name.clone())
        .eq_opt("schema", params.schema.clone())
        .eq_opt("created_by", params.created_by.clone());
    let query = ListQuery {
        filter: build_search_filter(base, params.search.as_deref(), INSTANCE_SEARCH_FIELDS),
        options: page_options(&params.list_options(), &ctx.config.constraints, LimitPolicy::Clamp)?,
    };

    let page = ctx.store.query_instances(&query).await?;

    let schema_ids: Vec<Id> = page.results.iter().map(|i| i.schema.clone()).unique().collect();
    let schemas: HashMap<Id, _> = ctx
        .store
        .get_schemas(&schema_ids)
        .await?
        .into_iter()
        .map(|schema| (schema.id.clone(), schema))
        .collect();

    let docs = page
        .results
        .iter()
        .map(|instance| instance_view(instance, schema_ref(schemas.get(&instance.schema))))
        .collect();
    let docs = populate_created_by(ctx, docs).await?;
    Ok(page.map_results(docs))
}

/// Stored instance, or `NotFound`
pub async fn load_instance<S: Store>(ctx: &AppContext<S>, id: &str) -> Result<Instance, ApiError> {
    ctx.store
        .get_instance(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::not_found("Instance not found"))
}

/// Instance with its full schema embedded
pub async fn get_instance<S: Store>(ctx: &AppContext<S>, id: &str) -> Result<Value, ApiError> {
    let instance = load_instance(ctx, id).await?;
    let schema = ctx
        .store
        .get_schema(&instance.schema)
        .await?
        .ok_or_else(|| ApiError::not_found("Schema for instance not found"))?;

    populate_created_by_one(ctx, instance_view(&instance, schema_view(&schema))).await
}

pub async fn is_writer<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<bool, ApiError> {
    let instance = load_instance(ctx, id).await?;
    owner_or_admin(ctx, &instance.created_by, user).await
}

pub async fn update_instance<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    update: InstanceUpdate,
    user: &UserContext,
) -> Result<Value, ApiError> {
    require_update_fields(update.is_empty())?;
    if let Some(name) = &update.name {
        require_non_empty("name", name)?;
    }

    let mut instance = load_instance(ctx, id).await?;
    if let Some(data) = &update.data {
        validate_data_against_schema(ctx.store.as_ref(), &instance.schema, data).await?;
    }

    instance.apply(update);
    ctx.store.update_instance(&instance, &user.user_id).await?;
    Ok(raw_view(&instance))
}

pub async fn delete_instance<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<(), ApiError> {
    let instance = load_instance(ctx, id).await?;
    ctx.store.delete_instance(&instance.id, &user.user_id).await?;
    log::info!("Instance {} deleted by {}", instance.id, user.user_id);
    Ok(())
}
