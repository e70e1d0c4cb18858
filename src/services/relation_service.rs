use std::collections::HashMap;

use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::logic::search_filter::RELATION_SEARCH_FIELDS;
use crate::logic::views::{raw_view, relation_view, schema_ref, schema_view};
use crate::logic::build_search_filter;
use crate::model::{
    Cardinality, Filter, Id, ListOptions, ListQuery, NewRelation, Page, Relation, RelationUpdate,
    UserContext,
};
use crate::services::{
    owner_or_admin, page_options, populate_created_by, populate_created_by_one, require_non_empty,
    require_update_fields, LimitPolicy,
};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationQuery {
    pub name: Option<String>,
    pub source_role_name: Option<String>,
    pub target_role_name: Option<String>,
    pub is_core: Option<bool>,
    pub source_cardinality: Option<Cardinality>,
    pub target_cardinality: Option<Cardinality>,
    #[serde(rename = "type")]
    pub relation_type: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub created_by: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl RelationQuery {
    fn list_options(&self) -> ListOptions {
        ListOptions {
            sort_by: self.sort_by.clone(),
            limit: self.limit,
            page: self.page,
        }
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .eq_opt("name", self.name.clone())
            .eq_opt("source_role_name", self.source_role_name.clone())
            .eq_opt("target_role_name", self.target_role_name.clone())
            .eq_opt("is_core", self.is_core)
            .eq_opt("source_cardinality", self.source_cardinality.map(|c| c.as_str()))
            .eq_opt("target_cardinality", self.target_cardinality.map(|c| c.as_str()))
            .eq_opt("type", self.relation_type.clone())
            .eq_opt("source", self.source.clone())
            .eq_opt("target", self.target.clone())
            .eq_opt("created_by", self.created_by.clone())
    }
}

/// Both endpoint schemas must exist; a self-referencing relation checks once
async fn check_schemas_exist<S: Store>(
    ctx: &AppContext<S>,
    source: &Id,
    target: &Id,
) -> Result<(), ApiError> {
    if ctx.store.get_schema(source).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Source schema with id {} not found",
            source
        )));
    }
    if source != target && ctx.store.get_schema(target).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Target schema with id {} not found",
            target
        )));
    }
    Ok(())
}

pub async fn create_relation<S: Store>(
    ctx: &AppContext<S>,
    body: NewRelation,
    user: &UserContext,
) -> Result<Value, ApiError> {
    require_non_empty("name", &body.name)?;
    check_schemas_exist(ctx, &body.source, &body.target).await?;

    let relation = Relation::new(body, user.user_id.clone());
    let existing = ctx
        .store
        .find_relation(&relation.source, &relation.target, &relation.relation_type)
        .await?;
    if existing.is_some() {
        return Err(ApiError::bad_request(
            "Relation of this type between these schemas already exists",
        ));
    }

    ctx.store.create_relation(&relation).await?;
    log::info!(
        "Relation {} ({}) created by {}",
        relation.id,
        relation.relation_type,
        user.user_id
    );

    Ok(raw_view(&relation))
}

pub async fn query_relations<S: Store>(
    ctx: &AppContext<S>,
    params: &RelationQuery,
) -> Result<Page<Value>, ApiError> {
    let query = ListQuery {
        filter: build_search_filter(params.filter(), params.search.as_deref(), RELATION_SEARCH_FIELDS),
        options: page_options(&params.list_options(), &ctx.config.constraints, LimitPolicy::Clamp)?,
    };

    let page = ctx.store.query_relations(&query).await?;

    let schema_ids: Vec<Id> = page
        .results
        .iter()
        .flat_map(|r| [r.source.clone(), r.target.clone()])
        .unique()
        .collect();
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
        .map(|relation| {
            relation_view(
                relation,
                schema_ref(schemas.get(&relation.source)),
                schema_ref(schemas.get(&relation.target)),
            )
        })
        .collect();
    let docs = populate_created_by(ctx, docs).await?;
    Ok(page.map_results(docs))
}

/// Stored relation, or `NotFound`
pub async fn load_relation<S: Store>(ctx: &AppContext<S>, id: &str) -> Result<Relation, ApiError> {
    ctx.store
        .get_relation(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::not_found("Relation not found"))
}

/// Relation with both endpoint schemas embedded in full
pub async fn get_relation<S: Store>(ctx: &AppContext<S>, id: &str) -> Result<Value, ApiError> {
    let relation = load_relation(ctx, id).await?;
    let source = ctx.store.get_schema(&relation.source).await?;
    let target = ctx.store.get_schema(&relation.target).await?;

    let doc = relation_view(
        &relation,
        source.as_ref().map_or(Value::Null, schema_view),
        target.as_ref().map_or(Value::Null, schema_view),
    );
    populate_created_by_one(ctx, doc).await
}

pub async fn is_writer<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<bool, ApiError> {
    let relation = load_relation(ctx, id).await?;
    owner_or_admin(ctx, &relation.created_by, user).await
}

pub async fn update_relation<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    update: RelationUpdate,
    user: &UserContext,
) -> Result<Value, ApiError> {
    require_update_fields(update.is_empty())?;
    let mut relation = load_relation(ctx, id).await?;

    if update.touches_identity() {
        return Err(ApiError::bad_request(
            "Updating source, target, or type is not recommended. Delete and recreate if needed.",
        ));
    }
    if let Some(name) = &update.name {
        require_non_empty("name", name)?;
    }

    relation.apply(update);
    ctx.store.update_relation(&relation, &user.user_id).await?;
    Ok(raw_view(&relation))
}

pub async fn delete_relation<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<(), ApiError> {
    let relation = load_relation(ctx, id).await?;
    ctx.store.delete_relation(&relation.id, &user.user_id).await?;
    log::info!("Relation {} deleted by {}", relation.id, user.user_id);
    Ok(())
}
