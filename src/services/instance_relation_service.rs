use std::collections::HashMap;

use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::logic::check_candidate;
use crate::logic::views::{instance_brief, instance_relation_view, raw_view, relation_brief};
use crate::model::{
    Filter, Id, InstanceRelation, InstanceRelationUpdate, ListOptions, ListQuery,
    NewInstanceRelation, Page, UserContext,
};
use crate::services::{
    page_options, populate_created_by, populate_created_by_one, LimitPolicy,
};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceRelationQuery {
    pub relation: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl InstanceRelationQuery {
    fn list_options(&self) -> ListOptions {
        ListOptions {
            sort_by: self.sort_by.clone(),
            limit: self.limit,
            page: self.page,
        }
    }
}

pub async fn create_instance_relation<S: Store>(
    ctx: &AppContext<S>,
    body: NewInstanceRelation,
    user: &UserContext,
) -> Result<Value, ApiError> {
    let (relation, source, target) = futures::try_join!(
        ctx.store.get_relation(&body.relation),
        ctx.store.get_instance(&body.source),
        ctx.store.get_instance(&body.target),
    )?;

    let relation = relation.ok_or_else(|| {
        ApiError::bad_request(format!("Relation with id {} not found.", body.relation))
    })?;
    let source = source.ok_or_else(|| {
        ApiError::bad_request(format!("Source instance with id {} not found.", body.source))
    })?;
    let target = target.ok_or_else(|| {
        ApiError::bad_request(format!("Target instance with id {} not found.", body.target))
    })?;

    let existing = ctx.store.list_for_relation(&relation.id).await?;
    check_candidate(&relation, &source, &target, &existing)?;

    let edge = InstanceRelation::new(body, user.user_id.clone());
    ctx.store.create_instance_relation(&edge).await?;
    log::info!(
        "Instance relation {} ({} -> {}) created by {}",
        edge.id,
        edge.source,
        edge.target,
        user.user_id
    );

    Ok(raw_view(&edge))
}

pub async fn query_instance_relations<S: Store>(
    ctx: &AppContext<S>,
    params: &InstanceRelationQuery,
) -> Result<Page<Value>, ApiError> {
    let query = ListQuery {
        filter: Filter::new()
            .eq_opt("relation", params.relation.clone())
            .eq_opt("source", params.source.clone())
            .eq_opt("target", params.target.clone()),
        options: page_options(&params.list_options(), &ctx.config.constraints, LimitPolicy::Clamp)?,
    };

    let page = ctx.store.query_instance_relations(&query).await?;

    let relation_ids: Vec<Id> = page.results.iter().map(|e| e.relation.clone()).unique().collect();
    let instance_ids: Vec<Id> = page
        .results
        .iter()
        .flat_map(|e| [e.source.clone(), e.target.clone()])
        .unique()
        .collect();

    let (relations, instances) = futures::try_join!(
        ctx.store.get_relations(&relation_ids),
        ctx.store.get_instances(&instance_ids),
    )?;
    let relations: HashMap<Id, _> = relations.into_iter().map(|r| (r.id.clone(), r)).collect();
    let instances: HashMap<Id, _> = instances.into_iter().map(|i| (i.id.clone(), i)).collect();

    let docs = page
        .results
        .iter()
        .map(|edge| {
            instance_relation_view(
                edge,
                relation_brief(relations.get(&edge.relation)),
                instance_brief(instances.get(&edge.source)),
                instance_brief(instances.get(&edge.target)),
            )
        })
        .collect();
    let docs = populate_created_by(ctx, docs).await?;
    Ok(page.map_results(docs))
}

/// Stored instance relation, or `NotFound`
pub async fn load_instance_relation<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
) -> Result<InstanceRelation, ApiError> {
    ctx.store
        .get_instance_relation(&id.to_string())
        .await?
        .ok_or_else(|| ApiError::not_found("Instance relation not found"))
}

/// Edge with its relation and both instances embedded in full
pub async fn get_instance_relation<S: Store>(ctx: &AppContext<S>, id: &str) -> Result<Value, ApiError> {
    let edge = load_instance_relation(ctx, id).await?;
    let (relation, source, target) = futures::try_join!(
        ctx.store.get_relation(&edge.relation),
        ctx.store.get_instance(&edge.source),
        ctx.store.get_instance(&edge.target),
    )?;

    let doc = instance_relation_view(
        &edge,
        relation.as_ref().map_or(Value::Null, raw_view),
        source.as_ref().map_or(Value::Null, raw_view),
        target.as_ref().map_or(Value::Null, raw_view),
    );
    populate_created_by_one(ctx, doc).await
}

/// Only the creator may change an instance relation
pub async fn is_owner<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<bool, ApiError> {
    let edge = load_instance_relation(ctx, id).await?;
    Ok(user.owns(&edge.created_by))
}

pub async fn update_instance_relation<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    update: InstanceRelationUpdate,
    user: &UserContext,
) -> Result<Value, ApiError> {
    if update.metadata.is_none() {
        return Err(ApiError::bad_request("\"metadata\" is required"));
    }

    let mut edge = load_instance_relation(ctx, id).await?;
    edge.apply(update);
    ctx.store.update_instance_relation(&edge, &user.user_id).await?;
    Ok(raw_view(&edge))
}

pub async fn delete_instance_relation<S: Store>(
    ctx: &AppContext<S>,
    id: &str,
    user: &UserContext,
) -> Result<(), ApiError> {
    let edge = load_instance_relation(ctx, id).await?;
    ctx.store.delete_instance_relation(&edge.id, &user.user_id).await?;
    log::info!("Instance relation {} deleted by {}", edge.id, user.user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Cardinality, Instance, NewInstance, NewRelation, NewSchema, Relation, Schema,
    };
    use crate::services::test_support::context;
    use crate::store::{InstanceStore, MemoryStore, RelationStore, SchemaStore};
    use serde_json::json;

    struct Fixture {
        ctx: AppContext<MemoryStore>,
        relation: Relation,
        a: Vec<Instance>,
        b: Vec<Instance>,
    }

    async fn fixture(source_cardinality: Option<Cardinality>) -> Fixture {
        let ctx = context();
        let mut schemas = Vec::new();
        for name in ["A", "B"] {
            let schema = Schema::new(
                NewSchema {
                    name: name.to_string(),
                    description: None,
                    schema_definition: r#"{"type": "object"}"#.to_string(),
                },
                "u1".to_string(),
            );
            ctx.store.create_schema(&schema).await.unwrap();
            schemas.push(schema);
        }

        let mut instances = Vec::new();
        for (schema, name) in [(0, "a1"), (0, "a2"), (1, "b1"), (1, "b2")] {
            let instance = Instance::new(
                NewInstance {
                    name: name.to_string(),
                    schema: schemas[schema].id.clone(),
                    data: r#"{"n": 1}"#.to_string(),
                },
                "u1".to_string(),
            );
            ctx.store.create_instance(&instance).await.unwrap();
            instances.push(instance);
        }

        let relation = Relation::new(
            NewRelation {
                name: "a-to-b".to_string(),
                relation_type: None,
                description: None,
                source: schemas[0].id.clone(),
                target: schemas[1].id.clone(),
                source_cardinality,
                target_cardinality: None,
                source_role_name: None,
                target_role_name: None,
                is_core: None,
                metadata: None,
            },
            "u1".to_string(),
        );
        ctx.store.create_relation(&relation).await.unwrap();

        let b = instances.split_off(2);
        Fixture {
            ctx,
            relation,
            a: instances,
            b,
        }
    }

    fn link(f: &Fixture, source: &Instance, target: &Instance) -> NewInstanceRelation {
        NewInstanceRelation {
            relation: f.relation.id.clone(),
            source: source.id.clone(),
            target: target.id.clone(),
            metadata: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_one_to_one_source_cardinality() {
        let f = fixture(Some(Cardinality::OneToOne)).await;
        let user = UserContext::new("u1");

        assert!(create_instance_relation(&f.ctx, link(&f, &f.a[0], &f.b[0]), &user).await.is_ok());

        let err = create_instance_relation(&f.ctx, link(&f, &f.a[1], &f.b[0]), &user)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot create this instance relation: violates source cardinality (one-to-one)."
        );

        assert!(create_instance_relation(&f.ctx, link(&f, &f.a[0], &f.b[1]), &user).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_edge_is_rejected() {
        let f = fixture(None).await;
        let user = UserContext::new("u1");

        create_instance_relation(&f.ctx, link(&f, &f.a[0], &f.b[0]), &user).await.unwrap();
        let err = create_instance_relation(&f.ctx, link(&f, &f.a[0], &f.b[0]), &user)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_wrong_schema_and_missing_refs() {
        let f = fixture(None).await;
        let user = UserContext::new("u1");

        let err = create_instance_relation(&f.ctx, link(&f, &f.b[0], &f.b[1]), &user)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Source instance's schema"));

        let mut missing = link(&f, &f.a[0], &f.b[0]);
        missing.target = "ghost".to_string();
        let err = create_instance_relation(&f.ctx, missing, &user).await.unwrap_err();
        assert_eq!(err.to_string(), "Target instance with id ghost not found.");
    }

    #[tokio::test]
    async fn test_views_and_owner_rules() {
        let f = fixture(None).await;
        let created = create_instance_relation(&f.ctx, link(&f, &f.a[0], &f.b[0]), &UserContext::new("u1"))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let page = query_instance_relations(&f.ctx, &InstanceRelationQuery::default())
            .await
            .unwrap();
        assert_eq!(page.results[0]["source"]["name"], "a1");
        assert_eq!(page.results[0]["relation"]["type"], "custom");

        let fetched = get_instance_relation(&f.ctx, id).await.unwrap();
        assert_eq!(fetched["source"]["data"], json!({"n": 1}));
        assert_eq!(fetched["created_by"]["name"], "User u1");

        assert!(is_owner(&f.ctx, id, &UserContext::new("u1")).await.unwrap());
        assert!(!is_owner(&f.ctx, id, &UserContext::new("admin")).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_requires_metadata() {
        let f = fixture(None).await;
        let user = UserContext::new("u1");
        let created = create_instance_relation(&f.ctx, link(&f, &f.a[0], &f.b[0]), &user)
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let update: InstanceRelationUpdate =
            serde_json::from_str(r#"{"description": "x"}"#).unwrap();
        assert!(update_instance_relation(&f.ctx, id, update, &user).await.is_err());

        let update: InstanceRelationUpdate =
            serde_json::from_str(r#"{"metadata": {"qty": 2}}"#).unwrap();
        let updated = update_instance_relation(&f.ctx, id, update, &user).await.unwrap();
        assert_eq!(updated["metadata"]["qty"], 2);
    }
}
