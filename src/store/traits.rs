use crate::model::{
    ChangeLog, Id, Instance, InstanceRelation, ListQuery, Page, Relation, Schema,
};
use anyhow::Result;

/// Every mutating method appends to the change log with `actor` as
/// `created_by`. Deletes cascade and log each removed row.
#[async_trait::async_trait]
pub trait SchemaStore: Send + Sync {
    async fn get_schema(&self, id: &Id) -> Result<Option<Schema>>;
    async fn get_schemas(&self, ids: &[Id]) -> Result<Vec<Schema>>;
    async fn query_schemas(&self, query: &ListQuery) -> Result<Page<Schema>>;
    async fn create_schema(&self, schema: &Schema) -> Result<()>;
    async fn update_schema(&self, schema: &Schema, actor: &str) -> Result<()>;
    /// Removes the schema, its instances and every relation referencing it
    async fn delete_schema(&self, id: &Id, actor: &str) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(&self, id: &Id) -> Result<Option<Instance>>;
    async fn get_instances(&self, ids: &[Id]) -> Result<Vec<Instance>>;
    async fn query_instances(&self, query: &ListQuery) -> Result<Page<Instance>>;
    async fn create_instance(&self, instance: &Instance) -> Result<()>;
    async fn update_instance(&self, instance: &Instance, actor: &str) -> Result<()>;
    /// Removes the instance and every instance relation touching it
    async fn delete_instance(&self, id: &Id, actor: &str) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait RelationStore: Send + Sync {
    async fn get_relation(&self, id: &Id) -> Result<Option<Relation>>;
    async fn get_relations(&self, ids: &[Id]) -> Result<Vec<Relation>>;
    async fn query_relations(&self, query: &ListQuery) -> Result<Page<Relation>>;
    async fn find_relation(
        &self,
        source: &Id,
        target: &Id,
        relation_type: &str,
    ) -> Result<Option<Relation>>;
    /// Fails when `(source, target, type)` is already taken
    async fn create_relation(&self, relation: &Relation) -> Result<()>;
    async fn update_relation(&self, relation: &Relation, actor: &str) -> Result<()>;
    /// Removes the relation and its instance relations
    async fn delete_relation(&self, id: &Id, actor: &str) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait InstanceRelationStore: Send + Sync {
    async fn get_instance_relation(&self, id: &Id) -> Result<Option<InstanceRelation>>;
    async fn query_instance_relations(&self, query: &ListQuery) -> Result<Page<InstanceRelation>>;
    /// All edges stored under one relation definition
    async fn list_for_relation(&self, relation_id: &Id) -> Result<Vec<InstanceRelation>>;
    /// Fails when `(source, target, relation)` is already taken
    async fn create_instance_relation(&self, edge: &InstanceRelation) -> Result<()>;
    async fn update_instance_relation(&self, edge: &InstanceRelation, actor: &str) -> Result<()>;
    async fn delete_instance_relation(&self, id: &Id, actor: &str) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait ChangeLogStore: Send + Sync {
    async fn query_change_logs(&self, query: &ListQuery) -> Result<Page<ChangeLog>>;
}

pub trait Store:
    SchemaStore + InstanceStore + RelationStore + InstanceRelationStore + ChangeLogStore + Send + Sync + 'static
{
}
