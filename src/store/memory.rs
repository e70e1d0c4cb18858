use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{bail, Result};
use chrono::DateTime;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::model::{
    ChangeAction, ChangeLog, Id, Instance, InstanceRelation, ListQuery, Page, RefType, Relation,
    Schema, SortKey,
};
use crate::store::traits::{
    ChangeLogStore, InstanceRelationStore, InstanceStore, RelationStore, SchemaStore, Store,
};

const DUPLICATE_KEY: &str = "duplicate key value violates unique constraint";

/// Change log entries with a running byte total; oldest entries go first
#[derive(Debug)]
struct ChangeLogBuffer {
    entries: VecDeque<(ChangeLog, usize)>,
    total_bytes: usize,
    cap_bytes: usize,
}

impl ChangeLogBuffer {
    fn new(cap_bytes: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            total_bytes: 0,
            cap_bytes,
        }
    }

    fn push(&mut self, entry: ChangeLog) {
        let size = entry.stored_size();
        self.entries.push_back((entry, size));
        self.total_bytes += size;

        while self.total_bytes > self.cap_bytes {
            match self.entries.pop_front() {
                Some((_, evicted)) => self.total_bytes -= evicted,
                None => break,
            }
        }
    }
}

#[derive(Debug)]
struct Tables {
    schemas: HashMap<Id, Schema>,
    instances: HashMap<Id, Instance>,
    relations: HashMap<Id, Relation>,
    instance_relations: HashMap<Id, InstanceRelation>,
    change_log: ChangeLogBuffer,
}

impl Tables {
    fn log(
        &mut self,
        ref_type: RefType,
        ref_id: &str,
        action: ChangeAction,
        actor: &str,
        description: Option<String>,
    ) {
        self.change_log
            .push(ChangeLog::record(ref_type, ref_id, action, actor, description));
    }

    fn remove_instance_relations(&mut self, ids: &[Id], actor: &str) {
        for id in ids {
            if let Some(edge) = self.instance_relations.remove(id) {
                self.log(
                    RefType::InstanceRelation,
                    &edge.id,
                    ChangeAction::Delete,
                    actor,
                    edge.description.clone(),
                );
            }
        }
    }

    fn remove_instance(&mut self, id: &Id, actor: &str) -> bool {
        let edges: Vec<Id> = self
            .instance_relations
            .values()
            .filter(|edge| &edge.source == id || &edge.target == id)
            .map(|edge| edge.id.clone())
            .collect();
        self.remove_instance_relations(&edges, actor);

        match self.instances.remove(id) {
            Some(instance) => {
                self.log(
                    RefType::Instance,
                    &instance.id,
                    ChangeAction::Delete,
                    actor,
                    Some(instance.name),
                );
                true
            }
            None => false,
        }
    }

    fn remove_relation(&mut self, id: &Id, actor: &str) -> bool {
        let edges: Vec<Id> = self
            .instance_relations
            .values()
            .filter(|edge| &edge.relation == id)
            .map(|edge| edge.id.clone())
            .collect();
        self.remove_instance_relations(&edges, actor);

        match self.relations.remove(id) {
            Some(relation) => {
                self.log(
                    RefType::Relation,
                    &relation.id,
                    ChangeAction::Delete,
                    actor,
                    Some(relation.name),
                );
                true
            }
            None => false,
        }
    }
}

/// In-process store used by tests and the `memory` backend
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new(change_log_cap_bytes: usize) -> Self {
        Self {
            tables: RwLock::new(Tables {
                schemas: HashMap::new(),
                instances: HashMap::new(),
                relations: HashMap::new(),
                instance_relations: HashMap::new(),
                change_log: ChangeLogBuffer::new(change_log_cap_bytes),
            }),
        }
    }

    pub fn change_log_len(&self) -> usize {
        self.tables.read().change_log.entries.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(100 * 1024 * 1024)
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

fn compare_docs(a: &Value, b: &Value, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ordering = compare_values(a.get(&key.field), b.get(&key.field));
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Filter, sort and paginate documents by their serialized API form
fn query_docs<'a, T, I>(items: I, query: &ListQuery) -> Result<Page<T>>
where
    T: Serialize + Clone + 'a,
    I: Iterator<Item = &'a T>,
{
    let mut matched = Vec::new();
    for item in items {
        let doc = serde_json::to_value(item)?;
        if query.filter.matches(&doc) {
            matched.push((doc, item.clone()));
        }
    }

    matched.sort_by(|(a, _), (b, _)| compare_docs(a, b, &query.options.sort));

    let total = matched.len() as u64;
    let offset = usize::try_from(query.options.offset()).unwrap_or(usize::MAX);
    let results = matched
        .into_iter()
        .skip(offset)
        .take(query.options.limit as usize)
        .map(|(_, item)| item)
        .collect();

    Ok(Page::new(results, &query.options, total))
}

fn pick<T: Clone>(table: &HashMap<Id, T>, ids: &[Id]) -> Vec<T> {
    let wanted: HashSet<&Id> = ids.iter().collect();
    table
        .iter()
        .filter(|(id, _)| wanted.contains(id))
        .map(|(_, item)| item.clone())
        .collect()
}

#[async_trait::async_trait]
impl SchemaStore for MemoryStore {
    async fn get_schema(&self, id: &Id) -> Result<Option<Schema>> {
        Ok(self.tables.read().schemas.get(id).cloned())
    }

    async fn get_schemas(&self, ids: &[Id]) -> Result<Vec<Schema>> {
        Ok(pick(&self.tables.read().schemas, ids))
    }

    async fn query_schemas(&self, query: &ListQuery) -> Result<Page<Schema>> {
        query_docs(self.tables.read().schemas.values(), query)
    }

    async fn create_schema(&self, schema: &Schema) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.schemas.contains_key(&schema.id) {
            bail!("{} \"schemas_pkey\"", DUPLICATE_KEY);
        }
        tables.schemas.insert(schema.id.clone(), schema.clone());
        tables.log(
            RefType::Schema,
            &schema.id,
            ChangeAction::Create,
            &schema.created_by,
            Some(schema.name.clone()),
        );
        Ok(())
    }

    async fn update_schema(&self, schema: &Schema, actor: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(slot) = tables.schemas.get_mut(&schema.id) else {
            bail!("Schema {} does not exist", schema.id);
        };
        *slot = schema.clone();
        tables.log(
            RefType::Schema,
            &schema.id,
            ChangeAction::Update,
            actor,
            Some(schema.name.clone()),
        );
        Ok(())
    }

    async fn delete_schema(&self, id: &Id, actor: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        if !tables.schemas.contains_key(id) {
            return Ok(false);
        }

        let relations: Vec<Id> = tables
            .relations
            .values()
            .filter(|relation| &relation.source == id || &relation.target == id)
            .map(|relation| relation.id.clone())
            .collect();
        for relation_id in &relations {
            tables.remove_relation(relation_id, actor);
        }

        let instances: Vec<Id> = tables
            .instances
            .values()
            .filter(|instance| &instance.schema == id)
            .map(|instance| instance.id.clone())
            .collect();
        for instance_id in &instances {
            tables.remove_instance(instance_id, actor);
        }

        if let Some(schema) = tables.schemas.remove(id) {
            tables.log(
                RefType::Schema,
                &schema.id,
                ChangeAction::Delete,
                actor,
                Some(schema.name),
            );
        }
        Ok(true)
    }
}

#[async_trait::async_trait]
impl InstanceStore for MemoryStore {
    async fn get_instance(&self, id: &Id) -> Result<Option<Instance>> {
        Ok(self.tables.read().instances.get(id).cloned())
    }

    async fn get_instances(&self, ids: &[Id]) -> Result<Vec<Instance>> {
        Ok(pick(&self.tables.read().instances, ids))
    }

    async fn query_instances(&self, query: &ListQuery) -> Result<Page<Instance>> {
        query_docs(self.tables.read().instances.values(), query)
    }

    async fn create_instance(&self, instance: &Instance) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.instances.contains_key(&instance.id) {
            bail!("{} \"instances_pkey\"", DUPLICATE_KEY);
        }
        if !tables.schemas.contains_key(&instance.schema) {
            bail!("Schema {} does not exist", instance.schema);
        }
        tables.instances.insert(instance.id.clone(), instance.clone());
        tables.log(
            RefType::Instance,
            &instance.id,
            ChangeAction::Create,
            &instance.created_by,
            Some(instance.name.clone()),
        );
        Ok(())
    }

    async fn update_instance(&self, instance: &Instance, actor: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(slot) = tables.instances.get_mut(&instance.id) else {
            bail!("Instance {} does not exist", instance.id);
        };
        *slot = instance.clone();
        tables.log(
            RefType::Instance,
            &instance.id,
            ChangeAction::Update,
            actor,
            Some(instance.name.clone()),
        );
        Ok(())
    }

    async fn delete_instance(&self, id: &Id, actor: &str) -> Result<bool> {
        Ok(self.tables.write().remove_instance(id, actor))
    }
}

#[async_trait::async_trait]
impl RelationStore for MemoryStore {
    async fn get_relation(&self, id: &Id) -> Result<Option<Relation>> {
        Ok(self.tables.read().relations.get(id).cloned())
    }

    async fn get_relations(&self, ids: &[Id]) -> Result<Vec<Relation>> {
        Ok(pick(&self.tables.read().relations, ids))
    }

    async fn query_relations(&self, query: &ListQuery) -> Result<Page<Relation>> {
        query_docs(self.tables.read().relations.values(), query)
    }

    async fn find_relation(
        &self,
        source: &Id,
        target: &Id,
        relation_type: &str,
    ) -> Result<Option<Relation>> {
        Ok(self
            .tables
            .read()
            .relations
            .values()
            .find(|r| &r.source == source && &r.target == target && r.relation_type == relation_type)
            .cloned())
    }

    async fn create_relation(&self, relation: &Relation) -> Result<()> {
        let mut tables = self.tables.write();
        let taken = tables.relations.values().any(|r| {
            r.id == relation.id
                || (r.source == relation.source
                    && r.target == relation.target
                    && r.relation_type == relation.relation_type)
        });
        if taken {
            bail!("{} \"relations_source_target_type_key\"", DUPLICATE_KEY);
        }
        tables.relations.insert(relation.id.clone(), relation.clone());
        tables.log(
            RefType::Relation,
            &relation.id,
            ChangeAction::Create,
            &relation.created_by,
            Some(relation.name.clone()),
        );
        Ok(())
    }

    async fn update_relation(&self, relation: &Relation, actor: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(slot) = tables.relations.get_mut(&relation.id) else {
            bail!("Relation {} does not exist", relation.id);
        };
        *slot = relation.clone();
        tables.log(
            RefType::Relation,
            &relation.id,
            ChangeAction::Update,
            actor,
            Some(relation.name.clone()),
        );
        Ok(())
    }

    async fn delete_relation(&self, id: &Id, actor: &str) -> Result<bool> {
        Ok(self.tables.write().remove_relation(id, actor))
    }
}

#[async_trait::async_trait]
impl InstanceRelationStore for MemoryStore {
    async fn get_instance_relation(&self, id: &Id) -> Result<Option<InstanceRelation>> {
        Ok(self.tables.read().instance_relations.get(id).cloned())
    }

    async fn query_instance_relations(&self, query: &ListQuery) -> Result<Page<InstanceRelation>> {
        query_docs(self.tables.read().instance_relations.values(), query)
    }

    async fn list_for_relation(&self, relation_id: &Id) -> Result<Vec<InstanceRelation>> {
        Ok(self
            .tables
            .read()
            .instance_relations
            .values()
            .filter(|edge| &edge.relation == relation_id)
            .cloned()
            .collect())
    }

    async fn create_instance_relation(&self, edge: &InstanceRelation) -> Result<()> {
        let mut tables = self.tables.write();
        let taken = tables.instance_relations.values().any(|existing| {
            existing.id == edge.id
                || (existing.relation == edge.relation && existing.links(&edge.source, &edge.target))
        });
        if taken {
            bail!("{} \"instance_relations_source_target_relation_key\"", DUPLICATE_KEY);
        }
        tables.instance_relations.insert(edge.id.clone(), edge.clone());
        tables.log(
            RefType::InstanceRelation,
            &edge.id,
            ChangeAction::Create,
            &edge.created_by,
            edge.description.clone(),
        );
        Ok(())
    }

    async fn update_instance_relation(&self, edge: &InstanceRelation, actor: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(slot) = tables.instance_relations.get_mut(&edge.id) else {
            bail!("Instance relation {} does not exist", edge.id);
        };
        *slot = edge.clone();
        tables.log(
            RefType::InstanceRelation,
            &edge.id,
            ChangeAction::Update,
            actor,
            edge.description.clone(),
        );
        Ok(())
    }

    async fn delete_instance_relation(&self, id: &Id, actor: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        let existed = tables.instance_relations.contains_key(id);
        tables.remove_instance_relations(std::slice::from_ref(id), actor);
        Ok(existed)
    }
}

#[async_trait::async_trait]
impl ChangeLogStore for MemoryStore {
    async fn query_change_logs(&self, query: &ListQuery) -> Result<Page<ChangeLog>> {
        let tables = self.tables.read();
        query_docs(tables.change_log.entries.iter().map(|(entry, _)| entry), query)
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Filter, NewInstance, NewInstanceRelation, NewRelation, NewSchema, PageOptions,
    };

    fn schema(name: &str) -> Schema {
        Schema::new(
            NewSchema {
                name: name.to_string(),
                description: None,
                schema_definition: r#"{"type": "object"}"#.to_string(),
            },
            "u1".to_string(),
        )
    }

    fn instance(schema: &Schema, name: &str) -> Instance {
        Instance::new(
            NewInstance {
                name: name.to_string(),
                schema: schema.id.clone(),
                data: "{}".to_string(),
            },
            "u1".to_string(),
        )
    }

    fn relation(source: &Schema, target: &Schema) -> Relation {
        Relation::new(
            NewRelation {
                name: "uses".to_string(),
                relation_type: None,
                description: None,
                source: source.id.clone(),
                target: target.id.clone(),
                source_cardinality: None,
                target_cardinality: None,
                source_role_name: None,
                target_role_name: None,
                is_core: None,
                metadata: None,
            },
            "u1".to_string(),
        )
    }

    fn edge(relation: &Relation, source: &Instance, target: &Instance) -> InstanceRelation {
        InstanceRelation::new(
            NewInstanceRelation {
                relation: relation.id.clone(),
                source: source.id.clone(),
                target: target.id.clone(),
                metadata: None,
                description: None,
            },
            "u1".to_string(),
        )
    }

    fn all() -> ListQuery {
        ListQuery {
            filter: Filter::new(),
            options: PageOptions {
                limit: 100,
                ..PageOptions::default()
            },
        }
    }

    #[tokio::test]
    async fn test_duplicate_relation_key_is_rejected() {
        let store = MemoryStore::default();
        let (a, b) = (schema("A"), schema("B"));
        store.create_schema(&a).await.unwrap();
        store.create_schema(&b).await.unwrap();

        store.create_relation(&relation(&a, &b)).await.unwrap();
        let err = store.create_relation(&relation(&a, &b)).await.unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[tokio::test]
    async fn test_duplicate_instance_relation_key_is_rejected() {
        let store = MemoryStore::default();
        let (a, b) = (schema("A"), schema("B"));
        store.create_schema(&a).await.unwrap();
        store.create_schema(&b).await.unwrap();
        let (a1, b1) = (instance(&a, "a1"), instance(&b, "b1"));
        store.create_instance(&a1).await.unwrap();
        store.create_instance(&b1).await.unwrap();
        let rel = relation(&a, &b);
        store.create_relation(&rel).await.unwrap();

        let first = edge(&rel, &a1, &b1);
        let second = edge(&rel, &a1, &b1);
        assert_ne!(first.id, second.id);

        store.create_instance_relation(&first).await.unwrap();
        let err = store.create_instance_relation(&second).await.unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
        assert_eq!(store.list_for_relation(&rel.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_schema_cascades() {
        let store = MemoryStore::default();
        let (a, b) = (schema("A"), schema("B"));
        store.create_schema(&a).await.unwrap();
        store.create_schema(&b).await.unwrap();

        let (a1, b1) = (instance(&a, "a1"), instance(&b, "b1"));
        store.create_instance(&a1).await.unwrap();
        store.create_instance(&b1).await.unwrap();

        let rel = relation(&a, &b);
        store.create_relation(&rel).await.unwrap();
        store.create_instance_relation(&edge(&rel, &a1, &b1)).await.unwrap();

        assert!(store.delete_schema(&a.id, "u1").await.unwrap());

        assert!(store.get_instance(&a1.id).await.unwrap().is_none());
        assert!(store.get_relation(&rel.id).await.unwrap().is_none());
        assert!(store.list_for_relation(&rel.id).await.unwrap().is_empty());
        assert!(store.get_instance(&b1.id).await.unwrap().is_some());

        let deletes = store
            .query_change_logs(&ListQuery {
                filter: Filter::new().eq("action", "DELETE"),
                ..all()
            })
            .await
            .unwrap();
        assert_eq!(deletes.total_results, 4);
    }

    #[tokio::test]
    async fn test_deleting_instance_removes_its_edges() {
        let store = MemoryStore::default();
        let a = schema("A");
        store.create_schema(&a).await.unwrap();
        let (a1, a2) = (instance(&a, "a1"), instance(&a, "a2"));
        store.create_instance(&a1).await.unwrap();
        store.create_instance(&a2).await.unwrap();
        let rel = relation(&a, &a);
        store.create_relation(&rel).await.unwrap();
        store.create_instance_relation(&edge(&rel, &a1, &a2)).await.unwrap();

        assert!(store.delete_instance(&a2.id, "u1").await.unwrap());
        assert!(store.list_for_relation(&rel.id).await.unwrap().is_empty());
        assert!(!store.delete_instance(&a2.id, "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_change_log_evicts_oldest_over_cap() {
        let probe = ChangeLog::record(RefType::Schema, "x", ChangeAction::Create, "u1", None);
        let store = MemoryStore::new(probe.stored_size() * 3);

        for i in 0..5 {
            store.create_schema(&schema(&format!("S{}", i))).await.unwrap();
        }

        assert!(store.change_log_len() <= 3);
        let page = store.query_change_logs(&all()).await.unwrap();
        let names: Vec<_> = page
            .results
            .iter()
            .filter_map(|entry| entry.description.clone())
            .collect();
        assert!(names.contains(&"S4".to_string()));
        assert!(!names.contains(&"S0".to_string()));
    }

    #[tokio::test]
    async fn test_query_sorts_and_paginates() {
        let store = MemoryStore::default();
        for name in ["b", "c", "a"] {
            store.create_schema(&schema(name)).await.unwrap();
        }

        let page = store
            .query_schemas(&ListQuery {
                filter: Filter::new(),
                options: PageOptions {
                    page: 2,
                    limit: 2,
                    sort: SortKey::parse_list("name:desc"),
                },
            })
            .await
            .unwrap();

        assert_eq!(page.total_results, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "a");
    }

    #[test]
    fn test_timestamps_compare_as_instants() {
        let a = serde_json::json!("2025-01-01T10:00:00.5Z");
        let b = serde_json::json!("2025-01-01T10:00:00Z");
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Greater);
    }
}
