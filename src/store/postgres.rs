use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};

use crate::model::{
    Cardinality, ChangeAction, ChangeLog, Condition, Filter, Id, Instance, InstanceRelation,
    ListQuery, Page, PageOptions, RefType, Relation, Schema,
};
use crate::store::traits::{
    ChangeLogStore, InstanceRelationStore, InstanceStore, RelationStore, SchemaStore, Store,
};

/// Table layout plus the API field name to column mapping used for filters and sorting
struct Table {
    name: &'static str,
    columns: &'static str,
    fields: &'static [(&'static str, &'static str)],
}

impl Table {
    fn column(&self, field: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(api, _)| *api == field)
            .map(|(_, column)| *column)
    }

    fn require(&self, field: &str) -> Result<&'static str> {
        self.column(field)
            .ok_or_else(|| anyhow!("Field {} cannot be filtered on {}", field, self.name))
    }
}

const SCHEMAS: Table = Table {
    name: "schemas",
    columns: "id, name, description, schema_definition, created_by, created_at, updated_at",
    fields: &[
        ("id", "id"),
        ("name", "name"),
        ("description", "description"),
        ("created_by", "created_by"),
        ("createdAt", "created_at"),
        ("updatedAt", "updated_at"),
    ],
};

const INSTANCES: Table = Table {
    name: "instances",
    columns: "id, name, schema_id, data, created_by, created_at, updated_at",
    fields: &[
        ("id", "id"),
        ("name", "name"),
        ("schema", "schema_id"),
        ("created_by", "created_by"),
        ("createdAt", "created_at"),
        ("updatedAt", "updated_at"),
    ],
};

const RELATIONS: Table = Table {
    name: "relations",
    columns: "id, name, relation_type, description, source_id, target_id, source_cardinality, \
              target_cardinality, source_role_name, target_role_name, is_core, metadata, \
              created_by, created_at, updated_at",
    fields: &[
        ("id", "id"),
        ("name", "name"),
        ("type", "relation_type"),
        ("description", "description"),
        ("source", "source_id"),
        ("target", "target_id"),
        ("source_cardinality", "source_cardinality"),
        ("target_cardinality", "target_cardinality"),
        ("source_role_name", "source_role_name"),
        ("target_role_name", "target_role_name"),
        ("is_core", "is_core"),
        ("created_by", "created_by"),
        ("createdAt", "created_at"),
        ("updatedAt", "updated_at"),
    ],
};

const INSTANCE_RELATIONS: Table = Table {
    name: "instance_relations",
    columns: "id, relation_id, source_id, target_id, metadata, description, created_by, \
              created_at, updated_at",
    fields: &[
        ("id", "id"),
        ("relation", "relation_id"),
        ("source", "source_id"),
        ("target", "target_id"),
        ("description", "description"),
        ("created_by", "created_by"),
        ("createdAt", "created_at"),
        ("updatedAt", "updated_at"),
    ],
};

const CHANGE_LOGS: Table = Table {
    name: "change_logs",
    columns: "id, ref_type, ref_id, action, created_by, description, created_at, updated_at",
    fields: &[
        ("id", "id"),
        ("ref_type", "ref_type"),
        ("ref", "ref_id"),
        ("action", "action"),
        ("created_by", "created_by"),
        ("description", "description"),
        ("createdAt", "created_at"),
        ("updatedAt", "updated_at"),
    ],
};

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, column: &str, value: &Value) {
    builder.push(column);
    match value {
        Value::Null => {
            builder.push(" IS NULL");
        }
        Value::Bool(flag) => {
            builder.push(" = ").push_bind(*flag);
        }
        Value::Number(number) => match number.as_i64() {
            Some(int) => {
                builder.push(" = ").push_bind(int);
            }
            None => {
                builder.push(" = ").push_bind(number.as_f64().unwrap_or_default());
            }
        },
        Value::String(text) => {
            builder.push(" = ").push_bind(text.clone());
        }
        other => {
            builder.push(" = ").push_bind(other.to_string());
        }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, table: &Table, filter: &Filter) -> Result<()> {
    for (index, condition) in filter.conditions.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        match condition {
            Condition::Eq { field, value } => push_value(builder, table.require(field)?, value),
            Condition::EqIgnoreCase { field, value } => {
                builder
                    .push("LOWER(")
                    .push(table.require(field)?)
                    .push(") = LOWER(")
                    .push_bind(value.clone())
                    .push(")");
            }
            Condition::Search { fields, term } => {
                let pattern = format!("%{}%", escape_like(term));
                builder.push("(");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    builder
                        .push(table.require(field)?)
                        .push(" ILIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\'");
                }
                builder.push(")");
            }
            Condition::Between { field, range } => {
                let column = table.require(field)?;
                builder.push("(TRUE");
                if let Some(gte) = range.gte {
                    builder.push(" AND ").push(column).push(" >= ").push_bind(gte);
                }
                if let Some(lte) = range.lte {
                    builder.push(" AND ").push(column).push(" <= ").push_bind(lte);
                }
                builder.push(")");
            }
        }
    }
    Ok(())
}

fn push_order_and_page(builder: &mut QueryBuilder<'_, Postgres>, table: &Table, options: &PageOptions) {
    let order: Vec<String> = options
        .sort
        .iter()
        .filter_map(|key| {
            table
                .column(&key.field)
                .map(|column| format!("{} {}", column, if key.descending { "DESC" } else { "ASC" }))
        })
        .collect();

    builder.push(" ORDER BY ");
    if order.is_empty() {
        builder.push("created_at ASC");
    } else {
        builder.push(order.join(", "));
    }
    builder
        .push(" LIMIT ")
        .push_bind(i64::from(options.limit))
        .push(" OFFSET ")
        .push_bind(i64::try_from(options.offset()).unwrap_or(i64::MAX));
}

fn parse_cardinality(raw: Option<String>) -> Result<Option<Cardinality>> {
    raw.map(|value| value.parse::<Cardinality>().map_err(|e| anyhow!(e)))
        .transpose()
}

fn schema_from_row(row: &PgRow) -> Result<Schema> {
    Ok(Schema {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        schema_definition: row.try_get("schema_definition")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn instance_from_row(row: &PgRow) -> Result<Instance> {
    Ok(Instance {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        schema: row.try_get("schema_id")?,
        data: row.try_get("data")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn relation_from_row(row: &PgRow) -> Result<Relation> {
    Ok(Relation {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        relation_type: row.try_get("relation_type")?,
        description: row.try_get("description")?,
        source: row.try_get("source_id")?,
        target: row.try_get("target_id")?,
        source_cardinality: parse_cardinality(row.try_get("source_cardinality")?)?,
        target_cardinality: parse_cardinality(row.try_get("target_cardinality")?)?,
        source_role_name: row.try_get("source_role_name")?,
        target_role_name: row.try_get("target_role_name")?,
        is_core: row.try_get("is_core")?,
        metadata: row.try_get("metadata")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn instance_relation_from_row(row: &PgRow) -> Result<InstanceRelation> {
    Ok(InstanceRelation {
        id: row.try_get("id")?,
        relation: row.try_get("relation_id")?,
        source: row.try_get("source_id")?,
        target: row.try_get("target_id")?,
        metadata: row.try_get("metadata")?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn change_log_from_row(row: &PgRow) -> Result<ChangeLog> {
    let action: String = row.try_get("action")?;
    Ok(ChangeLog {
        id: row.try_get("id")?,
        ref_type: row.try_get("ref_type")?,
        ref_id: row.try_get("ref_id")?,
        action: action.parse().map_err(|e: String| anyhow!(e))?,
        created_by: row.try_get("created_by")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn deleted_entries(
    ref_type: RefType,
    rows: Vec<(String, Option<String>)>,
    actor: &str,
) -> impl Iterator<Item = ChangeLog> + '_ {
    rows.into_iter().map(move |(id, description)| {
        ChangeLog::record(ref_type, &id, ChangeAction::Delete, actor, description)
    })
}

/// The windowed trim only runs once the log outgrows its cap
fn over_cap(total_bytes: i64, cap_bytes: i64) -> bool {
    total_bytes > cap_bytes
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    change_log_cap_bytes: i64,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32, change_log_cap_bytes: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self {
            pool,
            change_log_cap_bytes: i64::try_from(change_log_cap_bytes).unwrap_or(i64::MAX),
        })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    async fn fetch_by_id<T>(&self, table: &Table, id: &Id, map: fn(&PgRow) -> Result<T>) -> Result<Option<T>> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", table.columns, table.name);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch from {}", table.name))?;

        row.as_ref().map(map).transpose()
    }

    async fn fetch_by_ids<T>(&self, table: &Table, ids: &[Id], map: fn(&PgRow) -> Result<T>) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM {} WHERE id = ANY($1)", table.columns, table.name);
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch from {}", table.name))?;

        rows.iter().map(map).collect()
    }

    async fn query_page<T>(&self, table: &Table, query: &ListQuery, map: fn(&PgRow) -> Result<T>) -> Result<Page<T>> {
        let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table.name));
        push_filter(&mut count, table, &query.filter)?;
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", table.name))?;

        let mut select = QueryBuilder::new(format!("SELECT {} FROM {}", table.columns, table.name));
        push_filter(&mut select, table, &query.filter)?;
        push_order_and_page(&mut select, table, &query.options);
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to query {}", table.name))?;

        let results = rows.iter().map(map).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(results, &query.options, u64::try_from(total).unwrap_or(0)))
    }

    /// Append entries and trim the oldest rows beyond the byte cap
    async fn record_changes(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entries: impl IntoIterator<Item = ChangeLog>,
    ) -> Result<()> {
        for entry in entries {
            let size = i32::try_from(entry.stored_size()).unwrap_or(i32::MAX);
            sqlx::query(
                r#"
                INSERT INTO change_logs (id, ref_type, ref_id, action, created_by, description, size_bytes, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.ref_type)
            .bind(&entry.ref_id)
            .bind(entry.action.as_str())
            .bind(&entry.created_by)
            .bind(&entry.description)
            .bind(size)
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .execute(&mut **tx)
            .await
            .context("Failed to append change log")?;
        }

        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM change_logs")
            .fetch_one(&mut **tx)
            .await
            .context("Failed to measure change logs")?;
        if !over_cap(total, self.change_log_cap_bytes) {
            return Ok(());
        }

        sqlx::query(
            r#"
            DELETE FROM change_logs WHERE seq IN (
                SELECT seq FROM (
                    SELECT seq, SUM(size_bytes) OVER (ORDER BY seq DESC) AS running
                    FROM change_logs
                ) sized
                WHERE running > $1
            )
            "#,
        )
        .bind(self.change_log_cap_bytes)
        .execute(&mut **tx)
        .await
        .context("Failed to trim change logs")?;

        Ok(())
    }

    async fn delete_edges_where(
        tx: &mut Transaction<'_, Postgres>,
        relation_ids: &[Id],
        instance_ids: &[Id],
    ) -> Result<Vec<(String, Option<String>)>> {
        sqlx::query_as(
            r#"
            DELETE FROM instance_relations
            WHERE relation_id = ANY($1) OR source_id = ANY($2) OR target_id = ANY($2)
            RETURNING id, description
            "#,
        )
        .bind(relation_ids)
        .bind(instance_ids)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to delete instance relations")
    }
}

#[async_trait::async_trait]
impl SchemaStore for PostgresStore {
    async fn get_schema(&self, id: &Id) -> Result<Option<Schema>> {
        self.fetch_by_id(&SCHEMAS, id, schema_from_row).await
    }

    async fn get_schemas(&self, ids: &[Id]) -> Result<Vec<Schema>> {
        self.fetch_by_ids(&SCHEMAS, ids, schema_from_row).await
    }

    async fn query_schemas(&self, query: &ListQuery) -> Result<Page<Schema>> {
        self.query_page(&SCHEMAS, query, schema_from_row).await
    }

    async fn create_schema(&self, schema: &Schema) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query(
            r#"
            INSERT INTO schemas (id, name, description, schema_definition, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&schema.id)
        .bind(&schema.name)
        .bind(&schema.description)
        .bind(&schema.schema_definition)
        .bind(&schema.created_by)
        .bind(schema.created_at)
        .bind(schema.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert schema")?;

        let entry = ChangeLog::record(
            RefType::Schema,
            &schema.id,
            ChangeAction::Create,
            &schema.created_by,
            Some(schema.name.clone()),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit schema")?;
        Ok(())
    }

    async fn update_schema(&self, schema: &Schema, actor: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query(
            r#"
            UPDATE schemas SET name = $2, description = $3, schema_definition = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(&schema.id)
        .bind(&schema.name)
        .bind(&schema.description)
        .bind(&schema.schema_definition)
        .bind(schema.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema")?;

        let entry = ChangeLog::record(
            RefType::Schema,
            &schema.id,
            ChangeAction::Update,
            actor,
            Some(schema.name.clone()),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit schema update")?;
        Ok(())
    }

    async fn delete_schema(&self, id: &Id, actor: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let relation_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM relations WHERE source_id = $1 OR target_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to load relations of schema")?;
        let instance_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM instances WHERE schema_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to load instances of schema")?;

        let edges = Self::delete_edges_where(&mut tx, &relation_ids, &instance_ids).await?;

        let relations: Vec<(String, Option<String>)> =
            sqlx::query_as("DELETE FROM relations WHERE id = ANY($1) RETURNING id, name")
                .bind(&relation_ids[..])
                .fetch_all(&mut *tx)
                .await
                .context("Failed to delete relations")?;
        let instances: Vec<(String, Option<String>)> =
            sqlx::query_as("DELETE FROM instances WHERE id = ANY($1) RETURNING id, name")
                .bind(&instance_ids[..])
                .fetch_all(&mut *tx)
                .await
                .context("Failed to delete instances")?;
        let schemas: Vec<(String, Option<String>)> =
            sqlx::query_as("DELETE FROM schemas WHERE id = $1 RETURNING id, name")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to delete schema")?;

        let existed = !schemas.is_empty();
        let entries: Vec<ChangeLog> = deleted_entries(RefType::InstanceRelation, edges, actor)
            .chain(deleted_entries(RefType::Relation, relations, actor))
            .chain(deleted_entries(RefType::Instance, instances, actor))
            .chain(deleted_entries(RefType::Schema, schemas, actor))
            .collect();
        self.record_changes(&mut tx, entries).await?;
        tx.commit().await.context("Failed to commit schema deletion")?;

        Ok(existed)
    }
}

#[async_trait::async_trait]
impl InstanceStore for PostgresStore {
    async fn get_instance(&self, id: &Id) -> Result<Option<Instance>> {
        self.fetch_by_id(&INSTANCES, id, instance_from_row).await
    }

    async fn get_instances(&self, ids: &[Id]) -> Result<Vec<Instance>> {
        self.fetch_by_ids(&INSTANCES, ids, instance_from_row).await
    }

    async fn query_instances(&self, query: &ListQuery) -> Result<Page<Instance>> {
        self.query_page(&INSTANCES, query, instance_from_row).await
    }

    async fn create_instance(&self, instance: &Instance) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query(
            r#"
            INSERT INTO instances (id, name, schema_id, data, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.name)
        .bind(&instance.schema)
        .bind(&instance.data)
        .bind(&instance.created_by)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert instance")?;

        let entry = ChangeLog::record(
            RefType::Instance,
            &instance.id,
            ChangeAction::Create,
            &instance.created_by,
            Some(instance.name.clone()),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit instance")?;
        Ok(())
    }

    async fn update_instance(&self, instance: &Instance, actor: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query("UPDATE instances SET name = $2, data = $3, updated_at = $4 WHERE id = $1")
            .bind(&instance.id)
            .bind(&instance.name)
            .bind(&instance.data)
            .bind(instance.updated_at)
            .execute(&mut *tx)
            .await
            .context("Failed to update instance")?;

        let entry = ChangeLog::record(
            RefType::Instance,
            &instance.id,
            ChangeAction::Update,
            actor,
            Some(instance.name.clone()),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit instance update")?;
        Ok(())
    }

    async fn delete_instance(&self, id: &Id, actor: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let instance_ids = vec![id.clone()];
        let edges = Self::delete_edges_where(&mut tx, &[], &instance_ids).await?;
        let instances: Vec<(String, Option<String>)> =
            sqlx::query_as("DELETE FROM instances WHERE id = $1 RETURNING id, name")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to delete instance")?;

        let existed = !instances.is_empty();
        let entries: Vec<ChangeLog> = deleted_entries(RefType::InstanceRelation, edges, actor)
            .chain(deleted_entries(RefType::Instance, instances, actor))
            .collect();
        self.record_changes(&mut tx, entries).await?;
        tx.commit().await.context("Failed to commit instance deletion")?;

        Ok(existed)
    }
}

#[async_trait::async_trait]
impl RelationStore for PostgresStore {
    async fn get_relation(&self, id: &Id) -> Result<Option<Relation>> {
        self.fetch_by_id(&RELATIONS, id, relation_from_row).await
    }

    async fn get_relations(&self, ids: &[Id]) -> Result<Vec<Relation>> {
        self.fetch_by_ids(&RELATIONS, ids, relation_from_row).await
    }

    async fn query_relations(&self, query: &ListQuery) -> Result<Page<Relation>> {
        self.query_page(&RELATIONS, query, relation_from_row).await
    }

    async fn find_relation(
        &self,
        source: &Id,
        target: &Id,
        relation_type: &str,
    ) -> Result<Option<Relation>> {
        let sql = format!(
            "SELECT {} FROM relations WHERE source_id = $1 AND target_id = $2 AND relation_type = $3",
            RELATIONS.columns
        );
        let row = sqlx::query(&sql)
            .bind(source)
            .bind(target)
            .bind(relation_type)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up relation")?;

        row.as_ref().map(relation_from_row).transpose()
    }

    async fn create_relation(&self, relation: &Relation) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query(
            r#"
            INSERT INTO relations (id, name, relation_type, description, source_id, target_id,
                source_cardinality, target_cardinality, source_role_name, target_role_name,
                is_core, metadata, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&relation.id)
        .bind(&relation.name)
        .bind(&relation.relation_type)
        .bind(&relation.description)
        .bind(&relation.source)
        .bind(&relation.target)
        .bind(relation.source_cardinality.map(|c| c.as_str()))
        .bind(relation.target_cardinality.map(|c| c.as_str()))
        .bind(&relation.source_role_name)
        .bind(&relation.target_role_name)
        .bind(relation.is_core)
        .bind(&relation.metadata)
        .bind(&relation.created_by)
        .bind(relation.created_at)
        .bind(relation.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert relation")?;

        let entry = ChangeLog::record(
            RefType::Relation,
            &relation.id,
            ChangeAction::Create,
            &relation.created_by,
            Some(relation.name.clone()),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit relation")?;
        Ok(())
    }

    async fn update_relation(&self, relation: &Relation, actor: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query(
            r#"
            UPDATE relations SET name = $2, description = $3, source_cardinality = $4,
                target_cardinality = $5, source_role_name = $6, target_role_name = $7,
                is_core = $8, metadata = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(&relation.id)
        .bind(&relation.name)
        .bind(&relation.description)
        .bind(relation.source_cardinality.map(|c| c.as_str()))
        .bind(relation.target_cardinality.map(|c| c.as_str()))
        .bind(&relation.source_role_name)
        .bind(&relation.target_role_name)
        .bind(relation.is_core)
        .bind(&relation.metadata)
        .bind(relation.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to update relation")?;

        let entry = ChangeLog::record(
            RefType::Relation,
            &relation.id,
            ChangeAction::Update,
            actor,
            Some(relation.name.clone()),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit relation update")?;
        Ok(())
    }

    async fn delete_relation(&self, id: &Id, actor: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let relation_ids = vec![id.clone()];
        let edges = Self::delete_edges_where(&mut tx, &relation_ids, &[]).await?;
        let relations: Vec<(String, Option<String>)> =
            sqlx::query_as("DELETE FROM relations WHERE id = $1 RETURNING id, name")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to delete relation")?;

        let existed = !relations.is_empty();
        let entries: Vec<ChangeLog> = deleted_entries(RefType::InstanceRelation, edges, actor)
            .chain(deleted_entries(RefType::Relation, relations, actor))
            .collect();
        self.record_changes(&mut tx, entries).await?;
        tx.commit().await.context("Failed to commit relation deletion")?;

        Ok(existed)
    }
}

#[async_trait::async_trait]
impl InstanceRelationStore for PostgresStore {
    async fn get_instance_relation(&self, id: &Id) -> Result<Option<InstanceRelation>> {
        self.fetch_by_id(&INSTANCE_RELATIONS, id, instance_relation_from_row).await
    }

    async fn query_instance_relations(&self, query: &ListQuery) -> Result<Page<InstanceRelation>> {
        self.query_page(&INSTANCE_RELATIONS, query, instance_relation_from_row).await
    }

    async fn list_for_relation(&self, relation_id: &Id) -> Result<Vec<InstanceRelation>> {
        let sql = format!(
            "SELECT {} FROM instance_relations WHERE relation_id = $1",
            INSTANCE_RELATIONS.columns
        );
        let rows = sqlx::query(&sql)
            .bind(relation_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list instance relations")?;

        rows.iter().map(instance_relation_from_row).collect()
    }

    async fn create_instance_relation(&self, edge: &InstanceRelation) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query(
            r#"
            INSERT INTO instance_relations (id, relation_id, source_id, target_id, metadata,
                description, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&edge.id)
        .bind(&edge.relation)
        .bind(&edge.source)
        .bind(&edge.target)
        .bind(&edge.metadata)
        .bind(&edge.description)
        .bind(&edge.created_by)
        .bind(edge.created_at)
        .bind(edge.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert instance relation")?;

        let entry = ChangeLog::record(
            RefType::InstanceRelation,
            &edge.id,
            ChangeAction::Create,
            &edge.created_by,
            edge.description.clone(),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit instance relation")?;
        Ok(())
    }

    async fn update_instance_relation(&self, edge: &InstanceRelation, actor: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        sqlx::query(
            "UPDATE instance_relations SET metadata = $2, description = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(&edge.id)
        .bind(&edge.metadata)
        .bind(&edge.description)
        .bind(edge.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to update instance relation")?;

        let entry = ChangeLog::record(
            RefType::InstanceRelation,
            &edge.id,
            ChangeAction::Update,
            actor,
            edge.description.clone(),
        );
        self.record_changes(&mut tx, [entry]).await?;
        tx.commit().await.context("Failed to commit instance relation update")?;
        Ok(())
    }

    async fn delete_instance_relation(&self, id: &Id, actor: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let edges: Vec<(String, Option<String>)> =
            sqlx::query_as("DELETE FROM instance_relations WHERE id = $1 RETURNING id, description")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to delete instance relation")?;

        let existed = !edges.is_empty();
        let entries: Vec<ChangeLog> = deleted_entries(RefType::InstanceRelation, edges, actor).collect();
        self.record_changes(&mut tx, entries).await?;
        tx.commit().await.context("Failed to commit instance relation deletion")?;

        Ok(existed)
    }
}

#[async_trait::async_trait]
impl ChangeLogStore for PostgresStore {
    async fn query_change_logs(&self, query: &ListQuery) -> Result<Page<ChangeLog>> {
        self.query_page(&CHANGE_LOGS, query, change_log_from_row).await
    }
}

impl Store for PostgresStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, SortKey};
    use chrono::{TimeZone, Utc};

    fn sql_for(table: &Table, filter: &Filter, options: &PageOptions) -> String {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM {}", table.columns, table.name));
        push_filter(&mut builder, table, filter).unwrap();
        push_order_and_page(&mut builder, table, options);
        builder.sql().to_string()
    }

    #[test]
    fn test_trim_only_past_cap() {
        assert!(!over_cap(0, 100));
        assert!(!over_cap(100, 100));
        assert!(over_cap(101, 100));
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_filter_renders_columns_and_placeholders() {
        let mut filter = Filter::new().eq("schema", "s1").eq_ignore_case("ref_type", "schema");
        filter.push(Condition::Search {
            fields: vec!["name"],
            term: "motor".to_string(),
        });
        let sql = sql_for(&INSTANCES, &Filter::new().eq("schema", "s1"), &PageOptions::default());
        assert!(sql.contains("WHERE schema_id = $1"));
        assert!(sql.ends_with("ORDER BY created_at ASC LIMIT $2 OFFSET $3"));

        let mut builder = QueryBuilder::new("SELECT 1 FROM change_logs");
        assert!(push_filter(&mut builder, &INSTANCES, &filter).is_err());
    }

    #[test]
    fn test_date_range_and_unknown_sort() {
        let range = DateRange {
            gte: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            lte: None,
        };
        let options = PageOptions {
            page: 1,
            limit: 10,
            sort: SortKey::parse_list("bogus:desc,createdAt:desc"),
        };
        let sql = sql_for(&CHANGE_LOGS, &Filter::new().between("createdAt", range), &options);
        assert!(sql.contains("(TRUE AND created_at >= $1)"));
        assert!(sql.contains("ORDER BY created_at DESC"));
    }

    #[test]
    fn test_null_and_bool_values() {
        let filter = Filter::new().eq("is_core", true).eq("source_cardinality", Value::Null);
        let sql = sql_for(&RELATIONS, &filter, &PageOptions::default());
        assert!(sql.contains("WHERE is_core = $1 AND source_cardinality IS NULL"));
    }
}
