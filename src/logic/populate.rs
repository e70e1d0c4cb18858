//! Replace user-id fields on documents with user records from the user service.
//!
//! Documents are plain JSON values. Population consumes its input and returns
//! new values; nothing bound to the store is touched.

use std::collections::HashMap;

use futures::future::{try_join_all, BoxFuture};
use itertools::Itertools;
use serde_json::{Map, Value};

use crate::clients::UserDirectory;

/// Upper bound on users requested in one call to the user service
pub const USER_FETCH_LIMIT: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum PopulateError {
    #[error("Document must be a JSON object.")]
    NotAnObject,
    #[error("Field \"{0}\" does not exist in the document.")]
    MissingField(String),
    #[error("Field \"{field}\" with value {value} is not a valid id.")]
    InvalidId { field: String, value: Value },
    #[error("Invalid data for projection. Data must be an object.")]
    InvalidProjectionData,
    #[error("Field \"{0}\" does not exist in the data.")]
    MissingProjectionField(String),
    #[error("Error while executing query: {0:#}")]
    Query(anyhow::Error),
    #[error("Error while retrieving data: {0:#}")]
    Fetch(anyhow::Error),
}

/// What to populate: documents already in hand, or a pending query for them
pub enum PopulateTarget {
    Collection(Vec<Value>),
    Query(BoxFuture<'static, anyhow::Result<Vec<Value>>>),
}

impl PopulateTarget {
    pub fn single(doc: Value) -> Self {
        PopulateTarget::Collection(vec![doc])
    }

    async fn resolve(self) -> Result<Vec<Value>, PopulateError> {
        match self {
            PopulateTarget::Collection(docs) => Ok(docs),
            PopulateTarget::Query(query) => query.await.map_err(PopulateError::Query),
        }
    }
}

/// One field to populate and the user keys to keep (empty keeps everything)
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateStage {
    pub field: String,
    pub projection: Vec<String>,
}

impl PopulateStage {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            projection: Vec::new(),
        }
    }

    /// `projection` is a whitespace separated key list, e.g. `"name image_file"`
    pub fn with_projection(field: &str, projection: &str) -> Self {
        Self {
            field: field.to_string(),
            projection: projection.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Keep only the projected keys of a user record; `id` is always kept
pub fn project(user: &Value, projection: &[String]) -> Result<Value, PopulateError> {
    if projection.is_empty() {
        return Ok(user.clone());
    }

    let record = user.as_object().ok_or(PopulateError::InvalidProjectionData)?;

    let mut projected = Map::new();
    for key in projection
        .iter()
        .map(String::as_str)
        .chain(std::iter::once("id"))
        .unique()
    {
        let value = record
            .get(key)
            .ok_or_else(|| PopulateError::MissingProjectionField(key.to_string()))?;
        projected.insert(key.to_string(), value.clone());
    }

    Ok(Value::Object(projected))
}

fn referenced_id<'a>(doc: &'a Value, field: &str) -> Result<&'a str, PopulateError> {
    let object = doc.as_object().ok_or(PopulateError::NotAnObject)?;
    let value = object
        .get(field)
        .ok_or_else(|| PopulateError::MissingField(field.to_string()))?;

    match value.as_str() {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(PopulateError::InvalidId {
            field: field.to_string(),
            value: value.clone(),
        }),
    }
}

pub async fn populate<U: UserDirectory + ?Sized>(
    target: PopulateTarget,
    stages: &[PopulateStage],
    users: &U,
) -> Result<Vec<Value>, PopulateError> {
    let docs = target.resolve().await?;
    if stages.is_empty() {
        return Ok(docs);
    }

    // Validate every document before calling out.
    let mut ids_by_field: Vec<(&PopulateStage, Vec<String>)> = Vec::with_capacity(stages.len());
    for stage in stages {
        let ids = docs
            .iter()
            .map(|doc| referenced_id(doc, &stage.field))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unique()
            .map(str::to_string)
            .collect_vec();
        ids_by_field.push((stage, ids));
    }

    let fetches = ids_by_field.into_iter().map(|(stage, ids)| async move {
        let found = if ids.is_empty() {
            Vec::new()
        } else {
            users
                .get_users(&ids, USER_FETCH_LIMIT)
                .await
                .map_err(PopulateError::Fetch)?
        };

        let mut by_id = HashMap::with_capacity(found.len());
        for user in &found {
            let Some(id) = user.get("id").and_then(Value::as_str) else {
                continue;
            };
            by_id.insert(id.to_string(), project(user, &stage.projection)?);
        }
        Ok::<_, PopulateError>((stage.field.as_str(), by_id))
    });

    let resolved: HashMap<&str, HashMap<String, Value>> =
        try_join_all(fetches).await?.into_iter().collect();

    let populated = docs
        .into_iter()
        .map(|doc| {
            let Value::Object(mut object) = doc else {
                return Err(PopulateError::NotAnObject);
            };
            for stage in stages {
                let user = object
                    .get(&stage.field)
                    .and_then(Value::as_str)
                    .and_then(|id| resolved.get(stage.field.as_str())?.get(id))
                    .cloned()
                    .unwrap_or(Value::Null);
                object.insert(stage.field.clone(), user);
            }
            Ok(Value::Object(object))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(populated)
}

/// Populate a single document
pub async fn populate_one<U: UserDirectory + ?Sized>(
    doc: Value,
    stages: &[PopulateStage],
    users: &U,
) -> Result<Value, PopulateError> {
    let mut docs = populate(PopulateTarget::single(doc), stages, users).await?;
    docs.pop().ok_or(PopulateError::NotAnObject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct FakeUsers {
        users: Vec<Value>,
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl FakeUsers {
        fn new(users: Vec<Value>) -> Self {
            Self {
                users,
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl UserDirectory for FakeUsers {
        async fn get_users(&self, ids: &[String], _limit: usize) -> anyhow::Result<Vec<Value>> {
            self.calls.lock().push(ids.to_vec());
            if self.fail {
                anyhow::bail!("user service unavailable");
            }
            Ok(self
                .users
                .iter()
                .filter(|u| ids.iter().any(|id| u["id"] == json!(id)))
                .cloned()
                .collect())
        }
    }

    fn users() -> FakeUsers {
        FakeUsers::new(vec![
            json!({"id": "u1", "name": "Ada", "image_file": "ada.png", "email": "ada@x"}),
            json!({"id": "u2", "name": "Bob", "image_file": "bob.png", "email": "bob@x"}),
        ])
    }

    #[tokio::test]
    async fn test_replaces_ids_and_batches_distinct_ids() {
        let directory = users();
        let docs = vec![
            json!({"id": "s1", "created_by": "u1"}),
            json!({"id": "s2", "created_by": "u1"}),
            json!({"id": "s3", "created_by": "u2"}),
        ];

        let populated = populate(
            PopulateTarget::Collection(docs),
            &[PopulateStage::new("created_by")],
            &directory,
        )
        .await
        .unwrap();

        assert_eq!(populated[0]["created_by"]["name"], "Ada");
        assert_eq!(populated[1]["created_by"]["name"], "Ada");
        assert_eq!(populated[2]["created_by"]["email"], "bob@x");

        let calls = directory.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["u1".to_string(), "u2".to_string()]);
    }

    #[tokio::test]
    async fn test_projection_keeps_id() {
        let directory = users();
        let doc = json!({"id": "s1", "created_by": "u2"});
        let populated = populate_one(
            doc,
            &[PopulateStage::with_projection("created_by", "name")],
            &directory,
        )
        .await
        .unwrap();

        assert_eq!(populated["created_by"], json!({"name": "Bob", "id": "u2"}));
    }

    #[tokio::test]
    async fn test_unknown_user_becomes_null() {
        let directory = users();
        let populated = populate_one(
            json!({"id": "s1", "created_by": "ghost"}),
            &[PopulateStage::new("created_by")],
            &directory,
        )
        .await
        .unwrap();
        assert_eq!(populated["created_by"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_field_fails_before_fetch() {
        let directory = users();
        let err = populate(
            PopulateTarget::Collection(vec![json!({"id": "s1"})]),
            &[PopulateStage::new("created_by")],
            &directory,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PopulateError::MissingField(_)));
        assert!(directory.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_non_object_document_fails() {
        let err = populate(
            PopulateTarget::Collection(vec![json!("s1")]),
            &[PopulateStage::new("created_by")],
            &users(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PopulateError::NotAnObject));
    }

    #[tokio::test]
    async fn test_projection_of_absent_key_fails() {
        let err = populate_one(
            json!({"id": "s1", "created_by": "u1"}),
            &[PopulateStage::with_projection("created_by", "name avatar")],
            &users(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PopulateError::MissingProjectionField(ref k) if k == "avatar"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_retried() {
        let mut directory = users();
        directory.fail = true;
        let err = populate_one(
            json!({"id": "s1", "created_by": "u1"}),
            &[PopulateStage::new("created_by")],
            &directory,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PopulateError::Fetch(_)));
        assert_eq!(directory.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_query_target_is_awaited() {
        let query: BoxFuture<'static, anyhow::Result<Vec<Value>>> =
            Box::pin(async { Ok(vec![json!({"id": "i1", "created_by": "u1"})]) });

        let populated = populate(
            PopulateTarget::Query(query),
            &[PopulateStage::new("created_by")],
            &users(),
        )
        .await
        .unwrap();
        assert_eq!(populated[0]["created_by"]["id"], "u1");
    }

    #[tokio::test]
    async fn test_no_stages_returns_documents_untouched() {
        let directory = users();
        let docs = vec![json!({"id": "s1"})];
        let populated = populate(PopulateTarget::Collection(docs.clone()), &[], &directory)
            .await
            .unwrap();
        assert_eq!(populated, docs);
        assert!(directory.calls.lock().is_empty());
    }
}
