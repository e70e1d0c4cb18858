use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{deserialize_some, generate_id, trimmed, Id};

/// A concrete edge between two instances, typed by a relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRelation {
    pub id: Id,
    pub relation: Id,
    /// Source instance id
    pub source: Id,
    /// Target instance id
    pub target: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: Id,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl InstanceRelation {
    pub fn new(body: NewInstanceRelation, created_by: Id) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            relation: body.relation,
            source: body.source,
            target: body.target,
            metadata: body.metadata,
            description: trimmed(body.description),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn links(&self, source: &str, target: &str) -> bool {
        self.source == source && self.target == target
    }

    pub fn apply(&mut self, update: InstanceRelationUpdate) {
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        if let Some(description) = update.description {
            self.description = Some(description.trim().to_string());
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstanceRelation {
    pub relation: Id,
    pub source: Id,
    pub target: Id,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Only the metadata and description of an edge can change
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InstanceRelationUpdate {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub metadata: Option<Option<serde_json::Value>>,
    #[serde(default)]
    pub description: Option<String>,
}
