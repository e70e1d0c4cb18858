use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, trimmed, Id};

/// A named JSON Schema document that instances must conform to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema stored as text, parsed on reads
    pub schema_definition: String,
    pub created_by: Id,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Schema {
    pub fn new(body: NewSchema, created_by: Id) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: body.name.trim().to_string(),
            description: trimmed(body.description),
            schema_definition: body.schema_definition,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: SchemaUpdate) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description.trim().to_string());
        }
        if let Some(definition) = update.schema_definition {
            self.schema_definition = definition;
        }
        self.updated_at = Utc::now();
    }
}

/// Request body for creating a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchema {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schema_definition: String,
}

/// Request body for updating a schema; at least one field must be present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema_definition: Option<String>,
}

impl SchemaUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.schema_definition.is_none()
    }
}
