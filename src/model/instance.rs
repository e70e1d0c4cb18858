use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Id};

/// A record of data conforming to a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: Id,
    pub name: String,
    /// Id of the owning schema
    pub schema: Id,
    /// Payload stored as JSON text, validated against the schema on write
    pub data: String,
    pub created_by: Id,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(body: NewInstance, created_by: Id) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            name: body.name.trim().to_string(),
            schema: body.schema,
            data: body.data,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: InstanceUpdate) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(data) = update.data {
            self.data = data;
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstance {
    pub name: String,
    pub schema: Id,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl InstanceUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.data.is_none()
    }
}
