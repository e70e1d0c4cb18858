use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{deserialize_some, generate_id, trimmed, Id};

pub const DEFAULT_RELATION_TYPE: &str = "custom";

/// How many edges of a relation may touch one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    ZeroToOne,
    OneToMany,
    ZeroToMany,
}

impl Cardinality {
    /// `one-to-one` and `zero-to-one` allow at most one edge per counterpart
    pub fn is_single_valued(&self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::ZeroToOne)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "one-to-one",
            Cardinality::ZeroToOne => "zero-to-one",
            Cardinality::OneToMany => "one-to-many",
            Cardinality::ZeroToMany => "zero-to-many",
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Cardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-to-one" => Ok(Cardinality::OneToOne),
            "zero-to-one" => Ok(Cardinality::ZeroToOne),
            "one-to-many" => Ok(Cardinality::OneToMany),
            "zero-to-many" => Ok(Cardinality::ZeroToMany),
            _ => Err(format!("Unknown cardinality: {}", s)),
        }
    }
}

/// A typed, cardinality-constrained edge definition between two schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: Id,
    pub name: String,
    /// Free text; common values are custom, association, composition, inheritance
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source schema id
    pub source: Id,
    /// Target schema id
    pub target: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_cardinality: Option<Cardinality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_cardinality: Option<Cardinality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_role_name: Option<String>,
    pub is_core: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_by: Id,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Relation {
    pub fn new(body: NewRelation, created_by: Id) -> Self {
        let now = Utc::now();
        let relation_type = body
            .relation_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_RELATION_TYPE.to_string());

        Self {
            id: generate_id(),
            name: body.name.trim().to_string(),
            relation_type,
            description: trimmed(body.description),
            source: body.source,
            target: body.target,
            source_cardinality: body.source_cardinality,
            target_cardinality: body.target_cardinality,
            source_role_name: body.source_role_name,
            target_role_name: body.target_role_name,
            is_core: body.is_core.unwrap_or(false),
            metadata: body.metadata,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the mutable fields of an update. Source, target and type are
    /// rejected by the service before this is called.
    pub fn apply(&mut self, update: RelationUpdate) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description.trim().to_string());
        }
        if let Some(is_core) = update.is_core {
            self.is_core = is_core;
        }
        if let Some(cardinality) = update.source_cardinality {
            self.source_cardinality = cardinality;
        }
        if let Some(cardinality) = update.target_cardinality {
            self.target_cardinality = cardinality;
        }
        if let Some(role) = update.source_role_name {
            self.source_role_name = Some(role);
        }
        if let Some(role) = update.target_role_name {
            self.target_role_name = Some(role);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = Some(metadata);
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelation {
    pub name: String,
    #[serde(rename = "type", default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub source: Id,
    pub target: Id,
    #[serde(default)]
    pub source_cardinality: Option<Cardinality>,
    #[serde(default)]
    pub target_cardinality: Option<Cardinality>,
    #[serde(default)]
    pub source_role_name: Option<String>,
    #[serde(default)]
    pub target_role_name: Option<String>,
    #[serde(default)]
    pub is_core: Option<bool>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Relation patch. Cardinalities are tri-state: missing keeps the value,
/// `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RelationUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_core: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub source_cardinality: Option<Option<Cardinality>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub target_cardinality: Option<Option<Cardinality>>,
    #[serde(default)]
    pub source_role_name: Option<String>,
    #[serde(default)]
    pub target_role_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub source: Option<Id>,
    #[serde(default)]
    pub target: Option<Id>,
    #[serde(rename = "type", default)]
    pub relation_type: Option<String>,
}

impl RelationUpdate {
    pub fn touches_identity(&self) -> bool {
        self.source.is_some() || self.target.is_some() || self.relation_type.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.is_core.is_none()
            && self.source_cardinality.is_none()
            && self.target_cardinality.is_none()
            && self.source_role_name.is_none()
            && self.target_role_name.is_none()
            && self.metadata.is_none()
            && !self.touches_identity()
    }
}
