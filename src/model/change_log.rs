use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "CREATE",
            ChangeAction::Update => "UPDATE",
            ChangeAction::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(ChangeAction::Create),
            "UPDATE" => Ok(ChangeAction::Update),
            "DELETE" => Ok(ChangeAction::Delete),
            _ => Err(format!("Unknown change action: {}", s)),
        }
    }
}

/// Kind of entity a change log entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefType {
    Schema,
    Instance,
    Relation,
    InstanceRelation,
}

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Schema => "Schema",
            RefType::Instance => "Instance",
            RefType::Relation => "Relation",
            RefType::InstanceRelation => "InstanceRelation",
        }
    }
}

/// Append-only audit record written by the store on every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub id: Id,
    pub ref_type: String,
    #[serde(rename = "ref")]
    pub ref_id: Id,
    pub action: ChangeAction,
    pub created_by: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ChangeLog {
    pub fn record(
        ref_type: RefType,
        ref_id: &str,
        action: ChangeAction,
        actor: &str,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            ref_type: ref_type.as_str().to_string(),
            ref_id: ref_id.to_string(),
            action,
            created_by: actor.to_string(),
            description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bytes this entry counts against the change log size cap
    pub fn stored_size(&self) -> usize {
        serde_json::to_vec(self).map(|bytes| bytes.len()).unwrap_or(0)
    }
}
