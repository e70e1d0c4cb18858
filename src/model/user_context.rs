use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Acting user, taken from the `x-user-id` request header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Id,
}

impl UserContext {
    pub fn new(user_id: impl Into<Id>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Whether this user created the entity owned by `created_by`
    pub fn owns(&self, created_by: &str) -> bool {
        self.user_id == created_by
    }
}
