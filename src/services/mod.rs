//! Business rules for each entity. Handlers call into these; these call the
//! store and the collaborating services through [`AppContext`].

pub mod change_log_service;
pub mod instance_relation_service;
pub mod instance_service;
pub mod relation_service;
pub mod schema_service;

use serde_json::Value;

use crate::config::ConstraintsConfig;
use crate::context::AppContext;
use crate::error::ApiError;
use crate::logic::{populate, populate_one, PopulateStage, PopulateTarget};
use crate::model::{ListOptions, PageOptions, SortKey, UserContext};
use crate::store::Store;

/// How `limit` above `max_page_size` is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    Clamp,
    Reject,
}

/// Turn raw `page`/`limit`/`sortBy` into validated page options
pub fn page_options(
    options: &ListOptions,
    constraints: &ConstraintsConfig,
    policy: LimitPolicy,
) -> Result<PageOptions, ApiError> {
    let mut page_options = PageOptions {
        limit: constraints.default_page_size.max(1),
        ..PageOptions::default()
    };

    if let Some(page) = options.page {
        if page < 1 {
            return Err(ApiError::bad_request("\"page\" must be greater than or equal to 1"));
        }
        page_options.page = u32::try_from(page).unwrap_or(u32::MAX);
    }

    if let Some(limit) = options.limit {
        if limit < 1 {
            return Err(ApiError::bad_request("\"limit\" must be greater than or equal to 1"));
        }
        let max = i64::from(constraints.max_page_size);
        if limit > max && policy == LimitPolicy::Reject {
            return Err(ApiError::bad_request(format!(
                "\"limit\" must be less than or equal to {}",
                max
            )));
        }
        page_options.limit = u32::try_from(limit.min(max)).unwrap_or(constraints.max_page_size);
    }

    if let Some(sort_by) = &options.sort_by {
        let keys = SortKey::parse_list(sort_by);
        if !keys.is_empty() {
            page_options.sort = keys;
        }
    }

    Ok(page_options)
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!(
            "\"{}\" is not allowed to be empty",
            field
        )));
    }
    Ok(())
}

pub(crate) fn require_update_fields(is_empty: bool) -> Result<(), ApiError> {
    if is_empty {
        return Err(ApiError::bad_request("\"value\" must have at least 1 key"));
    }
    Ok(())
}

/// Replace `created_by` ids with user records
pub(crate) async fn populate_created_by<S: Store>(
    ctx: &AppContext<S>,
    docs: Vec<Value>,
) -> Result<Vec<Value>, ApiError> {
    populate(
        PopulateTarget::Collection(docs),
        &[PopulateStage::new("created_by")],
        ctx.users.as_ref(),
    )
    .await
    .map_err(|e| {
        log::error!("Failed to populate created_by: {}", e);
        ApiError::from(e)
    })
}

pub(crate) async fn populate_created_by_one<S: Store>(
    ctx: &AppContext<S>,
    doc: Value,
) -> Result<Value, ApiError> {
    populate_one(doc, &[PopulateStage::new("created_by")], ctx.users.as_ref())
        .await
        .map_err(|e| {
            log::error!("Failed to populate created_by: {}", e);
            ApiError::from(e)
        })
}

/// Owner short-circuits; anyone else must be an admin
pub(crate) async fn owner_or_admin<S: Store>(
    ctx: &AppContext<S>,
    created_by: &str,
    user: &UserContext,
) -> Result<bool, ApiError> {
    if user.owns(created_by) {
        return Ok(true);
    }
    ctx.authorizer.is_admin(&user.user_id).await.map_err(|e| {
        log::error!("Authorization error {:#}", e);
        ApiError::Internal(e)
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::clients::{Authorizer, PermissionQuery, UserDirectory};
    use crate::config::AppConfig;
    use crate::context::AppContext;
    use crate::store::MemoryStore;

    /// Every requested id resolves to `{id, name: "User <id>"}`
    #[derive(Default)]
    pub struct EchoUsers {
        pub calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl UserDirectory for EchoUsers {
        async fn get_users(&self, ids: &[String], _limit: usize) -> anyhow::Result<Vec<Value>> {
            self.calls.lock().push(ids.to_vec());
            Ok(ids
                .iter()
                .map(|id| json!({"id": id, "name": format!("User {}", id)}))
                .collect())
        }
    }

    /// Grants admin to the listed users only
    pub struct StaticAuthorizer {
        pub admins: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Authorizer for StaticAuthorizer {
        async fn authorize(&self, query: &PermissionQuery) -> anyhow::Result<bool> {
            Ok(self.admins.contains(&query.user_id))
        }
    }

    pub fn context_with_admins(admins: &[&str]) -> AppContext<MemoryStore> {
        AppContext::new(
            Arc::new(MemoryStore::default()),
            Arc::new(EchoUsers::default()),
            Arc::new(StaticAuthorizer {
                admins: admins.iter().map(|a| a.to_string()).collect(),
            }),
            AppConfig::default(),
        )
    }

    pub fn context() -> AppContext<MemoryStore> {
        context_with_admins(&["admin"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints() -> ConstraintsConfig {
        ConstraintsConfig {
            default_page_size: 10,
            max_page_size: 100,
        }
    }

    #[test]
    fn test_defaults_when_nothing_given() {
        let options = page_options(&ListOptions::default(), &constraints(), LimitPolicy::Clamp).unwrap();
        assert_eq!(options, PageOptions::default());
    }

    #[test]
    fn test_limit_policies() {
        let raw = ListOptions {
            limit: Some(500),
            ..ListOptions::default()
        };
        let clamped = page_options(&raw, &constraints(), LimitPolicy::Clamp).unwrap();
        assert_eq!(clamped.limit, 100);

        let err = page_options(&raw, &constraints(), LimitPolicy::Reject).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        for raw in [
            ListOptions {
                page: Some(0),
                ..ListOptions::default()
            },
            ListOptions {
                limit: Some(-1),
                ..ListOptions::default()
            },
        ] {
            assert!(page_options(&raw, &constraints(), LimitPolicy::Clamp).is_err());
        }
    }

    #[test]
    fn test_sort_by_overrides_default() {
        let raw = ListOptions {
            sort_by: Some("name:desc".to_string()),
            ..ListOptions::default()
        };
        let options = page_options(&raw, &constraints(), LimitPolicy::Clamp).unwrap();
        assert_eq!(options.sort[0].field, "name");
        assert!(options.sort[0].descending);
    }
}
