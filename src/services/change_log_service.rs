use serde::Deserialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::logic::search_filter::CHANGE_LOG_SEARCH_FIELDS;
use crate::logic::views::raw_view;
use crate::logic::{build_search_filter, parse_date_filter};
use crate::model::{ChangeAction, Filter, ListOptions, ListQuery, Page, UserContext};
use crate::services::{page_options, LimitPolicy};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeLogQuery {
    pub created_by: Option<String>,
    pub ref_type: Option<String>,
    #[serde(rename = "ref")]
    pub ref_id: Option<String>,
    pub action: Option<ChangeAction>,
    pub search: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl ChangeLogQuery {
    fn list_options(&self) -> ListOptions {
        ListOptions {
            sort_by: self.sort_by.clone(),
            limit: self.limit,
            page: self.page,
        }
    }

    fn filter(&self) -> Result<Filter, ApiError> {
        let mut filter = Filter::new()
            .eq_opt("created_by", self.created_by.clone())
            .eq_opt("ref", self.ref_id.clone())
            .eq_opt("action", self.action.map(|a| a.as_str()));

        if let Some(ref_type) = self.ref_type.as_deref().filter(|t| !t.trim().is_empty()) {
            filter = filter.eq_ignore_case("ref_type", ref_type.trim());
        }

        for (field, raw) in [("createdAt", &self.created_at), ("updatedAt", &self.updated_at)] {
            if let Some(raw) = raw {
                let range = parse_date_filter(raw)
                    .map_err(|message| ApiError::bad_request(format!("\"{}\" {}", field, message)))?;
                filter = filter.between(field, range);
            }
        }

        Ok(filter)
    }
}

/// Change log listing is an admin-only view of the audit trail
pub async fn query_change_logs<S: Store>(
    ctx: &AppContext<S>,
    params: &ChangeLogQuery,
    user: &UserContext,
) -> Result<Page<Value>, ApiError> {
    let is_admin = ctx.authorizer.is_admin(&user.user_id).await.map_err(|e| {
        log::error!("Authorization error {:#}", e);
        ApiError::Internal(e)
    })?;
    if !is_admin {
        return Err(ApiError::forbidden("Forbidden"));
    }

    let query = ListQuery {
        filter: build_search_filter(params.filter()?, params.search.as_deref(), CHANGE_LOG_SEARCH_FIELDS),
        options: page_options(&params.list_options(), &ctx.config.constraints, LimitPolicy::Reject)?,
    };

    let page = ctx.store.query_change_logs(&query).await?;
    let docs = page.results.iter().map(raw_view).collect();
    Ok(page.map_results(docs))
}
