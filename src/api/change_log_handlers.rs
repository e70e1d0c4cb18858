use axum::{extract::State, response::Json};
use serde_json::Value;

use crate::api::extract::ApiQuery;
use crate::context::AppState;
use crate::error::ApiError;
use crate::model::{Page, UserContext};
use crate::services::change_log_service::{self, ChangeLogQuery};
use crate::store::Store;

/// Admin-only listing of the audit trail
pub async fn list_change_logs<S: Store>(
    State(ctx): State<AppState<S>>,
    user: UserContext,
    ApiQuery(query): ApiQuery<ChangeLogQuery>,
) -> Result<Json<Page<Value>>, ApiError> {
    Ok(Json(
        change_log_service::query_change_logs(&ctx, &query, &user).await?,
    ))
}
