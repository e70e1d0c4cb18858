//! Read-only GraphQL view over schemas and instances.
//!
//! The executable schema is built once at startup and handed to the router
//! as an `Extension`; resolvers reach the services through
//! [`InventoryReader`].

use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql::{
    Context, EmptyMutation, EmptySubscription, InputObject, InputValueError, InputValueResult,
    Object, OutputType, Scalar, ScalarType, SimpleObject, ID,
};
use axum::{
    http::HeaderMap,
    response::{Html, Json},
    Extension,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::api::extract::ApiJson;
use crate::api::user_extractor::user_from_headers;
use crate::context::AppContext;
use crate::error::ApiError;
use crate::model::Page;
use crate::services::instance_service::{self, InstanceQuery};
use crate::services::schema_service::{self, SchemaQuery};
use crate::store::Store;

pub const GRAPHQL_PATH: &str = "/v2/inventory/graphql";

pub type InventorySchema = async_graphql::Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// The reads GraphQL exposes, erased over the store type
#[async_trait::async_trait]
pub trait InventoryReader: Send + Sync {
    async fn schemas(&self, query: SchemaQuery) -> Result<Page<Value>, ApiError>;
    async fn schema(&self, id: &str) -> Result<Value, ApiError>;
    async fn instances(&self, query: InstanceQuery) -> Result<Page<Value>, ApiError>;
    async fn instance(&self, id: &str) -> Result<Value, ApiError>;
}

#[async_trait::async_trait]
impl<S: Store> InventoryReader for AppContext<S> {
    async fn schemas(&self, query: SchemaQuery) -> Result<Page<Value>, ApiError> {
        schema_service::query_schemas(self, &query).await
    }

    async fn schema(&self, id: &str) -> Result<Value, ApiError> {
        schema_service::get_schema(self, id).await
    }

    async fn instances(&self, query: InstanceQuery) -> Result<Page<Value>, ApiError> {
        instance_service::query_instances(self, &query).await
    }

    async fn instance(&self, id: &str) -> Result<Value, ApiError> {
        instance_service::get_instance(self, id).await
    }
}

pub fn build_schema(reader: Arc<dyn InventoryReader>) -> InventorySchema {
    async_graphql::Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(reader)
        .finish()
}

/// Arbitrary JSON object
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct JsonObject(pub Value);

#[Scalar(name = "Object")]
impl ScalarType for JsonObject {
    fn parse(value: async_graphql::Value) -> InputValueResult<Self> {
        value.into_json().map(JsonObject).map_err(InputValueError::custom)
    }

    fn to_value(&self) -> async_graphql::Value {
        async_graphql::Value::from_json(self.0.clone()).unwrap_or(async_graphql::Value::Null)
    }
}

#[derive(Debug, Clone, Deserialize, SimpleObject)]
#[graphql(name = "User", rename_fields = "snake_case")]
pub struct UserObject {
    pub id: ID,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, SimpleObject)]
#[graphql(name = "Schema", rename_fields = "snake_case")]
pub struct SchemaObject {
    pub id: ID,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schema_definition: JsonObject,
    #[serde(default)]
    pub created_by: Option<UserObject>,
}

#[derive(Debug, Clone, Deserialize, SimpleObject)]
#[graphql(name = "SimpledSchema")]
pub struct SchemaRefObject {
    pub id: ID,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, SimpleObject)]
#[graphql(name = "Instance", rename_fields = "snake_case")]
pub struct InstanceObject {
    pub id: ID,
    pub name: String,
    #[serde(default)]
    pub schema: Option<SchemaRefObject>,
    pub data: JsonObject,
    #[serde(default)]
    pub created_by: Option<UserObject>,
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(concrete(name = "SchemaResult", params(SchemaObject)))]
#[graphql(concrete(name = "InstanceResult", params(InstanceObject)))]
pub struct ResultPage<T: OutputType> {
    pub results: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_results: u64,
}

impl<T: OutputType + DeserializeOwned> ResultPage<T> {
    fn from_page(page: Page<Value>) -> async_graphql::Result<Self> {
        let results = page
            .results
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Self {
            results,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages,
            total_results: page.total_results,
        })
    }
}

#[derive(Debug, Clone, Default, InputObject)]
#[graphql(name = "Filter", rename_fields = "snake_case")]
pub struct FilterInput {
    pub name: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default, InputObject)]
#[graphql(name = "Options")]
pub struct OptionsInput {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[graphql(name = "sortBy")]
    pub sort_by: Option<String>,
}

#[derive(Debug, Clone, Default, InputObject)]
#[graphql(name = "Advanced")]
pub struct AdvancedInput {
    pub search: Option<String>,
}

/// `NotFound` reads as a null field rather than an error
fn optional(result: Result<Value, ApiError>) -> Result<Option<Value>, ApiError> {
    match result {
        Ok(doc) => Ok(Some(doc)),
        Err(ApiError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn schemas(
        &self,
        ctx: &Context<'_>,
        filter: Option<FilterInput>,
        options: Option<OptionsInput>,
        advanced: Option<AdvancedInput>,
    ) -> async_graphql::Result<ResultPage<SchemaObject>> {
        let reader = ctx.data::<Arc<dyn InventoryReader>>()?;
        let filter = filter.unwrap_or_default();
        let options = options.unwrap_or_default();
        let query = SchemaQuery {
            name: filter.name,
            created_by: filter.created_by,
            search: advanced.and_then(|a| a.search),
            sort_by: options.sort_by,
            limit: options.limit,
            page: options.page,
        };
        ResultPage::from_page(reader.schemas(query).await?)
    }

    async fn schema(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<Option<SchemaObject>> {
        let reader = ctx.data::<Arc<dyn InventoryReader>>()?;
        match optional(reader.schema(&id).await)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn instances(
        &self,
        ctx: &Context<'_>,
        filter: Option<FilterInput>,
        options: Option<OptionsInput>,
        advanced: Option<AdvancedInput>,
    ) -> async_graphql::Result<ResultPage<InstanceObject>> {
        let reader = ctx.data::<Arc<dyn InventoryReader>>()?;
        let filter = filter.unwrap_or_default();
        let options = options.unwrap_or_default();
        let query = InstanceQuery {
            name: filter.name,
            created_by: filter.created_by,
            search: advanced.and_then(|a| a.search),
            sort_by: options.sort_by,
            limit: options.limit,
            page: options.page,
            ..InstanceQuery::default()
        };
        ResultPage::from_page(reader.instances(query).await?)
    }

    async fn instance(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<Option<InstanceObject>> {
        let reader = ctx.data::<Arc<dyn InventoryReader>>()?;
        match optional(reader.instance(&id).await)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }
}

pub async fn graphql_handler(
    Extension(schema): Extension<InventorySchema>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<async_graphql::Request>,
) -> Result<Json<async_graphql::Response>, ApiError> {
    let user = user_from_headers(&headers).ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
    Ok(Json(schema.execute(request.data(user)).await))
}

pub async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint(GRAPHQL_PATH).finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewSchema, UserContext};
    use crate::services::test_support::context;

    #[tokio::test]
    async fn test_schemas_query_returns_typed_page() {
        let ctx = Arc::new(context());
        schema_service::create_schema(
            &ctx,
            NewSchema {
                name: "Battery".to_string(),
                description: None,
                schema_definition: r#"{"type": "object"}"#.to_string(),
            },
            &UserContext::new("u1"),
        )
        .await
        .unwrap();

        let schema = build_schema(ctx);
        let response = schema
            .execute(
                r#"{ schemas(filter: {name: "Battery"}) {
                    results { name schema_definition created_by { id name } }
                    totalResults
                } }"#,
            )
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json().unwrap();
        assert_eq!(data["schemas"]["totalResults"], 1);
        assert_eq!(data["schemas"]["results"][0]["schema_definition"]["type"], "object");
        assert_eq!(data["schemas"]["results"][0]["created_by"]["name"], "User u1");
    }

    #[tokio::test]
    async fn test_missing_instance_is_null() {
        let schema = build_schema(Arc::new(context()));
        let response = schema.execute(r#"{ instance(id: "nope") { id } }"#).await;
        assert!(response.errors.is_empty());
        assert_eq!(response.data.into_json().unwrap()["instance"], Value::Null);
    }
}
