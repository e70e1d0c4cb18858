use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Source of user profiles for populating `created_by`
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch the users with the given ids in a single call
    async fn get_users(&self, ids: &[String], limit: usize) -> Result<Vec<Value>>;
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// HTTP client for the user service (`GET <base_url>?id=a,b&limit=n`)
#[derive(Debug, Clone)]
pub struct HttpUserClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for HttpUserClient {
    async fn get_users(&self, ids: &[String], limit: usize) -> Result<Vec<Value>> {
        let joined = ids.join(",");
        let limit = limit.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("id", joined.as_str()), ("limit", limit.as_str())])
            .send()
            .await
            .context("Failed to reach user service")?
            .error_for_status()
            .context("User service rejected the request")?;

        let body: UserListResponse = response
            .json()
            .await
            .context("Failed to decode user service response")?;

        Ok(body.results)
    }
}
