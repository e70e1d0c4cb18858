use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Permission that marks a user as an administrator
pub const ADMIN_PERMISSION: &str = "manageUsers";

/// Permission query of the form `user:<id>#<action>[#<type>:<objectId>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionQuery {
    pub user_id: String,
    pub action: String,
    pub object: Option<(String, String)>,
}

impl PermissionQuery {
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            object: None,
        }
    }

    #[cfg(test)]
    pub fn on(mut self, object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        self.object = Some((object_type.into(), object_id.into()));
        self
    }
}

impl std::fmt::Display for PermissionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "user:{}#{}", self.user_id, self.action)?;
        if let Some((object_type, object_id)) = &self.object {
            write!(f, "#{}:{}", object_type, object_id)?;
        }
        Ok(())
    }
}

/// Asks the external authorization service about permissions
#[async_trait::async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, query: &PermissionQuery) -> Result<bool>;

    async fn is_admin(&self, user_id: &str) -> Result<bool> {
        self.authorize(&PermissionQuery::new(user_id, ADMIN_PERMISSION))
            .await
    }
}

#[derive(Debug, Serialize)]
struct AuthorizeRequest<'a> {
    permissions: String,
    #[serde(rename = "userId")]
    user_id: &'a str,
}

/// HTTP client for the authorization service. Granted only when the response
/// is a JSON array whose first element is `true`.
#[derive(Debug, Clone)]
pub struct HttpAuthorizationClient {
    client: reqwest::Client,
    authorize_url: String,
}

impl HttpAuthorizationClient {
    pub fn new(authorize_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            authorize_url: authorize_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl Authorizer for HttpAuthorizationClient {
    async fn authorize(&self, query: &PermissionQuery) -> Result<bool> {
        let request = AuthorizeRequest {
            permissions: query.to_string(),
            user_id: &query.user_id,
        };

        let response = self
            .client
            .post(&self.authorize_url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Authorization request failed for {}", query))?
            .error_for_status()
            .with_context(|| format!("Authorization service rejected {}", query))?;

        let body: Value = response
            .json()
            .await
            .context("Failed to decode authorization response")?;

        Ok(matches!(body.get(0), Some(Value::Bool(true))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_permission_query_format() {
        assert_eq!(
            PermissionQuery::new("u1", "manageUsers").to_string(),
            "user:u1#manageUsers"
        );
        assert_eq!(
            PermissionQuery::new("u1", "write").on("schema", "s9").to_string(),
            "user:u1#write#schema:s9"
        );
    }

    #[tokio::test]
    async fn test_admin_check_posts_permission_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "permissions": "user:admin-1#manageUsers",
                "userId": "admin-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([true])))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpAuthorizationClient::new(server.uri());
        assert!(client.is_admin("admin-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_denied_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([false])))
            .mount(&server)
            .await;

        let client = HttpAuthorizationClient::new(server.uri());
        assert!(!client.is_admin("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_array_answer_is_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"allowed": true})))
            .mount(&server)
            .await;

        let client = HttpAuthorizationClient::new(server.uri());
        assert!(!client.is_admin("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpAuthorizationClient::new(server.uri());
        assert!(client.is_admin("u1").await.is_err());
    }
}
