use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::error::ApiError;
use crate::model::UserContext;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Axum extractor for UserContext from the `x-user-id` header.
///
/// A missing or blank header is rejected with 401.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers).ok_or_else(|| ApiError::unauthorized("Please authenticate"))
    }
}

pub fn user_from_headers(headers: &HeaderMap) -> Option<UserContext> {
    extract_header_value(headers, USER_ID_HEADER).map(UserContext::new)
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, Request};

    #[tokio::test]
    async fn test_user_context_extraction() {
        let request = Request::builder()
            .header("x-user-id", "test-user-123")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let user = UserContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.user_id, "test-user-123");
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let err = UserContext::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_blank_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_static("   "),
        );
        assert!(user_from_headers(&headers).is_none());
    }
}
