//! Bearer-token acquisition.
//!
//! The HTTP client asks a [`TokenProvider`] for a token before every request
//! and attaches it as `Authorization: Bearer <token>`. Refreshing and caching
//! tokens is the provider's business.

use async_trait::async_trait;

use crate::error::DrkrResult;

/// Source of access tokens for the DRKR API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return the current access token, or `None` to send the request
    /// without an `Authorization` header.
    async fn access_token(&self) -> DrkrResult<Option<String>>;
}

/// A fixed token, e.g. an API key from configuration.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> DrkrResult<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// No authentication (local development backends).
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl TokenProvider for Anonymous {
    async fn access_token(&self) -> DrkrResult<Option<String>> {
        Ok(None)
    }
}

/// Attach the provider's token, if any, to `request`.
pub(crate) async fn authorize(
    provider: &dyn TokenProvider,
    request: reqwest::RequestBuilder,
) -> DrkrResult<reqwest::RequestBuilder> {
    match provider.access_token().await? {
        Some(token) if !token.is_empty() => Ok(request.bearer_auth(token)),
        _ => Ok(request),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_sets_bearer_header() {
        let client = reqwest::Client::new();
        let request = authorize(&StaticToken::new("abc"), client.get("http://localhost:8000"))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer abc");
    }

    #[tokio::test]
    async fn test_anonymous_sends_no_header() {
        let client = reqwest::Client::new();
        let request = authorize(&Anonymous, client.get("http://localhost:8000"))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn test_static_token_debug_is_redacted() {
        assert_eq!(format!("{:?}", StaticToken::new("secret")), "StaticToken(***)");
    }
}
