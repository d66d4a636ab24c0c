//! Token exchange and refresh against the provider token endpoint

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::types::{ProviderConfig, TokenRecord};

/// Bounded timeout for token-endpoint requests
const REQUEST_TIMEOUT_SECS: u64 = 12;

/// Why a token request failed
///
/// The exchanger never retries internally; retry policy belongs to the
/// caller, and only refresh is safe to retry.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Transport-level failure: unreachable endpoint, timeout, aborted
    /// connection
    #[error("transport failure reaching token endpoint: {0}")]
    Network(String),

    /// Provider answered with a non-2xx status
    #[error("provider returned status {status}: {}", provider_detail(.error, .error_description))]
    Provider {
        status: u16,
        error: Option<String>,
        error_description: Option<String>,
    },

    /// Provider answered 2xx but the body was not a valid token response
    #[error("unparseable token response: {0}")]
    Parse(String),
}

fn provider_detail(error: &Option<String>, description: &Option<String>) -> String {
    match (error, description) {
        (Some(e), Some(d)) => format!("{} ({})", e, d),
        (Some(e), None) => e.clone(),
        (None, Some(d)) => d.clone(),
        (None, None) => "no error detail".to_string(),
    }
}

/// Token response from the provider
///
/// The one place untrusted provider JSON is mapped into the typed model;
/// unknown fields are ignored, missing optionals become explicit defaults.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// Access token
    access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default)]
    token_type: String,

    /// Expires in seconds
    #[serde(default)]
    expires_in: Option<i64>,

    /// Refresh token (optional)
    #[serde(default)]
    refresh_token: Option<String>,

    /// Granted scope (optional, space-separated)
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Map into a [`TokenRecord`], falling back to the caller's refresh
    /// token when the provider does not rotate it
    fn into_record(self, fallback_refresh_token: Option<&str>) -> TokenRecord {
        TokenRecord {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| fallback_refresh_token.map(str::to_string)),
            token_type: self.token_type,
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            expires_in_seconds: self.expires_in,
            obtained_at: Utc::now(),
        }
    }
}

/// Error body providers return alongside non-2xx statuses (RFC 6749 §5.2)
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    error_description: Option<String>,
}

/// Performs the two grant types against a provider's token endpoint
pub struct TokenExchanger {
    client: Client,
}

impl TokenExchanger {
    /// Create an exchanger with a bounded-timeout HTTP client
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to construct HTTP client");
        Self { client }
    }

    /// Create an exchanger with a caller-supplied HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        config: &ProviderConfig,
        code: &str,
    ) -> Result<TokenRecord, ExchangeError> {
        info!("Exchanging authorization code with {}", config.token_endpoint);

        let mut params = HashMap::new();
        params.insert("grant_type".to_string(), "authorization_code".to_string());
        params.insert("code".to_string(), code.to_string());
        params.insert("redirect_uri".to_string(), config.redirect_uri.clone());
        params.insert("client_id".to_string(), config.client_id.clone());
        params.insert("client_secret".to_string(), config.client_secret.clone());

        self.request_tokens(config, params, None).await
    }

    /// Obtain fresh tokens using a refresh token
    ///
    /// Providers that do not rotate refresh tokens omit `refresh_token`
    /// from the response; the returned record keeps the caller's token in
    /// that case.
    pub async fn refresh(
        &self,
        config: &ProviderConfig,
        refresh_token: &str,
    ) -> Result<TokenRecord, ExchangeError> {
        info!("Refreshing tokens with {}", config.token_endpoint);

        let mut params = HashMap::new();
        params.insert("grant_type".to_string(), "refresh_token".to_string());
        params.insert("refresh_token".to_string(), refresh_token.to_string());
        params.insert("client_id".to_string(), config.client_id.clone());
        params.insert("client_secret".to_string(), config.client_secret.clone());

        self.request_tokens(config, params, Some(refresh_token)).await
    }

    /// Shared transport mechanics for both grant types
    async fn request_tokens(
        &self,
        config: &ProviderConfig,
        params: HashMap<String, String>,
        fallback_refresh_token: Option<&str>,
    ) -> Result<TokenRecord, ExchangeError> {
        let response = self
            .client
            .post(&config.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: ProviderErrorBody = serde_json::from_str(&body).unwrap_or_default();
            error!(
                "Token request to {} failed with status {}",
                config.token_endpoint, status
            );
            return Err(ExchangeError::Provider {
                status: status.as_u16(),
                error: parsed.error,
                error_description: parsed.error_description,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;
        let token_response: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ExchangeError::Parse(e.to_string()))?;

        debug!("Token request to {} succeeded", config.token_endpoint);

        Ok(token_response.into_record(fallback_refresh_token))
    }
}

impl Default for TokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "at1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt1",
            "scope": "read write"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "at1");
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, Some(3600));
        assert_eq!(response.refresh_token, Some("rt1".to_string()));
        assert_eq!(response.scope, Some("read write".to_string()));
    }

    #[test]
    fn test_token_response_minimal() {
        let json = r#"{"access_token": "at1"}"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "at1");
        assert_eq!(response.token_type, ""); // default
        assert_eq!(response.expires_in, None);
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.scope, None);
    }

    #[test]
    fn test_into_record_maps_fields() {
        let json = r#"{
            "access_token": "at1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt1",
            "scope": "read write"
        }"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let record = response.into_record(None);

        assert_eq!(record.access_token, "at1");
        assert_eq!(record.refresh_token, Some("rt1".to_string()));
        assert_eq!(record.token_type, "Bearer");
        assert_eq!(record.scopes, vec!["read", "write"]);
        assert_eq!(record.expires_in_seconds, Some(3600));
    }

    #[test]
    fn test_into_record_retains_fallback_refresh_token() {
        let json = r#"{"access_token": "at2", "token_type": "Bearer"}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let record = response.into_record(Some("original-rt"));

        assert_eq!(record.refresh_token, Some("original-rt".to_string()));
    }

    #[test]
    fn test_into_record_prefers_rotated_refresh_token() {
        let json = r#"{"access_token": "at2", "refresh_token": "rotated-rt"}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let record = response.into_record(Some("original-rt"));

        assert_eq!(record.refresh_token, Some("rotated-rt".to_string()));
    }

    #[test]
    fn test_provider_error_body_best_effort() {
        let parsed: ProviderErrorBody =
            serde_json::from_str(r#"{"error": "invalid_grant"}"#).unwrap();
        assert_eq!(parsed.error, Some("invalid_grant".to_string()));
        assert_eq!(parsed.error_description, None);

        // Non-JSON bodies fall back to empty detail rather than failing.
        let fallback: ProviderErrorBody =
            serde_json::from_str("<html>oops</html>").unwrap_or_default();
        assert_eq!(fallback.error, None);
    }

    #[test]
    fn test_exchange_error_display() {
        let err = ExchangeError::Provider {
            status: 400,
            error: Some("invalid_grant".to_string()),
            error_description: Some("code expired".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "provider returned status 400: invalid_grant (code expired)"
        );
    }
}
