//! Shared data model for the OAuth subsystem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tb_types::AppResult;
use thiserror::Error;

/// Per-integration OAuth provider configuration
///
/// One instance per third-party integration type (payment processor,
/// messaging tool, ...). Loaded by the caller at startup and never mutated.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// OAuth client ID registered with the provider
    pub client_id: String,

    /// OAuth client secret (confidential client)
    pub client_secret: String,

    /// Redirect URI exactly as registered with the provider
    /// (case- and trailing-slash-sensitive; not validated here)
    pub redirect_uri: String,

    /// Authorization endpoint the browser is redirected to
    pub authorization_endpoint: String,

    /// Token endpoint for code exchange and refresh
    pub token_endpoint: String,

    /// Scopes to request, in order. Empty means provider-default scope.
    pub scopes: Vec<String>,
}

/// Claims carried through the provider redirect inside the signed state
///
/// Created once per authorization attempt and immutable after signing.
/// Lives only for the duration of the round trip; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    /// User initiating the connection
    pub user_id: String,

    /// Organization the integration belongs to
    pub organization_id: String,

    /// Which provider/account pairing this flow is for
    pub integration_id: i64,

    /// Random per-attempt value (base64url, 24 bytes of entropy)
    pub nonce: String,

    /// When the attempt started; drives state expiry
    pub issued_at: DateTime<Utc>,
}

impl StateClaims {
    /// Mint fresh claims for a new authorization attempt
    pub fn new(user_id: &str, organization_id: &str, integration_id: i64) -> AppResult<Self> {
        Ok(Self {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
            integration_id,
            nonce: crate::state::generate_nonce()?,
            issued_at: Utc::now(),
        })
    }
}

/// Result of a successful code exchange or refresh
///
/// Handed off to the [`TokenStore`](crate::store::TokenStore) collaborator;
/// the core never retains it after the call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Short-lived access token
    pub access_token: String,

    /// Long-lived refresh token; not all providers issue or rotate one
    pub refresh_token: Option<String>,

    /// Token type, usually "Bearer"
    pub token_type: String,

    /// Scopes actually granted by the provider
    pub scopes: Vec<String>,

    /// Access token lifetime as reported by the provider
    pub expires_in_seconds: Option<i64>,

    /// When the exchange completed
    pub obtained_at: DateTime<Utc>,
}

/// Why a callback or refresh did not produce usable tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackFailure {
    /// State envelope failed to parse, signature mismatch, or expired.
    /// Deliberately carries no detail: which check failed is logged
    /// server-side only.
    #[error("state parameter failed validation")]
    InvalidState,

    /// Provider rejected the code/refresh token or returned an
    /// unparseable response
    #[error("token exchange rejected: {detail}")]
    ExchangeFailed { detail: String },

    /// Transport-level failure reaching the provider. Refresh may be
    /// retried; a callback must not be (the code may already be consumed).
    #[error("network failure during token exchange: {detail}")]
    Network { detail: String },

    /// Tokens were obtained but could not be saved. The grant is complete
    /// at the provider; only persistence needs to be retried.
    #[error("tokens obtained but could not be persisted: {detail}")]
    PersistenceFailed { detail: String },
}

/// Outcome of [`CallbackOrchestrator::handle_callback`](crate::CallbackOrchestrator::handle_callback)
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Success {
        tokens: TokenRecord,
        claims: StateClaims,
    },
    Failure {
        reason: CallbackFailure,
    },
}

impl CallbackOutcome {
    /// Extract tokens if the callback succeeded
    pub fn tokens(&self) -> Option<&TokenRecord> {
        match self {
            CallbackOutcome::Success { tokens, .. } => Some(tokens),
            CallbackOutcome::Failure { .. } => None,
        }
    }

    /// Extract the failure reason, if any
    pub fn failure_reason(&self) -> Option<&CallbackFailure> {
        match self {
            CallbackOutcome::Success { .. } => None,
            CallbackOutcome::Failure { reason } => Some(reason),
        }
    }
}

/// Outcome of [`CallbackOrchestrator::refresh_access_token`](crate::CallbackOrchestrator::refresh_access_token)
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Success { tokens: TokenRecord },
    Failure { reason: CallbackFailure },
}

impl RefreshOutcome {
    /// Extract tokens if the refresh succeeded
    pub fn tokens(&self) -> Option<&TokenRecord> {
        match self {
            RefreshOutcome::Success { tokens } => Some(tokens),
            RefreshOutcome::Failure { .. } => None,
        }
    }
}
