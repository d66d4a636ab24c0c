//! Callback orchestrator - the public entry point of the subsystem
//!
//! Ties the state codec, token exchanger, and token store together for the
//! end-to-end callback, plus the refresh path. Each invocation is
//! request-scoped and safe to run concurrently with any other; correctness
//! rests on the signed state, not on in-memory locks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tb_types::{AppError, AppResult};
use tracing::{error, info, warn};

use crate::authorize::build_authorization_url;
use crate::exchange::{ExchangeError, TokenExchanger};
use crate::state::{SignedStateEnvelope, DEFAULT_STATE_MAX_AGE_SECS};
use crate::store::TokenStore;
use crate::types::{CallbackFailure, CallbackOutcome, ProviderConfig, RefreshOutcome, StateClaims};

/// Orchestrates the authorization-code callback and token refresh
pub struct CallbackOrchestrator {
    /// Provider configurations keyed by provider key ("stripe", "slack", ...)
    providers: HashMap<String, ProviderConfig>,

    /// Shared secret signing the state envelope; read-only, process-wide
    state_secret: Vec<u8>,

    /// Maximum accepted age of a state envelope
    state_max_age: Duration,

    /// Token endpoint client
    exchanger: TokenExchanger,

    /// Persistence collaborator
    store: Arc<dyn TokenStore>,
}

impl CallbackOrchestrator {
    /// Create an orchestrator over a provider catalog
    pub fn new(
        providers: HashMap<String, ProviderConfig>,
        state_secret: Vec<u8>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            providers,
            state_secret,
            state_max_age: Duration::seconds(DEFAULT_STATE_MAX_AGE_SECS),
            exchanger: TokenExchanger::new(),
            store,
        }
    }

    /// Override the state max age (default 10 minutes)
    pub fn with_state_max_age(mut self, max_age: Duration) -> Self {
        self.state_max_age = max_age;
        self
    }

    /// Override the token exchanger (custom HTTP client, timeouts)
    pub fn with_exchanger(mut self, exchanger: TokenExchanger) -> Self {
        self.exchanger = exchanger;
        self
    }

    /// A missing provider key is a deployment error, not a flow failure
    fn provider(&self, key: &str) -> AppResult<&ProviderConfig> {
        self.providers
            .get(key)
            .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", key)))
    }

    /// Mint fresh claims and build the redirect URL starting a flow
    pub fn start_authorization(
        &self,
        provider_key: &str,
        user_id: &str,
        organization_id: &str,
        integration_id: i64,
    ) -> AppResult<String> {
        let config = self.provider(provider_key)?;
        let claims = StateClaims::new(user_id, organization_id, integration_id)?;

        info!(
            "Starting authorization for provider {} (user {}, org {})",
            provider_key, user_id, organization_id
        );

        build_authorization_url(config, &claims, &self.state_secret)
    }

    /// Handle the provider redirect: decode, verify, exchange, persist
    ///
    /// Decode and verification failures both collapse to
    /// [`CallbackFailure::InvalidState`] so callers cannot be used as an
    /// oracle for which check failed; the distinction is logged server-side.
    /// Must be invoked at most once per authorization code - providers
    /// invalidate codes after first use, so a replayed call fails at the
    /// exchange step.
    pub async fn handle_callback(
        &self,
        provider_key: &str,
        code: &str,
        raw_state: &str,
    ) -> AppResult<CallbackOutcome> {
        let config = self.provider(provider_key)?;

        let envelope = match SignedStateEnvelope::decode(raw_state) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Rejecting callback for {}: {}", provider_key, e);
                return Ok(CallbackOutcome::Failure {
                    reason: CallbackFailure::InvalidState,
                });
            }
        };

        let claims = match envelope.verify(&self.state_secret, self.state_max_age) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("Rejecting callback for {}: {}", provider_key, e);
                return Ok(CallbackOutcome::Failure {
                    reason: CallbackFailure::InvalidState,
                });
            }
        };

        let tokens = match self.exchanger.exchange_code(config, code).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!("Code exchange failed for {}: {}", provider_key, e);
                return Ok(CallbackOutcome::Failure {
                    reason: exchange_failure(e),
                });
            }
        };

        if let Err(e) = self
            .store
            .save(
                &claims.user_id,
                &claims.organization_id,
                claims.integration_id,
                &tokens,
            )
            .await
        {
            // The grant is complete at the provider; only persistence needs
            // a retry. Logged distinctly from authentication failures.
            error!(
                "Tokens for {} (user {}, org {}) could not be persisted: {}",
                provider_key, claims.user_id, claims.organization_id, e
            );
            return Ok(CallbackOutcome::Failure {
                reason: CallbackFailure::PersistenceFailed {
                    detail: e.to_string(),
                },
            });
        }

        info!(
            "Connected provider {} for user {} (org {}, integration {})",
            provider_key, claims.user_id, claims.organization_id, claims.integration_id
        );

        Ok(CallbackOutcome::Success { tokens, claims })
    }

    /// Obtain fresh tokens with a refresh token
    ///
    /// No state verification: no browser round trip occurs. Safe for the
    /// caller to retry on network failure.
    pub async fn refresh_access_token(
        &self,
        provider_key: &str,
        refresh_token: &str,
    ) -> AppResult<RefreshOutcome> {
        let config = self.provider(provider_key)?;

        match self.exchanger.refresh(config, refresh_token).await {
            Ok(tokens) => {
                info!("Refreshed tokens for provider {}", provider_key);
                Ok(RefreshOutcome::Success { tokens })
            }
            Err(e) => {
                error!("Token refresh failed for {}: {}", provider_key, e);
                Ok(RefreshOutcome::Failure {
                    reason: exchange_failure(e),
                })
            }
        }
    }
}

fn exchange_failure(error: ExchangeError) -> CallbackFailure {
    match error {
        ExchangeError::Network(detail) => CallbackFailure::Network { detail },
        other @ (ExchangeError::Provider { .. } | ExchangeError::Parse(_)) => {
            CallbackFailure::ExchangeFailed {
                detail: other.to_string(),
            }
        }
    }
}
