//! OAuth 2.0 Authorization Code Grant client for TallyBridge integrations
//!
//! Connects the platform to third-party integrations (payment processors,
//! messaging tools, etc.) without relying on server-side sessions: the
//! anti-forgery `state` parameter is a self-contained, HMAC-signed envelope
//! that survives the redirect round trip through the provider.
//!
//! # Components
//! - State codec: signs and verifies the transit state ([`state`])
//! - Authorization URL builder ([`authorize`])
//! - Token exchanger for code exchange and refresh ([`exchange`])
//! - Callback orchestrator tying them together ([`callback`])
//!
//! # Usage Example
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use tb_oauth::{CallbackOrchestrator, MemoryTokenStore, ProviderConfig};
//!
//! # async fn run() -> tb_types::AppResult<()> {
//! let mut providers = HashMap::new();
//! providers.insert("stripe".to_string(), ProviderConfig {
//!     client_id: "cid".into(),
//!     client_secret: "secret".into(),
//!     redirect_uri: "https://app.tallybridge.com/oauth/callback/stripe".into(),
//!     authorization_endpoint: "https://connect.stripe.com/oauth/authorize".into(),
//!     token_endpoint: "https://connect.stripe.com/oauth/token".into(),
//!     scopes: vec!["read_write".into()],
//! });
//!
//! let store = Arc::new(MemoryTokenStore::new());
//! let orchestrator = CallbackOrchestrator::new(providers, b"signing-secret".to_vec(), store);
//!
//! // Redirect the browser here...
//! let url = orchestrator.start_authorization("stripe", "u1", "o1", 42)?;
//! // ...then, in the callback route:
//! let outcome = orchestrator.handle_callback("stripe", "auth-code", "raw-state").await?;
//! # Ok(())
//! # }
//! ```

pub mod authorize;
pub mod callback;
pub mod exchange;
pub mod state;
pub mod store;
pub mod types;

pub use authorize::build_authorization_url;
pub use callback::CallbackOrchestrator;
pub use exchange::{ExchangeError, TokenExchanger};
pub use state::{generate_nonce, SignedStateEnvelope, StateError, DEFAULT_STATE_MAX_AGE_SECS};
pub use store::{MemoryTokenStore, TokenStore};
pub use types::{
    CallbackFailure, CallbackOutcome, ProviderConfig, RefreshOutcome, StateClaims, TokenRecord,
};
