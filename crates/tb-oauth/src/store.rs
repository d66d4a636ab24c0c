//! Token store collaborator seam
//!
//! Persistence is owned by the caller; the core only hands tokens across
//! this trait. Implementations are expected to upsert atomically on the
//! (user, organization, integration) key.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tb_types::AppResult;

use crate::types::TokenRecord;

/// Persistent credential storage keyed by user/organization/integration
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Upsert the token record for an integration
    async fn save(
        &self,
        user_id: &str,
        organization_id: &str,
        integration_id: i64,
        tokens: &TokenRecord,
    ) -> AppResult<()>;

    /// Load the stored record, if any
    async fn load(
        &self,
        user_id: &str,
        organization_id: &str,
        integration_id: i64,
    ) -> AppResult<Option<TokenRecord>>;
}

/// In-memory token store
///
/// Suitable for tests and single-process deployments; tokens are lost on
/// restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<(String, String, i64), TokenRecord>>,
}

impl MemoryTokenStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn key(user_id: &str, organization_id: &str, integration_id: i64) -> (String, String, i64) {
        (
            user_id.to_string(),
            organization_id.to_string(),
            integration_id,
        )
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(
        &self,
        user_id: &str,
        organization_id: &str,
        integration_id: i64,
        tokens: &TokenRecord,
    ) -> AppResult<()> {
        self.tokens.write().insert(
            Self::key(user_id, organization_id, integration_id),
            tokens.clone(),
        );
        Ok(())
    }

    async fn load(
        &self,
        user_id: &str,
        organization_id: &str,
        integration_id: i64,
    ) -> AppResult<Option<TokenRecord>> {
        Ok(self
            .tokens
            .read()
            .get(&Self::key(user_id, organization_id, integration_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_record(access_token: &str) -> TokenRecord {
        TokenRecord {
            access_token: access_token.to_string(),
            refresh_token: Some("rt".to_string()),
            token_type: "Bearer".to_string(),
            scopes: vec!["read".to_string()],
            expires_in_seconds: Some(3600),
            obtained_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryTokenStore::new();
        let record = test_record("at1");

        store.save("u1", "o1", 42, &record).await.unwrap();
        let loaded = store.load("u1", "o1", 42).await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load("u1", "o1", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let store = MemoryTokenStore::new();
        store.save("u1", "o1", 42, &test_record("at1")).await.unwrap();
        store.save("u1", "o1", 42, &test_record("at2")).await.unwrap();

        let loaded = store.load("u1", "o1", 42).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "at2");
    }

    #[tokio::test]
    async fn test_keys_are_scoped() {
        let store = MemoryTokenStore::new();
        store.save("u1", "o1", 42, &test_record("at1")).await.unwrap();

        assert_eq!(store.load("u2", "o1", 42).await.unwrap(), None);
        assert_eq!(store.load("u1", "o2", 42).await.unwrap(), None);
        assert_eq!(store.load("u1", "o1", 43).await.unwrap(), None);
    }
}
