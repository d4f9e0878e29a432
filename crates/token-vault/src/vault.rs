//! High-level API for managing the persisted session.

use crate::{StorageResult, TokenStorage, VaultKeys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tokens are treated as expired once fewer than this many seconds remain,
/// so a refresh happens before the server starts rejecting them.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Session metadata persisted alongside the tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSessionMeta {
    /// User ID from Supabase Auth
    pub user_id: Uuid,
    /// User email from Supabase Auth
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

/// High-level API for storing and retrieving the session
pub struct SessionVault {
    storage: Box<dyn TokenStorage>,
}

impl SessionVault {
    /// Create a new session vault with the given storage backend
    pub fn new(storage: Box<dyn TokenStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Tokens
    // ==========================================

    /// Store the access token
    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(VaultKeys::ACCESS_TOKEN, token)
    }

    /// Retrieve the access token
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(VaultKeys::ACCESS_TOKEN)
    }

    /// Store the refresh token
    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(VaultKeys::REFRESH_TOKEN, token)
    }

    /// Retrieve the refresh token
    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(VaultKeys::REFRESH_TOKEN)
    }

    // ==========================================
    // Session Metadata
    // ==========================================

    /// Store session metadata
    pub fn set_session_meta(&self, meta: &StoredSessionMeta) -> StorageResult<()> {
        let json = serde_json::to_string(meta)
            .map_err(|e| crate::StorageError::Encoding(e.to_string()))?;
        self.storage.set(VaultKeys::SESSION_META, &json)
    }

    /// Retrieve session metadata
    pub fn get_session_meta(&self) -> StorageResult<Option<StoredSessionMeta>> {
        match self.storage.get(VaultKeys::SESSION_META)? {
            Some(json) => {
                let meta: StoredSessionMeta = serde_json::from_str(&json)
                    .map_err(|e| crate::StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Check if a session exists
    pub fn has_session(&self) -> StorageResult<bool> {
        let has_token = self.storage.has(VaultKeys::ACCESS_TOKEN)?;
        let has_meta = self.storage.has(VaultKeys::SESSION_META)?;
        Ok(has_token && has_meta)
    }

    /// Check if the stored session is expired
    pub fn is_session_expired(&self) -> StorageResult<bool> {
        match self.get_session_meta()? {
            Some(meta) => {
                let remaining = meta.expires_at.signed_duration_since(Utc::now());
                Ok(remaining.num_seconds() < EXPIRY_SKEW_SECONDS)
            }
            None => Ok(true),
        }
    }

    /// Store a complete session (tokens + metadata)
    pub fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_id: Uuid,
        email: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.set_access_token(access_token)?;
        self.set_refresh_token(refresh_token)?;
        self.set_session_meta(&StoredSessionMeta {
            user_id,
            email: email.map(String::from),
            expires_at,
        })?;
        Ok(())
    }

    /// Clear the session
    pub fn clear_session(&self) -> StorageResult<()> {
        let _ = self.storage.delete(VaultKeys::ACCESS_TOKEN);
        let _ = self.storage.delete(VaultKeys::REFRESH_TOKEN);
        let _ = self.storage.delete(VaultKeys::SESSION_META);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTokenStore;
    use chrono::Duration;

    fn test_vault() -> SessionVault {
        SessionVault::new(Box::new(MemoryTokenStore::new()))
    }

    #[test]
    fn test_vault_session_roundtrip() {
        let vault = test_vault();
        let user_id = Uuid::new_v4();

        // Initially no session
        assert!(!vault.has_session().unwrap());

        vault
            .set_session(
                "access-token",
                "refresh-token",
                user_id,
                Some("test@example.com"),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();

        // Session should exist
        assert!(vault.has_session().unwrap());

        // Verify individual tokens
        assert_eq!(
            vault.get_access_token().unwrap(),
            Some("access-token".to_string())
        );
        assert_eq!(
            vault.get_refresh_token().unwrap(),
            Some("refresh-token".to_string())
        );

        // Verify metadata
        let meta = vault.get_session_meta().unwrap().unwrap();
        assert_eq!(meta.user_id, user_id);
        assert_eq!(meta.email, Some("test@example.com".to_string()));
    }

    #[test]
    fn test_vault_clear_session() {
        let vault = test_vault();

        vault
            .set_session(
                "access-token",
                "refresh-token",
                Uuid::new_v4(),
                None,
                Utc::now() + Duration::hours(1),
            )
            .unwrap();
        assert!(vault.has_session().unwrap());

        vault.clear_session().unwrap();
        assert!(!vault.has_session().unwrap());
        assert!(vault.get_access_token().unwrap().is_none());

        // Clearing again is a no-op
        vault.clear_session().unwrap();
    }

    #[test]
    fn test_vault_session_expired() {
        let vault = test_vault();

        // Expired session (past time)
        vault
            .set_session(
                "access-token",
                "refresh-token",
                Uuid::new_v4(),
                Some("test@example.com"),
                Utc::now() - Duration::hours(1),
            )
            .unwrap();
        assert!(vault.has_session().unwrap());
        assert!(vault.is_session_expired().unwrap());

        // Valid session (future time)
        vault
            .set_session(
                "access-token-2",
                "refresh-token-2",
                Uuid::new_v4(),
                Some("test2@example.com"),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();
        assert!(!vault.is_session_expired().unwrap());
    }

    #[test]
    fn test_vault_expiry_skew() {
        let vault = test_vault();

        // Expires in 30s: inside the skew window, treated as expired
        vault
            .set_session(
                "access-token",
                "refresh-token",
                Uuid::new_v4(),
                None,
                Utc::now() + Duration::seconds(30),
            )
            .unwrap();
        assert!(vault.is_session_expired().unwrap());

        // Expires in 5 minutes: not expired
        vault
            .set_session(
                "access-token",
                "refresh-token",
                Uuid::new_v4(),
                None,
                Utc::now() + Duration::minutes(5),
            )
            .unwrap();
        assert!(!vault.is_session_expired().unwrap());
    }

    #[test]
    fn test_vault_no_meta_counts_as_expired() {
        let vault = test_vault();
        assert!(vault.is_session_expired().unwrap());
    }

    #[test]
    fn test_vault_meta_missing_email_deserializes() {
        let vault = test_vault();
        let user_id = Uuid::new_v4();

        // Older vault files may lack the email field
        let json = format!(
            r#"{{"user_id":"{}","expires_at":"2030-01-01T00:00:00Z"}}"#,
            user_id
        );
        let meta: StoredSessionMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(meta.user_id, user_id);
        assert_eq!(meta.email, None);

        vault.set_session_meta(&meta).unwrap();
        let loaded = vault.get_session_meta().unwrap().unwrap();
        assert_eq!(loaded.email, None);
    }
}
