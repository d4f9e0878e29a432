//! Backend surface the session manager depends on.

use crate::profile::Profile;
use async_trait::async_trait;
use supabase_gateway::{AuthSession, AuthUser, GatewayResult, SignUpOutcome, SupabaseGateway};
use uuid::Uuid;

const PROFILES_TABLE: &str = "profiles";

/// The slice of the backend that session management needs.
///
/// [`SupabaseGateway`] is the production implementation; tests substitute
/// a scripted in-memory one, the same way the vault swaps its storage.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> GatewayResult<AuthSession>;

    async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<SignUpOutcome>;

    async fn email_exists(&self, email: &str) -> GatewayResult<bool>;

    async fn refresh_session(&self, refresh_token: &str) -> GatewayResult<AuthSession>;

    async fn sign_out(&self, access_token: &str) -> GatewayResult<()>;

    async fn get_user(&self, access_token: &str) -> GatewayResult<AuthUser>;

    /// The profile row for `user_id`, if one exists.
    async fn fetch_profile(
        &self,
        user_id: Uuid,
        access_token: Option<&str>,
    ) -> GatewayResult<Option<Profile>>;

    /// Write one profile row as an upsert keyed by id.
    async fn upsert_profile(
        &self,
        row: &serde_json::Value,
        access_token: Option<&str>,
    ) -> GatewayResult<()>;
}

#[async_trait]
impl SessionBackend for SupabaseGateway {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> GatewayResult<AuthSession> {
        SupabaseGateway::sign_in_with_password(self, email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<SignUpOutcome> {
        SupabaseGateway::sign_up(self, email, password).await
    }

    async fn email_exists(&self, email: &str) -> GatewayResult<bool> {
        SupabaseGateway::email_exists(self, email).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> GatewayResult<AuthSession> {
        SupabaseGateway::refresh_session(self, refresh_token).await
    }

    async fn sign_out(&self, access_token: &str) -> GatewayResult<()> {
        SupabaseGateway::sign_out(self, access_token).await
    }

    async fn get_user(&self, access_token: &str) -> GatewayResult<AuthUser> {
        SupabaseGateway::get_user(self, access_token).await
    }

    async fn fetch_profile(
        &self,
        user_id: Uuid,
        access_token: Option<&str>,
    ) -> GatewayResult<Option<Profile>> {
        let query = format!("id=eq.{}&select=*", user_id);
        let rows: Vec<Profile> = self.select(PROFILES_TABLE, &query, access_token).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_profile(
        &self,
        row: &serde_json::Value,
        access_token: Option<&str>,
    ) -> GatewayResult<()> {
        self.upsert(PROFILES_TABLE, Some("id"), row, access_token)
            .await
    }
}
