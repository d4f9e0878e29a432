//! GoTrue auth endpoints: password grant, sign-up, refresh, sign-out.

use crate::{GatewayError, GatewayResult, SupabaseGateway};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User identity returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// User UUID
    pub id: Uuid,
    /// User email (absent for phone-only accounts)
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

/// Outcome of a sign-up request.
///
/// When email confirmation is enabled, GoTrue returns the created user
/// without a session; the user signs in after confirming.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<AuthSession>,
}

/// Account changes accepted by the user-update endpoint.
///
/// Only populated fields are sent; GoTrue leaves the rest untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Wire shape of a GoTrue token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Token lifetime in seconds
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

/// Parse a sign-up response body.
///
/// The body is either a full token response (email confirmation off) or
/// a bare user object (email confirmation on).
fn parse_sign_up_body(body: &str) -> GatewayResult<SignUpOutcome> {
    if let Ok(token) = serde_json::from_str::<TokenResponse>(body) {
        let session = token.into_session();
        return Ok(SignUpOutcome {
            user: session.user.clone(),
            session: Some(session),
        });
    }

    let user: AuthUser = serde_json::from_str(body)
        .map_err(|_| GatewayError::UnexpectedResponse("unrecognized sign-up response".to_string()))?;
    Ok(SignUpOutcome {
        user,
        session: None,
    })
}

impl SupabaseGateway {
    /// Sign in with email and password.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> GatewayResult<AuthSession> {
        let url = self.auth_url("token?grant_type=password");
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });

        tracing::debug!("Requesting password grant from Supabase");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(None))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Password grant", response).await);
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.into_session())
    }

    /// Create a new account with email and password.
    pub async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<SignUpOutcome> {
        let url = self.auth_url("signup");
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });

        tracing::debug!("Requesting sign-up from Supabase");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(None))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Sign-up", response).await);
        }

        let text = response.text().await?;
        parse_sign_up_body(&text)
    }

    /// Exchange a refresh token for a fresh session.
    pub async fn refresh_session(&self, refresh_token: &str) -> GatewayResult<AuthSession> {
        let url = self.auth_url("token?grant_type=refresh_token");
        let body = serde_json::json!({
            "refresh_token": refresh_token,
        });

        tracing::debug!("Refreshing Supabase session");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(None))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Session refresh", response).await);
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.into_session())
    }

    /// Revoke the session server-side.
    ///
    /// A 401 or 404 means the session is already gone; that counts as
    /// success so local sign-out never gets stuck.
    pub async fn sign_out(&self, access_token: &str) -> GatewayResult<()> {
        let url = self.auth_url("logout");

        tracing::debug!("Revoking Supabase session");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(Some(access_token)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status.as_u16() != 401 && status.as_u16() != 404 {
            return Err(self.api_error("Sign-out", response).await);
        }

        Ok(())
    }

    /// Fetch the user behind an access token.
    ///
    /// Used to verify that a restored session still belongs to a live
    /// account.
    pub async fn get_user(&self, access_token: &str) -> GatewayResult<AuthUser> {
        let url = self.auth_url("user");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(Some(access_token)))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("User lookup", response).await);
        }

        let user: AuthUser = response.json().await?;
        Ok(user)
    }

    /// Change the signed-in user's email or password.
    pub async fn update_user(
        &self,
        access_token: &str,
        attrs: &UserAttributes,
    ) -> GatewayResult<AuthUser> {
        let url = self.auth_url("user");

        tracing::debug!("Requesting user update from Supabase");

        let response = self
            .http_client
            .put(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(Some(access_token)))
            .header("Content-Type", "application/json")
            .json(attrs)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("User update", response).await);
        }

        let user: AuthUser = response.json().await?;
        Ok(user)
    }

    /// Check whether an email is already registered, via the
    /// `email_exists` stored function.
    pub async fn email_exists(&self, email: &str) -> GatewayResult<bool> {
        let params = serde_json::json!({ "email_input": email });
        let value = self.rpc("email_exists", &params, None).await?;
        serde_json::from_value(value).map_err(GatewayError::from)
    }
}
