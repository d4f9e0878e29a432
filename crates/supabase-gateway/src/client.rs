//! HTTP client and URL builders for the Supabase API surface.

use crate::error::{classify_api_error, parse_error_message};
use crate::GatewayError;

/// Supabase API client covering auth, table, and storage endpoints.
#[derive(Clone)]
pub struct SupabaseGateway {
    pub(crate) http_client: reqwest::Client,
    pub(crate) api_url: String,
    pub(crate) anon_key: String,
}

impl SupabaseGateway {
    /// Create a new gateway.
    ///
    /// # Arguments
    /// * `api_url` - The Supabase project API URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - The Supabase anonymous API key
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    /// Build an auth endpoint URL.
    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    /// Build the REST API URL for a table.
    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    /// Build the REST API URL for a stored function.
    pub(crate) fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.api_url, function)
    }

    /// Build a storage endpoint URL.
    pub(crate) fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.api_url, path)
    }

    /// Bearer value for a request: the user's token, or the anon key for
    /// unauthenticated calls.
    pub(crate) fn bearer(&self, access_token: Option<&str>) -> String {
        format!("Bearer {}", access_token.unwrap_or(&self.anon_key))
    }

    /// Turn a non-2xx response into a classified gateway error.
    pub(crate) async fn api_error(
        &self,
        context: &str,
        response: reqwest::Response,
    ) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = parse_error_message(&body);
        tracing::error!(status = status, message = %message, "{} failed", context);
        classify_api_error(status, &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_creation() {
        let gateway = SupabaseGateway::new("https://test.supabase.co", "test-key");
        assert_eq!(gateway.api_url, "https://test.supabase.co");
        assert_eq!(gateway.anon_key, "test-key");
    }

    #[test]
    fn test_gateway_trims_trailing_slash() {
        let gateway = SupabaseGateway::new("https://test.supabase.co/", "test-key");
        assert_eq!(gateway.api_url, "https://test.supabase.co");
    }

    #[test]
    fn test_url_builders() {
        let gateway = SupabaseGateway::new("https://test.supabase.co", "test-key");
        assert_eq!(
            gateway.auth_url("token?grant_type=password"),
            "https://test.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(
            gateway.rest_url("profiles"),
            "https://test.supabase.co/rest/v1/profiles"
        );
        assert_eq!(
            gateway.rpc_url("email_exists"),
            "https://test.supabase.co/rest/v1/rpc/email_exists"
        );
        assert_eq!(
            gateway.storage_url("object/profile-photos/abc/cover.jpg"),
            "https://test.supabase.co/storage/v1/object/profile-photos/abc/cover.jpg"
        );
    }

    #[test]
    fn test_bearer_falls_back_to_anon_key() {
        let gateway = SupabaseGateway::new("https://test.supabase.co", "anon-key");
        assert_eq!(gateway.bearer(Some("user-token")), "Bearer user-token");
        assert_eq!(gateway.bearer(None), "Bearer anon-key");
    }
}
