//! Storage API operations: upload, list, remove, signed URLs.

use crate::{GatewayResult, SupabaseGateway};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// A stored object, as returned by the list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectInfo {
    /// Object name relative to the listed prefix
    pub name: String,
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Wire shape of a signed URL response.
#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseGateway {
    /// Upload an object.
    ///
    /// With `upsert`, an existing object at the same path is replaced.
    pub async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
        access_token: Option<&str>,
    ) -> GatewayResult<()> {
        let url = self.storage_url(&format!("object/{}/{}", bucket, path));

        tracing::debug!(bucket = bucket, path = path, "Uploading object to Supabase");

        let mut request = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", content_type)
            .body(bytes);

        if upsert {
            request = request.header("x-upsert", "true");
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(self.api_error("Object upload", response).await);
        }

        Ok(())
    }

    /// List objects in a bucket under a prefix.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        access_token: Option<&str>,
    ) -> GatewayResult<Vec<ObjectInfo>> {
        let url = self.storage_url(&format!("object/list/{}", bucket));
        let body = serde_json::json!({
            "prefix": prefix,
            "limit": 100,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });

        tracing::debug!(bucket = bucket, prefix = prefix, "Listing objects in Supabase");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Object list", response).await);
        }

        let objects: Vec<ObjectInfo> = response.json().await?;
        Ok(objects)
    }

    /// Remove objects from a bucket.
    pub async fn remove_objects(
        &self,
        bucket: &str,
        paths: &[String],
        access_token: Option<&str>,
    ) -> GatewayResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let url = self.storage_url(&format!("object/{}", bucket));
        let body = serde_json::json!({ "prefixes": paths });

        tracing::debug!(bucket = bucket, count = paths.len(), "Removing objects from Supabase");

        let response = self
            .http_client
            .delete(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Object removal", response).await);
        }

        Ok(())
    }

    /// Create a time-limited signed URL for an object in a private bucket.
    ///
    /// Returns an absolute URL.
    pub async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in_seconds: u32,
        access_token: Option<&str>,
    ) -> GatewayResult<String> {
        let url = self.storage_url(&format!("object/sign/{}/{}", bucket, path));
        let body = serde_json::json!({ "expiresIn": expires_in_seconds });

        tracing::debug!(bucket = bucket, path = path, "Signing object URL");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Signed URL creation", response).await);
        }

        let signed: SignedUrlResponse = response.json().await?;
        Ok(self.join_signed_url(&signed.signed_url))
    }

    /// Public URL for an object in a public bucket. No request is made.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        self.storage_url(&format!("object/public/{}/{}", bucket, path))
    }

    /// The sign endpoint returns a path relative to `/storage/v1`.
    fn join_signed_url(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        format!("{}/storage/v1/{}", self.api_url, relative)
    }
}
