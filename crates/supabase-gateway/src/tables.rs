//! PostgREST table and stored-function operations.

use crate::{GatewayError, GatewayResult, SupabaseGateway};
use serde::de::DeserializeOwned;

/// Parse an RPC response body. Void functions return an empty body.
fn parse_rpc_body(text: &str) -> GatewayResult<serde_json::Value> {
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(text).map_err(GatewayError::from)
}

impl SupabaseGateway {
    /// Read rows from a table.
    ///
    /// `query` is a PostgREST query string, e.g.
    /// `id=eq.<uuid>&select=*` or `select=*&order=created_at.desc`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
        access_token: Option<&str>,
    ) -> GatewayResult<Vec<T>> {
        let url = format!("{}?{}", self.rest_url(table), query);

        tracing::debug!(table = table, "Selecting rows from Supabase");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Table select", response).await);
        }

        let rows: Vec<T> = response.json().await?;
        Ok(rows)
    }

    /// Insert rows into a table.
    pub async fn insert(
        &self,
        table: &str,
        body: &serde_json::Value,
        access_token: Option<&str>,
    ) -> GatewayResult<()> {
        let url = self.rest_url(table);

        tracing::debug!(table = table, "Inserting rows into Supabase");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Table insert", response).await);
        }

        Ok(())
    }

    /// Insert or update rows, merging on conflict.
    ///
    /// `on_conflict` names the unique columns to merge on; when `None`
    /// the primary key is used.
    pub async fn upsert(
        &self,
        table: &str,
        on_conflict: Option<&str>,
        body: &serde_json::Value,
        access_token: Option<&str>,
    ) -> GatewayResult<()> {
        let url = match on_conflict {
            Some(columns) => format!("{}?on_conflict={}", self.rest_url(table), columns),
            None => self.rest_url(table),
        };

        tracing::debug!(table = table, "Upserting rows into Supabase");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Table upsert", response).await);
        }

        Ok(())
    }

    /// Update rows matching a PostgREST filter, e.g. `id=eq.<uuid>`.
    pub async fn update(
        &self,
        table: &str,
        filter: &str,
        body: &serde_json::Value,
        access_token: Option<&str>,
    ) -> GatewayResult<()> {
        let url = format!("{}?{}", self.rest_url(table), filter);

        tracing::debug!(table = table, "Updating rows in Supabase");

        let response = self
            .http_client
            .patch(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Table update", response).await);
        }

        Ok(())
    }

    /// Delete rows matching a PostgREST filter.
    pub async fn delete_rows(
        &self,
        table: &str,
        filter: &str,
        access_token: Option<&str>,
    ) -> GatewayResult<()> {
        let url = format!("{}?{}", self.rest_url(table), filter);

        tracing::debug!(table = table, "Deleting rows from Supabase");

        let response = self
            .http_client
            .delete(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Table delete", response).await);
        }

        Ok(())
    }

    /// Call a stored function.
    pub async fn rpc(
        &self,
        function: &str,
        params: &serde_json::Value,
        access_token: Option<&str>,
    ) -> GatewayResult<serde_json::Value> {
        let url = self.rpc_url(function);

        tracing::debug!(function = function, "Calling Supabase stored function");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer(access_token))
            .header("Content-Type", "application/json")
            .json(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.api_error("Stored function call", response).await);
        }

        let text = response.text().await?;
        parse_rpc_body(&text)
    }
}
