//! Signed-URL cache with proactive renewal.
//!
//! The photo bucket is private, so consumers receive time-limited signed
//! URLs. URLs are issued for 24 h and cached per owner; a background
//! worker wakes hourly and re-signs every URL of an owner once any of
//! them gets within 3 h of expiry, so a held URL never goes dark
//! mid-session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use supabase_gateway::SupabaseGateway;
use tokio::sync::oneshot;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PhotoError, PhotoResult};
use crate::gallery::{object_path, PHOTO_BUCKET};

const SIGNED_URL_TTL_SECS: u32 = 60 * 60 * 24;
const RENEWAL_CHECK_INTERVAL_SECS: u64 = 60 * 60;
const RENEWAL_WINDOW_SECS: i64 = 3 * 60 * 60;

/// One signed URL for a stored photo, valid until `expires_at`.
#[derive(Debug, Clone, Serialize)]
pub struct SignedPhotoUrl {
    pub file_name: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

type UrlsByOwner = HashMap<Uuid, Vec<SignedPhotoUrl>>;

/// Per-owner cache of signed photo URLs.
pub struct SignedUrlCache {
    gateway: Arc<SupabaseGateway>,
    entries: Arc<Mutex<UrlsByOwner>>,
    /// Token used when signing. Set on sign-in, dropped with `clear()`.
    access_token: Arc<Mutex<Option<String>>>,
    /// Shutdown signal sender for the renewal worker.
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl SignedUrlCache {
    pub fn new(gateway: Arc<SupabaseGateway>) -> Self {
        Self {
            gateway,
            entries: Arc::new(Mutex::new(HashMap::new())),
            access_token: Arc::new(Mutex::new(None)),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Set the access token used for signing requests.
    pub fn set_access_token(&self, access_token: &str) {
        *self.access_token.lock().unwrap() = Some(access_token.to_string());
    }

    /// Drop all cached URLs and the signing token.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        *self.access_token.lock().unwrap() = None;
    }

    /// Drop the cached URLs of one owner.
    pub fn invalidate(&self, owner: Uuid) {
        self.entries.lock().unwrap().remove(&owner);
    }

    /// Signed URLs for `file_names`, one per file, reusing the cached
    /// set while it is fresh.
    ///
    /// Regeneration is all-or-nothing per owner: the first file that
    /// fails to sign aborts the call and nothing is cached.
    pub async fn get_urls(
        &self,
        owner: Uuid,
        file_names: &[String],
    ) -> PhotoResult<Vec<SignedPhotoUrl>> {
        if file_names.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(fresh) = cached_fresh(&self.entries, owner, file_names, Utc::now()) {
            return Ok(fresh);
        }

        let access_token = self.access_token.lock().unwrap().clone();
        let urls = sign_all(&self.gateway, access_token.as_deref(), owner, file_names).await?;
        self.entries.lock().unwrap().insert(owner, urls.clone());
        Ok(urls)
    }

    /// Spawn the renewal worker. The worker stops when the cache is
    /// dropped; starting again replaces any previous worker.
    pub fn start_renewal_worker(&self) {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().unwrap() = Some(shutdown_tx);

        let gateway = Arc::clone(&self.gateway);
        let entries = Arc::clone(&self.entries);
        let access_token = Arc::clone(&self.access_token);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(RENEWAL_CHECK_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        renew_expiring(&gateway, &entries, &access_token).await;
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!("Signed URL renewal worker stopped");
        });
    }
}

impl Drop for SignedUrlCache {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// The cached entry for `owner`, provided it covers exactly `file_names`
/// and no URL is close to expiry.
fn cached_fresh(
    entries: &Mutex<UrlsByOwner>,
    owner: Uuid,
    file_names: &[String],
    now: DateTime<Utc>,
) -> Option<Vec<SignedPhotoUrl>> {
    let entries = entries.lock().unwrap();
    let cached = entries.get(&owner)?;

    let same_files = cached.len() == file_names.len()
        && cached
            .iter()
            .zip(file_names)
            .all(|(entry, file_name)| entry.file_name == *file_name);
    if !same_files || cached.iter().any(|entry| needs_renewal(entry.expires_at, now)) {
        return None;
    }

    Some(cached.clone())
}

/// Sign one URL per file, aborting on the first failure.
async fn sign_all(
    gateway: &SupabaseGateway,
    access_token: Option<&str>,
    owner: Uuid,
    file_names: &[String],
) -> PhotoResult<Vec<SignedPhotoUrl>> {
    let mut urls = Vec::with_capacity(file_names.len());
    for file_name in file_names {
        let path = object_path(owner, file_name);
        let url = gateway
            .create_signed_url(PHOTO_BUCKET, &path, SIGNED_URL_TTL_SECS, access_token)
            .await
            .map_err(|source| PhotoError::SignFailed {
                file_name: file_name.clone(),
                source,
            })?;
        urls.push(SignedPhotoUrl {
            file_name: file_name.clone(),
            url,
            expires_at: Utc::now() + chrono::Duration::seconds(i64::from(SIGNED_URL_TTL_SECS)),
        });
    }
    Ok(urls)
}

/// One renewal sweep: regenerate every URL of each owner with any entry
/// inside the renewal window. Failures keep the stale entries and are
/// retried on the next tick.
async fn renew_expiring(
    gateway: &SupabaseGateway,
    entries: &Mutex<UrlsByOwner>,
    access_token: &Mutex<Option<String>>,
) {
    let now = Utc::now();
    let due: Vec<(Uuid, Vec<String>)> = {
        let entries = entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, urls)| urls.iter().any(|entry| needs_renewal(entry.expires_at, now)))
            .map(|(owner, urls)| {
                let file_names = urls.iter().map(|entry| entry.file_name.clone()).collect();
                (*owner, file_names)
            })
            .collect()
    };

    if due.is_empty() {
        return;
    }

    debug!(owners = due.len(), "Renewing signed photo URLs close to expiry");
    let access_token = access_token.lock().unwrap().clone();
    for (owner, file_names) in due {
        match sign_all(gateway, access_token.as_deref(), owner, &file_names).await {
            Ok(urls) => {
                entries.lock().unwrap().insert(owner, urls);
            }
            Err(err) => {
                warn!(%owner, error = %err, "Signed URL renewal failed");
            }
        }
    }
}

/// Whether a URL expiring at `expires_at` is due for regeneration.
fn needs_renewal(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at.signed_duration_since(now).num_seconds() < RENEWAL_WINDOW_SECS
}
