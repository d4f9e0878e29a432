//! Profile photo storage operations.
//!
//! Photos live in the private `profile-photos` bucket under one folder per
//! user (`{owner_id}/{file_name}`). The first photo of a profile is the
//! cover and carries a `cover_` file prefix; every other photo is named
//! `photo_{timestamp}.{ext}`.

use std::sync::Arc;

use supabase_gateway::{ObjectInfo, SupabaseGateway};
use tracing::debug;
use uuid::Uuid;

use crate::error::PhotoResult;

/// Storage bucket holding all profile photos.
pub const PHOTO_BUCKET: &str = "profile-photos";

/// File prefix marking the cover photo of a profile.
pub const COVER_PREFIX: &str = "cover_";

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Which slot a photo occupies in a profile gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoKind {
    /// The profile's primary photo, shown on cards and chat lists.
    Cover,
    /// Any additional gallery photo.
    Gallery,
}

impl PhotoKind {
    fn file_prefix(self) -> &'static str {
        match self {
            PhotoKind::Cover => "cover",
            PhotoKind::Gallery => "photo",
        }
    }
}

/// Upload, list and remove operations for a user's photo folder.
pub struct PhotoGallery {
    gateway: Arc<SupabaseGateway>,
}

impl PhotoGallery {
    pub fn new(gateway: Arc<SupabaseGateway>) -> Self {
        Self { gateway }
    }

    /// Upload photo bytes under a fresh timestamped name and return that
    /// name. Existing objects with the same name are overwritten.
    pub async fn upload_photo(
        &self,
        owner: Uuid,
        bytes: Vec<u8>,
        extension: &str,
        kind: PhotoKind,
        access_token: &str,
    ) -> PhotoResult<String> {
        let file_name = build_file_name(kind, extension, chrono::Utc::now().timestamp_millis());
        let path = object_path(owner, &file_name);
        self.gateway
            .upload_object(
                PHOTO_BUCKET,
                &path,
                bytes,
                content_type_for(&file_name),
                true,
                Some(access_token),
            )
            .await?;
        debug!(%owner, file_name, "Uploaded profile photo");
        Ok(file_name)
    }

    /// List the image files in the owner's folder, cover first.
    pub async fn list_photos(&self, owner: Uuid, access_token: &str) -> PhotoResult<Vec<String>> {
        let objects = self
            .gateway
            .list_objects(PHOTO_BUCKET, &owner.to_string(), Some(access_token))
            .await?;
        Ok(gallery_file_names(objects))
    }

    /// Remove the named files from the owner's folder.
    pub async fn remove_photos(
        &self,
        owner: Uuid,
        file_names: &[String],
        access_token: &str,
    ) -> PhotoResult<()> {
        let paths: Vec<String> = file_names
            .iter()
            .map(|file_name| object_path(owner, file_name))
            .collect();
        self.gateway
            .remove_objects(PHOTO_BUCKET, &paths, Some(access_token))
            .await?;
        debug!(%owner, removed = file_names.len(), "Removed profile photos");
        Ok(())
    }
}

/// The cover photo among `file_names`: the first `cover_`-prefixed file,
/// falling back to the first file at all.
pub fn pick_cover(file_names: &[String]) -> Option<&str> {
    file_names
        .iter()
        .find(|file_name| file_name.starts_with(COVER_PREFIX))
        .or_else(|| file_names.first())
        .map(String::as_str)
}

/// Full object path of one photo inside the bucket.
pub fn object_path(owner: Uuid, file_name: &str) -> String {
    format!("{owner}/{file_name}")
}

fn build_file_name(kind: PhotoKind, extension: &str, timestamp_ms: i64) -> String {
    format!(
        "{}_{}.{}",
        kind.file_prefix(),
        timestamp_ms,
        normalize_extension(extension)
    )
}

fn normalize_extension(extension: &str) -> String {
    let trimmed = extension
        .trim()
        .trim_start_matches('.')
        .to_ascii_lowercase();
    if trimmed.is_empty() {
        "jpg".to_string()
    } else {
        trimmed
    }
}

fn gallery_file_names(objects: Vec<ObjectInfo>) -> Vec<String> {
    let mut file_names: Vec<String> = objects
        .into_iter()
        .map(|object| object.name)
        .filter(|file_name| is_image_file(file_name))
        .collect();
    file_names.sort_by_key(|file_name| !file_name.starts_with(COVER_PREFIX));
    file_names
}

fn is_image_file(file_name: &str) -> bool {
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return false;
    };
    IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
}

fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension)
        .unwrap_or_default();
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
