//! Profile photo storage and signed-URL management for the Donzelas core.
//!
//! Two pieces:
//! - [`PhotoGallery`]: upload, list and remove photos in the private
//!   per-user bucket folders, with the `cover_`/`photo_` naming scheme
//! - [`SignedUrlCache`]: per-owner cache of 24 h signed URLs with a
//!   background worker that re-signs them before they expire

mod cache;
mod error;
mod gallery;

pub use cache::{SignedPhotoUrl, SignedUrlCache};
pub use error::{PhotoError, PhotoResult};
pub use gallery::{object_path, pick_cover, PhotoGallery, PhotoKind, COVER_PREFIX, PHOTO_BUCKET};
