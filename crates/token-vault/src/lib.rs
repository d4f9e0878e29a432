//! Token storage abstraction for the Donzelas client core.
//!
//! Sessions are persisted through a pluggable [`TokenStorage`] backend:
//! - [`FileTokenStore`]: JSON file under the base directory (default)
//! - [`MemoryTokenStore`]: in-process map for tests and ephemeral sessions

mod file;
mod keys;
mod memory;
mod traits;
mod vault;

pub use file::FileTokenStore;
pub use keys::VaultKeys;
pub use memory::MemoryTokenStore;
pub use traits::TokenStorage;
pub use vault::{SessionVault, StoredSessionMeta};

use thiserror::Error;

/// Error type for token storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for token storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
