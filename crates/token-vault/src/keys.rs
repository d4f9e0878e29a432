//! Storage key constants.

/// Vault keys used by the client core
pub struct VaultKeys;

impl VaultKeys {
    /// Supabase access token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Supabase refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "session_meta";
}
