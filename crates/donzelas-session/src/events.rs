//! Session lifecycle events.

use serde::Serialize;
use uuid::Uuid;

/// Events emitted by the session manager as the session changes.
///
/// Subscribers receive these over a broadcast channel; a slow subscriber
/// may miss events, so consumers needing ground truth should read the
/// manager's state instead of replaying the stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A sign-in completed or a stored session was restored.
    SignedIn {
        user_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        profile_complete: bool,
    },
    /// The session ended (explicit sign-out, expiry, or inactivity).
    SignedOut,
    /// The backend no longer recognizes the stored user.
    UserDeleted,
}
