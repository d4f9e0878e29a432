//! Chat rows and PostgREST filter builders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One `messages` table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Row id; `None` for a message built client-side before insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A chat partner with what the conversation list displays.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub partner_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
    /// Short-lived signed URL of the partner's cover photo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Filter matching every message `user` participates in.
pub(crate) fn participant_filter(user: Uuid) -> String {
    format!("or=(sender_id.eq.{user},receiver_id.eq.{user})")
}

/// Filter matching both directions of one conversation.
pub(crate) fn pair_filter(a: Uuid, b: Uuid) -> String {
    format!("or=(and(sender_id.eq.{a},receiver_id.eq.{b}),and(sender_id.eq.{b},receiver_id.eq.{a}))")
}
