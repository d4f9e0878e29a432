//! Conversation listing, message history, and sends.

use std::collections::HashSet;
use std::sync::Arc;

use profile_photos::{object_path, pick_cover, PhotoGallery, PHOTO_BUCKET};
use serde::Deserialize;
use supabase_gateway::{GatewayError, SupabaseGateway};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::messages::{pair_filter, participant_filter, Conversation, Message};

pub(crate) const MESSAGES_TABLE: &str = "messages";
const PROFILES_TABLE: &str = "profiles";

/// How long conversation-list cover photo URLs stay valid.
const COVER_URL_TTL_SECS: u32 = 60 * 60;

#[derive(Debug, Deserialize)]
struct ParticipantRow {
    sender_id: Uuid,
    receiver_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct PartnerRow {
    id: Uuid,
    name: Option<String>,
    account_type: Option<String>,
}

/// Messaging operations against the backend.
pub struct ChatService {
    pub(crate) gateway: Arc<SupabaseGateway>,
    gallery: PhotoGallery,
}

impl ChatService {
    pub fn new(gateway: Arc<SupabaseGateway>) -> Self {
        let gallery = PhotoGallery::new(Arc::clone(&gateway));
        Self { gateway, gallery }
    }

    /// Conversation partners of `me`, sorted by name.
    ///
    /// Partners without a readable profile row are skipped; a missing or
    /// unsignable cover photo just leaves `photo_url` empty.
    pub async fn list_conversations(
        &self,
        me: Uuid,
        access_token: &str,
    ) -> ChatResult<Vec<Conversation>> {
        let query = format!(
            "select=sender_id,receiver_id&{}&order=created_at.desc",
            participant_filter(me)
        );
        let rows: Vec<ParticipantRow> = self
            .gateway
            .select(MESSAGES_TABLE, &query, Some(access_token))
            .await?;

        let mut conversations = Vec::new();
        for partner_id in partner_ids(me, &rows) {
            match self.load_conversation(partner_id, access_token).await {
                Ok(Some(conversation)) => conversations.push(conversation),
                Ok(None) => {}
                Err(err) => {
                    warn!(%partner_id, error = %err, "Skipping conversation partner");
                }
            }
        }

        conversations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(conversations)
    }

    /// Message history between two users, oldest first.
    pub async fn fetch_messages(
        &self,
        me: Uuid,
        partner: Uuid,
        access_token: &str,
    ) -> ChatResult<Vec<Message>> {
        let query = format!("select=*&{}&order=created_at.asc", pair_filter(me, partner));
        let messages = self
            .gateway
            .select(MESSAGES_TABLE, &query, Some(access_token))
            .await?;
        Ok(messages)
    }

    /// Insert one message row with a client-side timestamp and return it.
    ///
    /// Content is trimmed first; sending nothing is rejected.
    pub async fn send_message(
        &self,
        sender: Uuid,
        receiver: Uuid,
        content: &str,
        access_token: &str,
    ) -> ChatResult<Message> {
        let message = build_message(sender, receiver, content)?;
        let body = serde_json::to_value(&message).map_err(GatewayError::from)?;
        self.gateway
            .insert(MESSAGES_TABLE, &body, Some(access_token))
            .await?;

        info!(sender_id = %sender, receiver_id = %receiver, "Message sent");
        Ok(message)
    }

    async fn load_conversation(
        &self,
        partner_id: Uuid,
        access_token: &str,
    ) -> ChatResult<Option<Conversation>> {
        let query = format!("id=eq.{partner_id}&select=id,name,account_type");
        let rows: Vec<PartnerRow> = self
            .gateway
            .select(PROFILES_TABLE, &query, Some(access_token))
            .await?;

        let Some(partner) = rows.into_iter().next() else {
            debug!(%partner_id, "Partner has no profile row");
            return Ok(None);
        };

        let photo_url = self.cover_photo_url(partner_id, access_token).await;

        Ok(Some(Conversation {
            partner_id: partner.id,
            name: partner.name.unwrap_or_default(),
            account_type: partner.account_type,
            photo_url,
        }))
    }

    /// Best-effort short-lived signed URL for the partner's cover photo.
    async fn cover_photo_url(&self, partner_id: Uuid, access_token: &str) -> Option<String> {
        let file_names = match self.gallery.list_photos(partner_id, access_token).await {
            Ok(file_names) => file_names,
            Err(err) => {
                debug!(%partner_id, error = %err, "Could not list partner photos");
                return None;
            }
        };
        let cover = pick_cover(&file_names)?;

        match self
            .gateway
            .create_signed_url(
                PHOTO_BUCKET,
                &object_path(partner_id, cover),
                COVER_URL_TTL_SECS,
                Some(access_token),
            )
            .await
        {
            Ok(url) => Some(url),
            Err(err) => {
                debug!(%partner_id, error = %err, "Could not sign cover photo URL");
                None
            }
        }
    }
}

/// Validate and build one outgoing message row.
fn build_message(sender: Uuid, receiver: Uuid, content: &str) -> ChatResult<Message> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    Ok(Message {
        id: None,
        sender_id: sender,
        receiver_id: receiver,
        content: content.to_string(),
        created_at: chrono::Utc::now(),
    })
}

/// Distinct partner ids from raw participant rows, first-seen order.
fn partner_ids(me: Uuid, rows: &[ParticipantRow]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for row in rows {
        let partner = if row.sender_id == me {
            row.receiver_id
        } else {
            row.sender_id
        };
        if partner != me && seen.insert(partner) {
            ids.push(partner);
        }
    }
    ids
}
