//! Live message feed.
//!
//! The hosted realtime channel is replaced by a short-interval poll
//! watermarked by `created_at`: each sweep fetches the conversation rows
//! newer than the last seen timestamp and forwards them in order. Poll
//! failures are logged and the next tick retries; the feed only ends
//! when the handle shuts down.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use supabase_gateway::{GatewayError, SupabaseGateway};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::messages::{pair_filter, Message};
use crate::service::{ChatService, MESSAGES_TABLE};

const POLL_INTERVAL_MS: u64 = 1_500;
const FEED_CHANNEL_CAPACITY: usize = 64;

/// Handle for one live conversation feed.
///
/// New messages arrive through [`recv()`](Self::recv). Dropping the
/// handle or calling [`shutdown()`](Self::shutdown) stops the poll
/// worker.
pub struct MessageFeed {
    message_rx: mpsc::Receiver<Message>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MessageFeed {
    /// Next new message; `None` once the feed has stopped.
    pub async fn recv(&mut self) -> Option<Message> {
        self.message_rx.recv().await
    }

    /// Stop the poll worker. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ChatService {
    /// Start a live feed of new messages between `me` and `partner`.
    ///
    /// `since` seeds the watermark, typically the `created_at` of the
    /// newest message already displayed; `None` starts from now. Both
    /// incoming and own sent messages appear in the feed.
    pub fn subscribe_messages(
        &self,
        me: Uuid,
        partner: Uuid,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> MessageFeed {
        let (message_tx, message_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let gateway = Arc::clone(&self.gateway);
        let access_token = access_token.to_string();
        let mut watermark = since.unwrap_or_else(Utc::now);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(POLL_INTERVAL_MS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let batch =
                            fetch_newer(&gateway, me, partner, &access_token, watermark).await;
                        match batch {
                            Ok(new_messages) => {
                                for message in new_messages {
                                    if message.created_at > watermark {
                                        watermark = message.created_at;
                                    }
                                    if message_tx.send(message).await.is_err() {
                                        debug!("Message feed receiver dropped");
                                        return;
                                    }
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "Message feed poll failed");
                            }
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!(%me, %partner, "Message feed stopped");
        });

        MessageFeed {
            message_rx,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

/// Conversation rows strictly newer than `newer_than`, oldest first.
async fn fetch_newer(
    gateway: &SupabaseGateway,
    me: Uuid,
    partner: Uuid,
    access_token: &str,
    newer_than: DateTime<Utc>,
) -> Result<Vec<Message>, GatewayError> {
    // A "+00:00" offset would put a literal '+' into the query string,
    // which servers decode as a space; the Z suffix avoids that
    let watermark = newer_than.to_rfc3339_opts(SecondsFormat::Micros, true);
    let query = format!(
        "select=*&{}&created_at=gt.{}&order=created_at.asc",
        pair_filter(me, partner),
        watermark
    );
    gateway
        .select(MESSAGES_TABLE, &query, Some(access_token))
        .await
}
