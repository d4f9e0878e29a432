//! Messaging for the Donzelas core.
//!
//! Conversations are pairs of users exchanging rows in the `messages`
//! table. [`ChatService`] lists conversation partners (joined with
//! profile data and a signed cover photo URL), fetches history, and
//! sends messages; [`MessageFeed`] delivers new rows of one conversation
//! as they arrive.

mod error;
mod feed;
mod messages;
mod service;

pub use error::{ChatError, ChatResult};
pub use feed::MessageFeed;
pub use messages::{Conversation, Message};
pub use service::ChatService;
