use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::MessageType;

/// Identifier of a message; ids grow monotonically within a room.
pub type MessageId = u64;

/// A message as returned by the Campfire API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,

    /// Room the message was posted to.
    pub room_id: u64,

    /// Author of the message.
    ///
    /// Absent for timestamp and some system messages.
    #[serde(default)]
    pub user_id: Option<u64>,

    /// Message body, absent for messages that carry no text.
    #[serde(default)]
    pub body: Option<String>,

    /// Kind of message.
    #[serde(rename = "type")]
    pub r#type: MessageType,

    /// When the message was posted.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

/// Envelope for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// The wrapped message.
    pub message: Message,
}

/// Envelope for a list of messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageList {
    /// Messages in ascending id order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Request body for posting to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakParams {
    /// The message to post.
    pub message: SpeakBody,
}

/// The message part of [`SpeakParams`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakBody {
    /// `TextMessage` or `PasteMessage`.
    #[serde(rename = "type")]
    pub r#type: MessageType,

    /// The literal text to post.
    pub body: String,
}

impl SpeakParams {
    /// A plain text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            message: SpeakBody {
                r#type: MessageType::TextMessage,
                body: body.into(),
            },
        }
    }

    /// A paste.
    pub fn paste(body: impl Into<String>) -> Self {
        Self {
            message: SpeakBody {
                r#type: MessageType::PasteMessage,
                body: body.into(),
            },
        }
    }
}
