use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The `type` field of a Campfire message.
///
/// Message types the client does not recognise deserialize to
/// [`MessageType::Unknown`] rather than failing the whole poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    /// A plain chat line.
    TextMessage,
    /// A multi-line paste.
    PasteMessage,
    /// A sound played into the room.
    SoundMessage,
    /// A tweet shared into the room.
    TweetMessage,
    /// A user entered the room.
    EnterMessage,
    /// A user left the room.
    LeaveMessage,
    /// A user was removed from the room.
    KickMessage,
    /// The room topic changed.
    TopicChangeMessage,
    /// A periodic timestamp marker.
    TimestampMessage,
    /// The room was locked.
    LockMessage,
    /// The room was unlocked.
    UnlockMessage,
    /// A file upload.
    UploadMessage,
    /// Guest access was enabled.
    AllowGuestsMessage,
    /// Guest access was disabled.
    DisallowGuestsMessage,
    /// A user went idle.
    IdleMessage,
    /// A user came back from idle.
    UnidleMessage,
    /// A system notice.
    SystemMessage,
    /// Any type this client does not know about.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Every known message type, in declaration order.
    pub const ALL: &'static [MessageType] = &[
        MessageType::TextMessage,
        MessageType::PasteMessage,
        MessageType::SoundMessage,
        MessageType::TweetMessage,
        MessageType::EnterMessage,
        MessageType::LeaveMessage,
        MessageType::KickMessage,
        MessageType::TopicChangeMessage,
        MessageType::TimestampMessage,
        MessageType::LockMessage,
        MessageType::UnlockMessage,
        MessageType::UploadMessage,
        MessageType::AllowGuestsMessage,
        MessageType::DisallowGuestsMessage,
        MessageType::IdleMessage,
        MessageType::UnidleMessage,
        MessageType::SystemMessage,
        MessageType::Unknown,
    ];

    /// The wire name of this message type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TextMessage => "TextMessage",
            MessageType::PasteMessage => "PasteMessage",
            MessageType::SoundMessage => "SoundMessage",
            MessageType::TweetMessage => "TweetMessage",
            MessageType::EnterMessage => "EnterMessage",
            MessageType::LeaveMessage => "LeaveMessage",
            MessageType::KickMessage => "KickMessage",
            MessageType::TopicChangeMessage => "TopicChangeMessage",
            MessageType::TimestampMessage => "TimestampMessage",
            MessageType::LockMessage => "LockMessage",
            MessageType::UnlockMessage => "UnlockMessage",
            MessageType::UploadMessage => "UploadMessage",
            MessageType::AllowGuestsMessage => "AllowGuestsMessage",
            MessageType::DisallowGuestsMessage => "DisallowGuestsMessage",
            MessageType::IdleMessage => "IdleMessage",
            MessageType::UnidleMessage => "UnidleMessage",
            MessageType::SystemMessage => "SystemMessage",
            MessageType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    /// Parse a message type by its wire name.
    ///
    /// The trailing `Message` may be omitted and case is ignored, so `text`,
    /// `Text` and `TextMessage` all name [`MessageType::TextMessage`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        MessageType::ALL
            .iter()
            .copied()
            .find(|kind| {
                let name = kind.as_str().to_lowercase();
                name == wanted || name.strip_suffix("message") == Some(wanted.as_str())
            })
            .ok_or_else(|| {
                Error::validation(
                    format!("unknown message type: {s}"),
                    Some("type".to_string()),
                )
            })
    }
}
