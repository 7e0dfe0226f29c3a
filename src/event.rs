//! Events produced by polling a room.

use time::OffsetDateTime;

use crate::types::{Message, MessageId, MessageType};

/// A message observed in a room, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What kind of message this is; handlers are keyed on it.
    pub kind: MessageType,
    /// Subdomain of the account the room belongs to.
    pub subdomain: String,
    /// Name of the room.
    pub room: String,
    /// Id of the underlying message.
    pub message_id: MessageId,
    /// Message body, when the message carries text.
    pub body: Option<String>,
    /// Author, when known.
    pub user_id: Option<u64>,
    /// When the message was posted.
    pub created_at: OffsetDateTime,
}

impl Event {
    /// Build an event from a polled message.
    pub fn from_message(subdomain: &str, room: &str, message: &Message) -> Self {
        Self {
            kind: message.r#type,
            subdomain: subdomain.to_string(),
            room: room.to_string(),
            message_id: message.id,
            body: message.body.clone(),
            user_id: message.user_id,
            created_at: message.created_at,
        }
    }

    /// The body, or the empty string.
    pub fn text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// `subdomain/room`, used in logs and notifications.
    pub fn location(&self) -> String {
        format!("{}/{}", self.subdomain, self.room)
    }

    /// Case-insensitive check for any of `keywords` in the body.
    ///
    /// An empty keyword list matches every event.
    pub fn mentions_any(&self, keywords: &[String]) -> bool {
        if keywords.is_empty() {
            return true;
        }
        let body = self.text().to_lowercase();
        keywords
            .iter()
            .any(|keyword| body.contains(&keyword.to_lowercase()))
    }
}

#[cfg(test)]
pub(crate) fn test_event(kind: MessageType, body: Option<&str>) -> Event {
    Event {
        kind,
        subdomain: "acme".to_string(),
        room: "watercooler".to_string(),
        message_id: 1,
        body: body.map(str::to_string),
        user_id: Some(7),
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn from_message_copies_payload() {
        let message = Message {
            id: 88,
            room_id: 2,
            user_id: Some(4),
            body: Some("deploy done".to_string()),
            r#type: MessageType::TextMessage,
            created_at: datetime!(2013-02-15 19:28:33 UTC),
        };
        let event = Event::from_message("acme", "ops", &message);
        assert_eq!(event.kind, MessageType::TextMessage);
        assert_eq!(event.location(), "acme/ops");
        assert_eq!(event.message_id, 88);
        assert_eq!(event.text(), "deploy done");
        assert_eq!(event.user_id, Some(4));
    }

    #[test]
    fn keyword_matching_ignores_case() {
        let event = test_event(MessageType::TextMessage, Some("Ping @Robert please"));
        assert!(event.mentions_any(&["robert".to_string()]));
        assert!(!event.mentions_any(&["alice".to_string()]));
        assert!(event.mentions_any(&[]));

        let empty = test_event(MessageType::EnterMessage, None);
        assert!(!empty.mentions_any(&["robert".to_string()]));
    }
}
