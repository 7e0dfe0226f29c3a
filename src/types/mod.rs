// Public modules
pub mod message;
pub mod message_type;
pub mod room_info;
pub mod user;

// Re-exports
pub use message::{Message, MessageEnvelope, MessageId, MessageList, SpeakBody, SpeakParams};
pub use message_type::MessageType;
pub use room_info::{RoomInfo, RoomList};
pub use user::{User, UserEnvelope};
