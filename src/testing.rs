//! An in-memory [`ChatApi`] for tests.
//!
//! [`MockApi`] records every call and replays scripted poll results, so
//! routing and dispatch can be checked without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::client::{ChatApi, advance_cursor};
use crate::error::{Error, Result};
use crate::types::{Message, MessageId, MessageType, RoomInfo, User};

/// One recorded call against a [`MockApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `me()`
    Me,
    /// `list_rooms()`
    ListRooms,
    /// `post_message(room, body)`
    PostMessage {
        /// Room name.
        room: String,
        /// Message body.
        body: String,
    },
    /// `post_paste(room, body)`
    PostPaste {
        /// Room name.
        room: String,
        /// Paste body.
        body: String,
    },
    /// `poll_events(room, since)`
    Poll {
        /// Room name.
        room: String,
        /// Cursor passed in.
        since: Option<MessageId>,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    rooms: Vec<RoomInfo>,
    polls: HashMap<String, VecDeque<Result<Vec<Message>>>>,
    post_error: Option<Error>,
    me_error: Option<Error>,
    next_id: MessageId,
}

/// A scripted chat service.
pub struct MockApi {
    subdomain: String,
    state: Mutex<MockState>,
}

impl MockApi {
    /// A mock for `subdomain` with no rooms and no scripted polls.
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            state: Mutex::new(MockState {
                next_id: 1000,
                ..MockState::default()
            }),
        }
    }

    /// Rooms returned by `list_rooms`.
    pub fn with_rooms(self, rooms: Vec<RoomInfo>) -> Self {
        self.state().rooms = rooms;
        self
    }

    /// Queue the result of the next poll of `room`.
    ///
    /// Once a room's queue is empty, polls return no messages.
    pub fn push_poll(&self, room: &str, result: Result<Vec<Message>>) {
        self.state()
            .polls
            .entry(room.to_string())
            .or_default()
            .push_back(result);
    }

    /// Make every post fail with `error`.
    pub fn fail_posts(&self, error: Error) {
        self.state().post_error = Some(error);
    }

    /// Make `me` fail with `error`, as for a rejected token.
    pub fn fail_me(&self, error: Error) {
        self.state().me_error = Some(error);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Only the poll calls made so far.
    pub fn polls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Poll { .. }))
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn post(&self, call: Call, kind: MessageType, body: &str) -> Result<Message> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(err) = state.post_error.clone() {
            return Err(err);
        }
        state.next_id += 1;
        Ok(message(state.next_id, kind, body))
    }
}

/// A message with fixed metadata, for scripting polls.
pub fn message(id: MessageId, kind: MessageType, body: &str) -> Message {
    Message {
        id,
        room_id: 1,
        user_id: Some(1),
        body: if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        },
        r#type: kind,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

#[async_trait]
impl ChatApi for MockApi {
    fn subdomain(&self) -> &str {
        &self.subdomain
    }

    async fn me(&self) -> Result<User> {
        let mut state = self.state();
        state.calls.push(Call::Me);
        if let Some(err) = state.me_error.clone() {
            return Err(err);
        }
        Ok(User {
            id: 1,
            name: "Test User".to_string(),
            email_address: None,
            admin: false,
        })
    }

    async fn list_rooms(&self) -> Result<Vec<RoomInfo>> {
        let mut state = self.state();
        state.calls.push(Call::ListRooms);
        Ok(state.rooms.clone())
    }

    async fn post_message(&self, room: &str, text: &str) -> Result<Message> {
        self.post(
            Call::PostMessage {
                room: room.to_string(),
                body: text.to_string(),
            },
            MessageType::TextMessage,
            text,
        )
    }

    async fn post_paste(&self, room: &str, text: &str) -> Result<Message> {
        self.post(
            Call::PostPaste {
                room: room.to_string(),
                body: text.to_string(),
            },
            MessageType::PasteMessage,
            text,
        )
    }

    async fn poll_events(
        &self,
        room: &str,
        since: Option<MessageId>,
    ) -> Result<(Vec<Message>, Option<MessageId>)> {
        let mut state = self.state();
        state.calls.push(Call::Poll {
            room: room.to_string(),
            since,
        });
        let next = state
            .polls
            .get_mut(room)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()));
        drop(state);
        next.map(|messages| advance_cursor(messages, since))
    }
}
