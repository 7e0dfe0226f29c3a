use serde::{Deserialize, Serialize};

/// A room as listed by the Campfire API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Numeric room id used in room URLs.
    pub id: u64,

    /// Display name of the room.
    pub name: String,

    /// Current topic.
    #[serde(default)]
    pub topic: Option<String>,

    /// Maximum number of occupants.
    #[serde(default)]
    pub membership_limit: Option<u32>,
}

/// Envelope returned by `rooms.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomList {
    /// Rooms visible to the token.
    #[serde(default)]
    pub rooms: Vec<RoomInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_list_deserialization() {
        let json = serde_json::json!({
            "rooms": [
                {"id": 1, "name": "watercooler", "topic": "anything goes", "membership_limit": 60},
                {"id": 2, "name": "ops"}
            ]
        });
        let list: RoomList = serde_json::from_value(json).unwrap();
        assert_eq!(list.rooms.len(), 2);
        assert_eq!(list.rooms[0].topic.as_deref(), Some("anything goes"));
        assert_eq!(list.rooms[1].name, "ops");
        assert!(list.rooms[1].topic.is_none());
    }
}
