//! Core records: servers, rooms, index entries, and stats snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blocklist::Blocklist;
use crate::detector::LanguageDetector;

/// A discovered homeserver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatrixServer {
    pub name: String,
    /// Resolved federation base URL, empty until discovery succeeds.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub indexable: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "MatrixServerContacts::is_empty")]
    pub contacts: MatrixServerContacts,
}

/// MSC1929 contact details of a homeserver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatrixServerContacts {
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub mxids: Vec<String>,
    #[serde(default)]
    pub url: String,
}

impl MatrixServerContacts {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.mxids.is_empty() && self.url.is_empty()
    }
}

/// A public room as returned by the rooms directory and stored in the
/// `rooms` bucket. Wire field names are kept so directory chunks decode
/// straight into this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatrixRoom {
    #[serde(rename = "room_id")]
    pub id: String,
    #[serde(rename = "canonical_alias", default)]
    pub alias: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topic: String,
    /// MXC URI of the avatar.
    #[serde(rename = "avatar_url", default)]
    pub avatar: String,
    #[serde(rename = "num_joined_members", default)]
    pub members: u64,
    /// Origin server, derived from the room id during parse.
    #[serde(default)]
    pub server: String,
    /// Detected ISO 639-1 language code, uppercase.
    #[serde(default)]
    pub language: String,
    /// HTTPS form of the MXC avatar, served by this deployment.
    #[serde(rename = "avatar_http_url", default)]
    pub avatar_http_url: String,
}

impl MatrixRoom {
    /// Fill the derived fields: origin server, HTTPS avatar URL, and the
    /// detected language of name+topic.
    pub fn parse(&mut self, detector: &LanguageDetector, public_api: &str) {
        if let Some((_, server)) = self.id.split_once(':') {
            self.server = server.to_string();
        }

        self.avatar_http_url = self
            .avatar
            .strip_prefix("mxc://")
            .and_then(|rest| rest.split_once('/'))
            .map(|(server, media_id)| {
                format!(
                    "{}/avatar/{}/{}",
                    public_api.trim_end_matches('/'),
                    server,
                    media_id
                )
            })
            .unwrap_or_default();

        let text = format!("{} {}", self.name, self.topic);
        self.language = detector.detect(text.trim()).unwrap_or_default();
    }

    /// True when the room id, its canonical alias, or its origin server is
    /// on the blocklist.
    pub fn is_blocked(&self, block: &Blocklist) -> bool {
        block.by_id(&self.id) || block.by_id(&self.alias) || block.by_server(&self.server)
    }

    /// Project the room into its search index entry.
    pub fn entry(&self) -> Entry {
        Entry {
            id: self.id.clone(),
            kind: "room".to_string(),
            alias: self.alias.clone(),
            name: self.name.clone(),
            topic: self.topic.clone(),
            avatar: self.avatar.clone(),
            avatar_url: self.avatar_http_url.clone(),
            server: self.server.clone(),
            members: self.members,
            language: self.language.clone(),
        }
    }
}

/// Projection of a room into the inverted index. Entries are replaced
/// wholesale under the same id, never mutated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub alias: String,
    pub name: String,
    pub topic: String,
    pub avatar: String,
    pub avatar_url: String,
    pub server: String,
    pub members: u64,
    pub language: String,
}

/// Aggregate counters and per-phase timestamps, persisted in the `index`
/// bucket and snapshotted into the stats timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    #[serde(default)]
    pub servers: ServerStats,
    #[serde(default)]
    pub rooms: RoomStats,
    #[serde(default)]
    pub discovery: ProcessStats,
    #[serde(default)]
    pub parsing: ProcessStats,
    #[serde(default)]
    pub indexing: ProcessStats,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerStats {
    pub online: u64,
    pub indexable: u64,
    pub blocked: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RoomStats {
    pub parsed: u64,
    pub indexed: u64,
    pub banned: u64,
    pub reported: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessStats {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessStats {
    /// Duration of a completed run, if both timestamps are present.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::Blocklist;

    fn detector() -> LanguageDetector {
        LanguageDetector::new()
    }

    #[test]
    fn test_room_decodes_from_directory_chunk() {
        let json = r##"{
            "room_id": "!abc:example.com",
            "canonical_alias": "#general:example.com",
            "name": "General",
            "topic": "Anything goes",
            "avatar_url": "mxc://example.com/media123",
            "num_joined_members": 42,
            "world_readable": true,
            "guest_can_join": false
        }"##;
        let room: MatrixRoom = serde_json::from_str(json).unwrap();
        assert_eq!(room.id, "!abc:example.com");
        assert_eq!(room.alias, "#general:example.com");
        assert_eq!(room.members, 42);
        assert_eq!(room.avatar, "mxc://example.com/media123");
        assert!(room.server.is_empty());
    }

    #[test]
    fn test_parse_derives_server_and_avatar_url() {
        let mut room = MatrixRoom {
            id: "!abc:example.com".to_string(),
            avatar: "mxc://media.example.com/media123".to_string(),
            name: "General discussion about everything".to_string(),
            ..Default::default()
        };
        room.parse(&detector(), "https://api.rooms.example.com/");
        assert_eq!(room.server, "example.com");
        assert_eq!(
            room.avatar_http_url,
            "https://api.rooms.example.com/avatar/media.example.com/media123"
        );
    }

    #[test]
    fn test_parse_detects_language() {
        let mut room = MatrixRoom {
            id: "!abc:example.com".to_string(),
            name: "Free software".to_string(),
            topic: "A room to discuss free and open source software in English".to_string(),
            ..Default::default()
        };
        room.parse(&detector(), "https://api.example.com");
        assert_eq!(room.language, "EN");
    }

    #[test]
    fn test_parse_without_avatar() {
        let mut room = MatrixRoom {
            id: "!abc:example.com".to_string(),
            ..Default::default()
        };
        room.parse(&detector(), "https://api.example.com");
        assert!(room.avatar_http_url.is_empty());
    }

    #[test]
    fn test_entry_projection() {
        let mut room = MatrixRoom {
            id: "!abc:example.com".to_string(),
            alias: "#general:example.com".to_string(),
            name: "General".to_string(),
            topic: "Anything".to_string(),
            avatar: "mxc://example.com/m".to_string(),
            members: 7,
            ..Default::default()
        };
        room.parse(&detector(), "https://api.example.com");
        let entry = room.entry();
        assert_eq!(entry.id, room.id);
        assert_eq!(entry.kind, "room");
        assert_eq!(entry.server, "example.com");
        assert_eq!(entry.members, 7);
        assert_eq!(entry.avatar_url, room.avatar_http_url);
    }

    #[test]
    fn test_is_blocked_by_alias() {
        let block = Blocklist::new(vec![], vec!["#general:example.com".to_string()]);
        let room = MatrixRoom {
            id: "!abc:example.com".to_string(),
            alias: "#general:example.com".to_string(),
            server: "example.com".to_string(),
            ..Default::default()
        };
        assert!(room.is_blocked(&block));
    }

    #[test]
    fn test_room_roundtrip_through_json() {
        let mut room = MatrixRoom {
            id: "!abc:example.com".to_string(),
            alias: "#general:example.com".to_string(),
            name: "General".to_string(),
            topic: "Anything".to_string(),
            avatar: "mxc://example.com/m".to_string(),
            members: 7,
            ..Default::default()
        };
        room.parse(&detector(), "https://api.example.com");
        let encoded = serde_json::to_vec(&room).unwrap();
        let decoded: MatrixRoom = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(room, decoded);
    }

    #[test]
    fn test_process_stats_duration() {
        let stats = ProcessStats {
            started_at: Some("2024-01-01T00:00:00Z".parse().unwrap()),
            finished_at: Some("2024-01-01T00:10:00Z".parse().unwrap()),
        };
        assert_eq!(stats.duration().unwrap().num_minutes(), 10);
        assert!(ProcessStats::default().duration().is_none());
    }
}
