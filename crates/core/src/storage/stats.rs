use std::collections::HashMap;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use super::{
    Data, StatsRepository, StorageError, INDEX_TABLE, ROOMS_TABLE, SERVERS_ROOMS_COUNT_TABLE,
    SERVERS_ROOMS_TABLE,
};
use crate::model::IndexStats;

const TIMELINE_PREFIX: &str = "stats_tl/";
// next byte after '/' keeps the range scan bounded to timeline keys
const TIMELINE_END: &str = "stats_tl0";

impl Data {
    fn get_meta<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let txn = self.db().begin_read().ok()?;
        let table = txn.open_table(INDEX_TABLE).ok()?;
        let guard = table.get(key).ok()??;
        serde_json::from_slice(guard.value()).ok()
    }

    fn set_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let body = serde_json::to_vec(value)?;
        let txn = self.db().begin_write()?;
        {
            let mut table = txn.open_table(INDEX_TABLE)?;
            table.insert(key, body.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl StatsRepository for Data {
    fn get_index_stats(&self) -> IndexStats {
        let mut stats = IndexStats::default();
        stats.servers.online = self.get_meta("servers/online").unwrap_or_default();
        stats.servers.indexable = self.get_meta("servers/indexable").unwrap_or_default();
        stats.servers.blocked = self.get_meta("servers/blocked").unwrap_or_default();
        stats.rooms.parsed = self.get_meta("rooms/parsed").unwrap_or_default();
        stats.rooms.indexed = self.get_meta("rooms/indexed").unwrap_or_default();
        stats.rooms.banned = self.get_meta("rooms/banned").unwrap_or_default();
        stats.rooms.reported = self.get_meta("rooms/reported").unwrap_or_default();
        stats.discovery.started_at = self.get_meta("process/discovery/started_at");
        stats.discovery.finished_at = self.get_meta("process/discovery/finished_at");
        stats.parsing.started_at = self.get_meta("process/parsing/started_at");
        stats.parsing.finished_at = self.get_meta("process/parsing/finished_at");
        stats.indexing.started_at = self.get_meta("process/indexing/started_at");
        stats.indexing.finished_at = self.get_meta("process/indexing/finished_at");
        stats
    }

    fn set_index_stats_tl(
        &self,
        at: DateTime<Utc>,
        stats: &IndexStats,
    ) -> Result<(), StorageError> {
        let key = format!("{}{}", TIMELINE_PREFIX, at.to_rfc3339());
        self.set_meta(&key, stats)
    }

    fn get_index_stats_tl(
        &self,
        prefix: &str,
    ) -> Result<Vec<(DateTime<Utc>, IndexStats)>, StorageError> {
        let txn = self.db().begin_read()?;
        let table = txn.open_table(INDEX_TABLE)?;
        let mut timeline = Vec::new();
        for item in table.range(TIMELINE_PREFIX..TIMELINE_END)? {
            let (key, value) = item?;
            let Some(stamp) = key.value().strip_prefix(TIMELINE_PREFIX) else {
                continue;
            };
            if !stamp.starts_with(prefix) {
                continue;
            }
            let Ok(at) = DateTime::parse_from_rfc3339(stamp) else {
                continue;
            };
            match serde_json::from_slice::<IndexStats>(value.value()) {
                Ok(stats) => timeline.push((at.with_timezone(&Utc), stats)),
                Err(e) => error!(key = key.value(), error = %e, "cannot unmarshal stats snapshot"),
            }
        }
        Ok(timeline)
    }

    fn set_index_online_servers(&self, servers: u64) -> Result<(), StorageError> {
        self.set_meta("servers/online", &servers)
    }

    fn set_index_indexable_servers(&self, servers: u64) -> Result<(), StorageError> {
        self.set_meta("servers/indexable", &servers)
    }

    fn set_index_blocked_servers(&self, servers: u64) -> Result<(), StorageError> {
        self.set_meta("servers/blocked", &servers)
    }

    fn set_index_parsed_rooms(&self, rooms: u64) -> Result<(), StorageError> {
        self.set_meta("rooms/parsed", &rooms)
    }

    fn set_index_indexed_rooms(&self, rooms: u64) -> Result<(), StorageError> {
        self.set_meta("rooms/indexed", &rooms)
    }

    fn set_index_banned_rooms(&self, rooms: u64) -> Result<(), StorageError> {
        self.set_meta("rooms/banned", &rooms)
    }

    fn set_index_reported_rooms(&self, rooms: u64) -> Result<(), StorageError> {
        self.set_meta("rooms/reported", &rooms)
    }

    fn set_started_at(&self, process: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.set_meta(&format!("process/{}/started_at", process), &at)
    }

    fn set_finished_at(&self, process: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.set_meta(&format!("process/{}/finished_at", process), &at)
    }

    fn set_servers_rooms_count(&self, counts: &HashMap<String, u64>) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            let mut table = txn.open_table(SERVERS_ROOMS_COUNT_TABLE)?;
            for (server, count) in counts {
                table.insert(server.as_str(), *count)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn get_servers_rooms_count(&self) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        let Ok(txn) = self.db().begin_read() else {
            return counts;
        };
        let Ok(table) = txn.open_table(SERVERS_ROOMS_COUNT_TABLE) else {
            return counts;
        };
        let Ok(iter) = table.iter() else {
            return counts;
        };
        for item in iter {
            let Ok((key, value)) = item else { continue };
            counts.insert(key.value().to_string(), value.value());
        }
        counts
    }

    /// Recreates the per-server view inside a single write transaction so
    /// readers never observe a partial rebuild. Rooms missing from the
    /// canonical bucket are logged and skipped.
    fn save_servers_rooms(
        &self,
        rooms: &HashMap<String, Vec<String>>,
    ) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            txn.delete_table(SERVERS_ROOMS_TABLE)?;
            let mut view = txn.open_table(SERVERS_ROOMS_TABLE)?;
            let canonical = txn.open_table(ROOMS_TABLE)?;
            for (server, room_ids) in rooms {
                if room_ids.is_empty() {
                    continue;
                }
                for room_id in room_ids {
                    match canonical.get(room_id.as_str())? {
                        Some(body) => {
                            view.insert((server.as_str(), room_id.as_str()), body.value())?;
                        }
                        None => {
                            error!(server = server.as_str(), room = room_id.as_str(),
                                "room missing from canonical bucket, skipping");
                        }
                    }
                }
            }
        }
        txn.commit()?;
        Ok(())
    }
}
