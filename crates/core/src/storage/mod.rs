//! Durable key-value store for servers, rooms, moderation, and stats.
//!
//! Backed by a single redb database. Buckets are plain tables created
//! idempotently at open. Room writes go through a size-triggered
//! [`Batcher`] so producers never pay per-room transaction cost.

mod moderation;
mod rooms;
mod servers;
mod stats;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, TableDefinition};
use thiserror::Error;
use tracing::{error, info};

use crate::batch::Batcher;
use crate::model::{IndexStats, MatrixRoom, MatrixServer};

pub(crate) const SERVERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("servers");
pub(crate) const SERVERS_INFO_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("servers_info");
pub(crate) const ROOMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("rooms");
pub(crate) const INDEX_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("index");
pub(crate) const SERVERS_ROOMS_TABLE: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("servers_rooms");
pub(crate) const SERVERS_ROOMS_COUNT_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("servers_rooms_count");
pub(crate) const BANNED_TABLE: TableDefinition<&str, ()> = TableDefinition::new("banned_rooms");
pub(crate) const REPORTED_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("reported_rooms");

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),
}

/// Server bucket operations.
pub trait ServerRepository: Send + Sync {
    fn add_server(&self, server: &MatrixServer) -> Result<(), StorageError>;
    /// Resolved federation URL of a known server, if any.
    fn get_server(&self, name: &str) -> Result<Option<String>, StorageError>;
    fn get_server_info(&self, name: &str) -> Result<Option<MatrixServer>, StorageError>;
    fn all_servers(&self) -> HashMap<String, String>;
    fn all_online_servers(&self) -> HashMap<String, String>;
    fn remove_server(&self, name: &str) -> Result<(), StorageError>;
    /// Iterate server records, returning those the predicate selects.
    fn filter_servers(&self, predicate: &mut dyn FnMut(&MatrixServer) -> bool)
        -> Vec<MatrixServer>;
}

/// Room bucket operations.
pub trait RoomRepository: Send + Sync {
    /// Enqueue a room for the next batch write.
    fn add_room_batch(&self, room: MatrixRoom);
    /// Drain the room batch queue into the store.
    fn flush_room_batch(&self);
    fn get_room(&self, id: &str) -> Result<Option<MatrixRoom>, StorageError>;
    /// Iterate all rooms in a single read transaction (snapshot view).
    /// The handler must not write back into the store.
    fn each_room(&self, handler: &mut dyn FnMut(&str, &MatrixRoom)) -> Result<(), StorageError>;
    fn remove_rooms(&self, ids: &[String]);
}

/// Moderation bucket operations.
pub trait ModerationRepository: Send + Sync {
    fn ban_room(&self, id: &str) -> Result<(), StorageError>;
    fn unban_room(&self, id: &str) -> Result<(), StorageError>;
    fn get_banned_rooms(&self) -> Result<Vec<String>, StorageError>;
    fn report_room(&self, id: &str, reason: &str) -> Result<(), StorageError>;
    fn unreport_room(&self, id: &str) -> Result<(), StorageError>;
    fn get_reported_rooms(&self) -> Result<HashMap<String, String>, StorageError>;
    fn is_reported(&self, id: &str) -> bool;
}

/// Everything the crawler and indexer need from the store.
pub trait DataRepository: ServerRepository + RoomRepository + ModerationRepository {}

impl<T> DataRepository for T where T: ServerRepository + RoomRepository + ModerationRepository {}

/// Stats persistence on top of the data repository.
pub trait StatsRepository: DataRepository {
    fn get_index_stats(&self) -> IndexStats;
    fn set_index_stats_tl(&self, at: DateTime<Utc>, stats: &IndexStats)
        -> Result<(), StorageError>;
    fn get_index_stats_tl(
        &self,
        prefix: &str,
    ) -> Result<Vec<(DateTime<Utc>, IndexStats)>, StorageError>;
    fn set_index_online_servers(&self, servers: u64) -> Result<(), StorageError>;
    fn set_index_indexable_servers(&self, servers: u64) -> Result<(), StorageError>;
    fn set_index_blocked_servers(&self, servers: u64) -> Result<(), StorageError>;
    fn set_index_parsed_rooms(&self, rooms: u64) -> Result<(), StorageError>;
    fn set_index_indexed_rooms(&self, rooms: u64) -> Result<(), StorageError>;
    fn set_index_banned_rooms(&self, rooms: u64) -> Result<(), StorageError>;
    fn set_index_reported_rooms(&self, rooms: u64) -> Result<(), StorageError>;
    fn set_started_at(&self, process: &str, at: DateTime<Utc>) -> Result<(), StorageError>;
    fn set_finished_at(&self, process: &str, at: DateTime<Utc>) -> Result<(), StorageError>;
    fn set_servers_rooms_count(&self, counts: &HashMap<String, u64>) -> Result<(), StorageError>;
    fn get_servers_rooms_count(&self) -> HashMap<String, u64>;
    /// Atomically rebuild the per-server room view, copying room bodies
    /// from the canonical rooms bucket.
    fn save_servers_rooms(&self, rooms: &HashMap<String, Vec<String>>)
        -> Result<(), StorageError>;
}

/// The redb-backed store.
pub struct Data {
    db: Arc<Database>,
    room_batch: Batcher<MatrixRoom>,
}

impl Data {
    /// Open (or create) the database, ensure all buckets exist, and wire the
    /// room batcher to a grouped write transaction.
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self, StorageError> {
        let db = Arc::new(Database::create(path.as_ref())?);
        init_tables(&db)?;

        let flush_db = db.clone();
        let room_batch = Batcher::new(batch_size, move |rooms: Vec<MatrixRoom>| {
            if let Err(e) = write_rooms(&flush_db, &rooms) {
                error!(error = %e, "cannot store room batch");
            }
        });

        info!(path = %path.as_ref().display(), "data repository opened");
        Ok(Self { db, room_batch })
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn room_batch(&self) -> &Batcher<MatrixRoom> {
        &self.room_batch
    }
}

fn init_tables(db: &Database) -> Result<(), StorageError> {
    let txn = db.begin_write()?;
    {
        txn.open_table(SERVERS_TABLE)?;
        txn.open_table(SERVERS_INFO_TABLE)?;
        txn.open_table(ROOMS_TABLE)?;
        txn.open_table(INDEX_TABLE)?;
        txn.open_table(SERVERS_ROOMS_TABLE)?;
        txn.open_table(SERVERS_ROOMS_COUNT_TABLE)?;
        txn.open_table(BANNED_TABLE)?;
        txn.open_table(REPORTED_TABLE)?;
    }
    txn.commit()?;
    Ok(())
}

/// One write transaction for the whole batch; malformed rooms are logged
/// and skipped so the rest of the batch still lands.
fn write_rooms(db: &Database, rooms: &[MatrixRoom]) -> Result<(), StorageError> {
    if rooms.is_empty() {
        return Ok(());
    }
    let txn = db.begin_write()?;
    {
        let mut table = txn.open_table(ROOMS_TABLE)?;
        for room in rooms {
            let body = match serde_json::to_vec(room) {
                Ok(body) => body,
                Err(e) => {
                    error!(room = %room.id, error = %e, "cannot marshal room");
                    continue;
                }
            };
            table.insert(room.id.as_str(), body.as_slice())?;
        }
    }
    txn.commit()?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::open_data;
    use super::*;

    #[test]
    fn test_open_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.db");
        {
            let _data = Data::open(&path, 10).unwrap();
        }
        let _data = Data::open(&path, 10).unwrap();
    }

    #[test]
    fn test_room_batch_flushes_into_store() {
        let (_tmp, data) = open_data();
        let room = MatrixRoom {
            id: "!r1:example.com".to_string(),
            name: "one".to_string(),
            ..Default::default()
        };
        data.add_room_batch(room.clone());
        assert!(data.get_room("!r1:example.com").unwrap().is_none());
        data.flush_room_batch();
        assert_eq!(data.get_room("!r1:example.com").unwrap(), Some(room));
    }
}
