use redb::ReadableTable;
use tracing::error;

use super::{Data, RoomRepository, StorageError, ROOMS_TABLE};
use crate::model::MatrixRoom;

impl RoomRepository for Data {
    fn add_room_batch(&self, room: MatrixRoom) {
        self.room_batch().add(room);
    }

    fn flush_room_batch(&self) {
        self.room_batch().flush();
    }

    fn get_room(&self, id: &str) -> Result<Option<MatrixRoom>, StorageError> {
        let txn = self.db().begin_read()?;
        let rooms = txn.open_table(ROOMS_TABLE)?;
        match rooms.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn each_room(&self, handler: &mut dyn FnMut(&str, &MatrixRoom)) -> Result<(), StorageError> {
        let txn = self.db().begin_read()?;
        let rooms = txn.open_table(ROOMS_TABLE)?;
        for item in rooms.iter()? {
            let (key, value) = item?;
            match serde_json::from_slice::<MatrixRoom>(value.value()) {
                Ok(room) => handler(key.value(), &room),
                Err(e) => error!(room = key.value(), error = %e, "cannot unmarshal room"),
            }
        }
        Ok(())
    }

    /// One write transaction for the whole removal list.
    fn remove_rooms(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.remove_rooms_txn(ids) {
            error!(error = %e, "cannot remove rooms");
        }
    }
}

impl Data {
    fn remove_rooms_txn(&self, ids: &[String]) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            let mut rooms = txn.open_table(ROOMS_TABLE)?;
            for id in ids {
                rooms.remove(id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_data;
    use super::*;

    fn room(id: &str, name: &str) -> MatrixRoom {
        MatrixRoom {
            id: id.to_string(),
            name: name.to_string(),
            server: id.split_once(':').map(|(_, s)| s.to_string()).unwrap_or_default(),
            ..Default::default()
        }
    }

    #[test]
    fn test_room_roundtrip() {
        let (_tmp, data) = open_data();
        let original = room("!r1:example.com", "room one");
        data.add_room_batch(original.clone());
        data.flush_room_batch();

        let loaded = data.get_room("!r1:example.com").unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_each_room_sees_all() {
        let (_tmp, data) = open_data();
        for i in 0..5 {
            data.add_room_batch(room(&format!("!r{}:example.com", i), "r"));
        }
        data.flush_room_batch();

        let mut seen = Vec::new();
        data.each_room(&mut |id, _room| seen.push(id.to_string()))
            .unwrap();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_remove_rooms_batch() {
        let (_tmp, data) = open_data();
        for i in 0..4 {
            data.add_room_batch(room(&format!("!r{}:example.com", i), "r"));
        }
        data.flush_room_batch();

        data.remove_rooms(&["!r1:example.com".to_string(), "!r3:example.com".to_string()]);

        let mut seen = Vec::new();
        data.each_room(&mut |id, _| seen.push(id.to_string())).unwrap();
        seen.sort();
        assert_eq!(seen, vec!["!r0:example.com", "!r2:example.com"]);
    }

    #[test]
    fn test_overwrite_on_reparse() {
        let (_tmp, data) = open_data();
        data.add_room_batch(room("!r1:example.com", "old name"));
        data.flush_room_batch();
        data.add_room_batch(room("!r1:example.com", "new name"));
        data.flush_room_batch();

        let loaded = data.get_room("!r1:example.com").unwrap().unwrap();
        assert_eq!(loaded.name, "new name");
    }
}
