use std::collections::HashMap;

use redb::ReadableTable;

use super::{Data, ModerationRepository, StorageError, BANNED_TABLE, REPORTED_TABLE};

impl ModerationRepository for Data {
    fn ban_room(&self, id: &str) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            let mut banned = txn.open_table(BANNED_TABLE)?;
            banned.insert(id, ())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn unban_room(&self, id: &str) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            let mut banned = txn.open_table(BANNED_TABLE)?;
            banned.remove(id)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_banned_rooms(&self) -> Result<Vec<String>, StorageError> {
        let txn = self.db().begin_read()?;
        let banned = txn.open_table(BANNED_TABLE)?;
        let mut ids = Vec::new();
        for item in banned.iter()? {
            let (key, _) = item?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    fn report_room(&self, id: &str, reason: &str) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            let mut reported = txn.open_table(REPORTED_TABLE)?;
            reported.insert(id, reason)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn unreport_room(&self, id: &str) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            let mut reported = txn.open_table(REPORTED_TABLE)?;
            reported.remove(id)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_reported_rooms(&self) -> Result<HashMap<String, String>, StorageError> {
        let txn = self.db().begin_read()?;
        let reported = txn.open_table(REPORTED_TABLE)?;
        let mut rooms = HashMap::new();
        for item in reported.iter()? {
            let (key, value) = item?;
            rooms.insert(key.value().to_string(), value.value().to_string());
        }
        Ok(rooms)
    }

    fn is_reported(&self, id: &str) -> bool {
        let Ok(txn) = self.db().begin_read() else {
            return false;
        };
        let Ok(reported) = txn.open_table(REPORTED_TABLE) else {
            return false;
        };
        matches!(reported.get(id), Ok(Some(_)))
    }
}
