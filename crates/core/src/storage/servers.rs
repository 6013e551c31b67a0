use std::collections::HashMap;

use redb::ReadableTable;
use tracing::error;

use super::{
    Data, ServerRepository, StorageError, ROOMS_TABLE, SERVERS_INFO_TABLE, SERVERS_TABLE,
};
use crate::model::MatrixServer;

impl ServerRepository for Data {
    fn add_server(&self, server: &MatrixServer) -> Result<(), StorageError> {
        let body = serde_json::to_vec(server)?;
        let txn = self.db().begin_write()?;
        {
            let mut servers = txn.open_table(SERVERS_TABLE)?;
            servers.insert(server.name.as_str(), server.url.as_str())?;
            let mut info = txn.open_table(SERVERS_INFO_TABLE)?;
            info.insert(server.name.as_str(), body.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_server(&self, name: &str) -> Result<Option<String>, StorageError> {
        let txn = self.db().begin_read()?;
        let servers = txn.open_table(SERVERS_TABLE)?;
        Ok(servers.get(name)?.map(|guard| guard.value().to_string()))
    }

    fn get_server_info(&self, name: &str) -> Result<Option<MatrixServer>, StorageError> {
        let txn = self.db().begin_read()?;
        let info = txn.open_table(SERVERS_INFO_TABLE)?;
        match info.get(name)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn all_servers(&self) -> HashMap<String, String> {
        let mut result = HashMap::new();
        if let Err(e) = self.collect_servers(&mut result, false) {
            error!(error = %e, "cannot read servers");
        }
        result
    }

    fn all_online_servers(&self) -> HashMap<String, String> {
        let mut result = HashMap::new();
        if let Err(e) = self.collect_servers(&mut result, true) {
            error!(error = %e, "cannot read online servers");
        }
        result
    }

    /// Removes the server record and any rooms it originated.
    fn remove_server(&self, name: &str) -> Result<(), StorageError> {
        let txn = self.db().begin_write()?;
        {
            let mut servers = txn.open_table(SERVERS_TABLE)?;
            servers.remove(name)?;
            let mut info = txn.open_table(SERVERS_INFO_TABLE)?;
            info.remove(name)?;

            let mut rooms = txn.open_table(ROOMS_TABLE)?;
            let stale: Vec<String> = rooms
                .iter()?
                .filter_map(|item| {
                    let (key, _) = item.ok()?;
                    let id = key.value();
                    match id.split_once(':') {
                        Some((_, server)) if server == name => Some(id.to_string()),
                        _ => None,
                    }
                })
                .collect();
            for id in stale {
                rooms.remove(id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn filter_servers(
        &self,
        predicate: &mut dyn FnMut(&MatrixServer) -> bool,
    ) -> Vec<MatrixServer> {
        let mut matched = Vec::new();
        let txn = match self.db().begin_read() {
            Ok(txn) => txn,
            Err(e) => {
                error!(error = %e, "cannot read servers");
                return matched;
            }
        };
        let info = match txn.open_table(SERVERS_INFO_TABLE) {
            Ok(table) => table,
            Err(e) => {
                error!(error = %e, "cannot open servers_info");
                return matched;
            }
        };
        let iter = match info.iter() {
            Ok(iter) => iter,
            Err(e) => {
                error!(error = %e, "cannot iterate servers_info");
                return matched;
            }
        };
        for item in iter {
            let Ok((_, value)) = item else { continue };
            match serde_json::from_slice::<MatrixServer>(value.value()) {
                Ok(server) => {
                    if predicate(&server) {
                        matched.push(server);
                    }
                }
                Err(e) => error!(error = %e, "cannot unmarshal server"),
            }
        }
        matched
    }
}

impl Data {
    fn collect_servers(
        &self,
        result: &mut HashMap<String, String>,
        online_only: bool,
    ) -> Result<(), StorageError> {
        let txn = self.db().begin_read()?;
        if online_only {
            let info = txn.open_table(SERVERS_INFO_TABLE)?;
            for item in info.iter()? {
                let (_, value) = item?;
                match serde_json::from_slice::<MatrixServer>(value.value()) {
                    Ok(server) if server.online => {
                        result.insert(server.name, server.url);
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "cannot unmarshal server"),
                }
            }
        } else {
            let servers = txn.open_table(SERVERS_TABLE)?;
            for item in servers.iter()? {
                let (key, value) = item?;
                result.insert(key.value().to_string(), value.value().to_string());
            }
        }
        Ok(())
    }
}
