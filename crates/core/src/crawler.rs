//! Federation crawler: server discovery, rooms parsing, room sweeps.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::blocklist::Blocklist;
use crate::detector::LanguageDetector;
use crate::latch::Latch;
use crate::matrix::{Client, ROOMS_PAGE_LIMIT};
use crate::model::{MatrixRoom, MatrixServer};
use crate::storage::{DataRepository, StorageError};

/// Outcome of a single-server add requested over the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddServerOutcome {
    /// Server is blocked or already known.
    AlreadyReported,
    Created,
    Failed,
}

/// Long-running crawl operations, each guarded by an in-progress latch so
/// overlapping invocations coalesce into one run.
pub struct Crawler {
    seeds: Vec<String>,
    public_api: String,
    client: Arc<Client>,
    block: Arc<Blocklist>,
    data: Arc<dyn DataRepository>,
    detector: Arc<LanguageDetector>,
    discovering: Latch,
    parsing: Latch,
    eachrooming: Latch,
}

impl Crawler {
    pub fn new(
        seeds: Vec<String>,
        public_api: String,
        client: Arc<Client>,
        block: Arc<Blocklist>,
        data: Arc<dyn DataRepository>,
        detector: Arc<LanguageDetector>,
    ) -> Self {
        Self {
            seeds,
            public_api,
            client,
            block,
            data,
            detector,
            discovering: Latch::new(),
            parsing: Latch::new(),
            eachrooming: Latch::new(),
        }
    }

    /// Discover every known server plus the configured seeds. Individual
    /// failures are logged and skipped; the pool keeps going.
    pub async fn discover_servers(&self, workers: usize) {
        let Some(_guard) = self.discovering.acquire() else {
            info!("servers discovery already in progress, ignoring request");
            return;
        };

        let mut names: Vec<String> = self.data.all_servers().into_keys().collect();
        let known: HashSet<String> = names.iter().cloned().collect();
        names.extend(self.seeds.iter().filter(|s| !known.contains(*s)).cloned());

        self.discover_names(names, workers).await;
    }

    /// Bulk add by name, used by the admin API.
    pub async fn add_servers(&self, names: Vec<String>, workers: usize) {
        self.discover_names(names, workers).await;
    }

    async fn discover_names(&self, names: Vec<String>, workers: usize) {
        let mut queue = Vec::with_capacity(names.len());
        for name in names {
            if self.block.by_server(&name) {
                if let Err(e) = self.data.remove_server(&name) {
                    warn!(server = name.as_str(), error = %e, "cannot remove blocked server");
                }
                continue;
            }
            queue.push(name);
        }

        stream::iter(queue)
            .for_each_concurrent(workers.max(1), |name| async move {
                if let Err(e) = self.discover_server(&name).await {
                    warn!(server = name.as_str(), error = %e, "cannot discover server");
                }
            })
            .await;
    }

    async fn discover_server(&self, name: &str) -> Result<(), StorageError> {
        debug!(server = name, "discovering...");
        if self.block.by_server(name) {
            return self.data.remove_server(name);
        }

        if let Some(url) = self.data.get_server(name)? {
            if !url.is_empty() {
                return Ok(());
            }
        }

        let mut server = MatrixServer {
            name: name.to_string(),
            online: true,
            indexable: true,
            updated_at: Utc::now(),
            ..Default::default()
        };

        if let Some(contacts) = self.client.server_contacts(name).await {
            server.contacts = contacts;
        }

        server.url = self.client.get_url(name, false).await;

        if !self.client.validate_discovered_server(name).await {
            info!(server = name, "server is not eligible");
            server.online = false;
            server.indexable = false;
        }

        self.data.add_server(&server)
    }

    /// Add a single server by name, for the admin API.
    pub async fn add_server(&self, name: &str) -> AddServerOutcome {
        if self.block.by_server(name) {
            return AddServerOutcome::AlreadyReported;
        }
        match self.data.get_server(name) {
            Ok(Some(url)) if !url.is_empty() => return AddServerOutcome::AlreadyReported,
            Ok(_) => {}
            Err(e) => {
                warn!(server = name, error = %e, "cannot read server");
                return AddServerOutcome::Failed;
            }
        }

        match self.discover_server(name).await {
            Ok(()) => AddServerOutcome::Created,
            Err(e) => {
                warn!(server = name, error = %e, "cannot add server");
                AddServerOutcome::Failed
            }
        }
    }

    /// Known servers map, name → URL.
    pub fn all_servers(&self) -> std::collections::HashMap<String, String> {
        self.data.all_servers()
    }

    /// Parse the public rooms of every online server.
    pub async fn parse_rooms(&self, workers: usize) {
        let Some(_guard) = self.parsing.acquire() else {
            info!("rooms parsing already in progress, ignoring request");
            return;
        };

        let servers: Vec<String> = self.data.all_online_servers().into_keys().collect();
        let total = servers.len();
        if total == 0 {
            info!("no online servers to parse");
            return;
        }
        let workers = workers.clamp(1, total);

        info!(servers = total, workers, "parsing rooms");
        let mut queue = Vec::with_capacity(total);
        for name in servers {
            if self.block.by_server(&name) {
                if let Err(e) = self.data.remove_server(&name) {
                    warn!(server = name.as_str(), error = %e, "cannot remove blocked server");
                }
                continue;
            }
            queue.push(name);
        }

        stream::iter(queue)
            .for_each_concurrent(workers, |name| async move {
                debug!(server = name.as_str(), "parsing rooms...");
                self.parse_server_rooms(&name).await;
            })
            .await;

        self.data.flush_room_batch();
    }

    /// Paginate one server's directory into the room batch. Pagination
    /// stops when `next_batch` is empty or a page comes back empty.
    async fn parse_server_rooms(&self, name: &str) {
        let mut since = String::new();
        let mut added: u64 = 0;
        loop {
            let start = Instant::now();
            let resp = match self
                .client
                .public_rooms_page(name, ROOMS_PAGE_LIMIT, &since)
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(server = name, error = %e, "cannot get public rooms");
                    return;
                }
            };
            if resp.chunk.is_empty() {
                debug!(server = name, "response is empty");
                return;
            }

            let page_len = resp.chunk.len();
            for mut room in resp.chunk {
                if room.id.is_empty() || room.is_blocked(&self.block) {
                    continue;
                }
                room.parse(&self.detector, &self.public_api);
                if room.is_blocked(&self.block) {
                    continue;
                }
                added += 1;
                self.data.add_room_batch(room);
            }
            debug!(
                server = name,
                page = page_len,
                added,
                total = resp.total,
                took_ms = start.elapsed().as_millis() as u64,
                "added rooms page"
            );

            if resp.next_batch.is_empty() {
                return;
            }
            since = resp.next_batch;
        }
    }

    /// Iterate every persisted room, skipping and collecting the ones that
    /// became blocked or whose origin server is gone. The collected ids are
    /// removed in a single batch after iteration, since the iteration
    /// itself runs inside a read transaction.
    pub fn each_room(&self, handler: &mut dyn FnMut(&str, &MatrixRoom)) {
        let Some(_guard) = self.eachrooming.acquire() else {
            info!("iterating over each room is already in progress, ignoring request");
            return;
        };

        let servers: HashSet<String> = self.data.all_servers().into_keys().collect();
        let mut to_remove = Vec::new();
        let result = self.data.each_room(&mut |id, room| {
            if room.is_blocked(&self.block) || !servers.contains(&room.server) {
                to_remove.push(id.to_string());
                return;
            }
            handler(id, room);
        });
        if let Err(e) = result {
            warn!(error = %e, "room iteration failed");
        }
        if !to_remove.is_empty() {
            info!(count = to_remove.len(), "removing blocked or orphaned rooms");
        }
        self.data.remove_rooms(&to_remove);
    }

    /// Avatar fetch for the HTTP API: first responding media server wins.
    pub async fn get_avatar(&self, server_name: &str, media_id: &str) -> Option<(Vec<u8>, String)> {
        self.client.download_media(server_name, media_id).await
    }
}
