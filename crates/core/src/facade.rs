//! Pipeline facade: discovery → parsing → indexing as one reusable API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::index::IndexError;
use crate::model::{Entry, IndexStats, MatrixRoom};
use crate::storage::StatsRepository;

/// Crawl operations the facade drives.
#[async_trait]
pub trait CrawlerService: Send + Sync {
    async fn discover_servers(&self, workers: usize);
    async fn parse_rooms(&self, workers: usize);
    fn each_room(&self, handler: &mut dyn FnMut(&str, &MatrixRoom));
}

#[async_trait]
impl CrawlerService for crate::crawler::Crawler {
    async fn discover_servers(&self, workers: usize) {
        Self::discover_servers(self, workers).await
    }

    async fn parse_rooms(&self, workers: usize) {
        Self::parse_rooms(self, workers).await
    }

    fn each_room(&self, handler: &mut dyn FnMut(&str, &MatrixRoom)) {
        Self::each_room(self, handler)
    }
}

/// Index operations the facade drives.
pub trait IndexService: Send + Sync {
    fn rooms_batch(&self, id: String, entry: Entry) -> Result<(), IndexError>;
    fn index_batch(&self) -> Result<(), IndexError>;
    fn empty_index(&self) -> Result<(), IndexError>;
}

impl IndexService for crate::index::Indexer {
    fn rooms_batch(&self, id: String, entry: Entry) -> Result<(), IndexError> {
        Self::rooms_batch(self, id, entry)
    }

    fn index_batch(&self) -> Result<(), IndexError> {
        Self::index_batch(self)
    }

    fn empty_index(&self) -> Result<(), IndexError> {
        Self::empty_index(self)
    }
}

/// Stats operations the facade drives.
#[async_trait]
pub trait StatsService: Send + Sync {
    fn get(&self) -> IndexStats;
    fn set_started_at(&self, process: &str, at: DateTime<Utc>);
    fn set_finished_at(&self, process: &str, at: DateTime<Utc>);
    async fn collect(&self);
}

#[async_trait]
impl StatsService for crate::stats::Stats {
    fn get(&self) -> IndexStats {
        Self::get(self)
    }

    fn set_started_at(&self, process: &str, at: DateTime<Utc>) {
        Self::set_started_at(self, process, at)
    }

    fn set_finished_at(&self, process: &str, at: DateTime<Utc>) {
        Self::set_finished_at(self, process, at)
    }

    async fn collect(&self) {
        Self::collect(self).await
    }
}

/// Cache invalidation after an indexing run.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn purge(&self);
}

#[async_trait]
impl CacheService for crate::cache::Cache {
    async fn purge(&self) {
        Self::purge(self).await
    }
}

/// Wraps the crawl, index, stats, and cache services into the pipeline
/// used by the scheduler and the admin API.
pub struct DataFacade {
    crawler: Arc<dyn CrawlerService>,
    index: Arc<dyn IndexService>,
    stats: Arc<dyn StatsService>,
    cache: Arc<dyn CacheService>,
    data: Arc<dyn StatsRepository>,
}

impl DataFacade {
    pub fn new(
        crawler: Arc<dyn CrawlerService>,
        index: Arc<dyn IndexService>,
        stats: Arc<dyn StatsService>,
        cache: Arc<dyn CacheService>,
        data: Arc<dyn StatsRepository>,
    ) -> Self {
        Self {
            crawler,
            index,
            stats,
            cache,
            data,
        }
    }

    /// Discovery phase with timing and a stats collection afterwards.
    pub async fn discover_servers(&self, workers: usize) {
        info!("discovering matrix servers...");
        self.stats.set_started_at("discovery", Utc::now());
        self.crawler.discover_servers(workers).await;
        self.stats.set_finished_at("discovery", Utc::now());
        info!("servers discovery has been finished");

        self.stats.collect().await;
    }

    /// Parsing phase with timing and a stats collection afterwards.
    pub async fn parse_rooms(&self, workers: usize) {
        info!("parsing matrix rooms...");
        self.stats.set_started_at("parsing", Utc::now());
        self.crawler.parse_rooms(workers).await;
        self.stats.set_finished_at("parsing", Utc::now());
        info!("all available matrix rooms have been parsed");

        self.stats.collect().await;
    }

    /// Indexing phase: sweep every room into the index batch, rebuild the
    /// per-server room view, then invalidate the HTTP cache.
    pub async fn ingest(&self) {
        info!("ingesting matrix rooms...");
        self.stats.set_started_at("indexing", Utc::now());

        let mut per_server: HashMap<String, Vec<String>> = HashMap::new();
        self.crawler.each_room(&mut |id, room| {
            if let Err(e) = self.index.rooms_batch(id.to_string(), room.entry()) {
                warn!(room = room.alias.as_str(), error = %e, "cannot add to batch");
            }
            per_server
                .entry(room.server.clone())
                .or_default()
                .push(id.to_string());
        });
        if let Err(e) = self.index.index_batch() {
            warn!(error = %e, "indexing of the last batch failed");
        }

        let counts: HashMap<String, u64> = per_server
            .iter()
            .map(|(server, ids)| (server.clone(), ids.len() as u64))
            .collect();
        if let Err(e) = self.data.save_servers_rooms(&per_server) {
            warn!(error = %e, "cannot save servers rooms view");
        }
        if let Err(e) = self.data.set_servers_rooms_count(&counts) {
            warn!(error = %e, "cannot save servers rooms count");
        }

        self.stats.set_finished_at("indexing", Utc::now());
        info!("all available matrix rooms have been ingested");

        self.stats.collect().await;

        info!("purging cache...");
        self.cache.purge().await;
        info!("cache has been purged");
    }

    /// Admin reindex: swap in an empty index, then ingest everything.
    pub async fn reindex(&self) {
        if let Err(e) = self.index.empty_index() {
            warn!(error = %e, "cannot create empty index");
            return;
        }
        self.ingest().await;
    }

    /// Full pipeline: discovery, parsing, indexing.
    pub async fn full(&self, discovery_workers: usize, parsing_workers: usize) {
        self.discover_servers(discovery_workers).await;
        self.parse_rooms(parsing_workers).await;
        self.ingest().await;
    }
}
