//! Aggregate counters, per-phase timing, timeline snapshots, and the
//! stats webhook.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::latch::Latch;
use crate::metrics;
use crate::model::IndexStats;
use crate::storage::StatsRepository;

/// Anything with a countable size (index, blocklist).
pub trait Lenable: Send + Sync {
    fn len(&self) -> usize;
}

impl Lenable for crate::blocklist::Blocklist {
    fn len(&self) -> usize {
        // inherent len
        Self::len(self)
    }
}

impl Lenable for crate::index::Indexer {
    fn len(&self) -> usize {
        Self::len(self)
    }
}

#[derive(Serialize)]
struct WebhookPayload {
    username: String,
    markdown: String,
}

/// Stats service: an in-memory snapshot reloaded wholesale from the store
/// after every write, so readers never see partially updated counters.
pub struct Stats {
    data: Arc<dyn StatsRepository>,
    index: Arc<dyn Lenable>,
    block: Arc<dyn Lenable>,
    webhook_url: String,
    public_ui: String,
    http: reqwest::Client,
    snapshot: RwLock<IndexStats>,
    collecting: Latch,
}

impl Stats {
    pub fn new(
        data: Arc<dyn StatsRepository>,
        index: Arc<dyn Lenable>,
        block: Arc<dyn Lenable>,
        webhook_url: String,
        public_ui: String,
    ) -> Self {
        let stats = Self {
            data,
            index,
            block,
            webhook_url,
            public_ui,
            http: reqwest::Client::new(),
            snapshot: RwLock::new(IndexStats::default()),
            collecting: Latch::new(),
        };
        stats.reload();
        stats
    }

    /// Current snapshot.
    pub fn get(&self) -> IndexStats {
        self.snapshot.read().unwrap().clone()
    }

    /// Persisted stats timeline.
    pub fn get_tl(&self) -> Vec<(DateTime<Utc>, IndexStats)> {
        match self.data.get_index_stats_tl("") {
            Ok(timeline) => timeline,
            Err(e) => {
                error!(error = %e, "cannot get stats timeline");
                Vec::new()
            }
        }
    }

    /// Reload the snapshot from the store and mirror it into the gauges.
    pub fn reload(&self) {
        let stats = self.data.get_index_stats();
        metrics::SERVERS_ONLINE.set(stats.servers.online as i64);
        metrics::SERVERS_INDEXABLE.set(stats.servers.indexable as i64);
        metrics::ROOMS_PARSED.set(stats.rooms.parsed as i64);
        metrics::ROOMS_INDEXED.set(stats.rooms.indexed as i64);
        *self.snapshot.write().unwrap() = stats;
    }

    /// Record the start of a phase and refresh the snapshot immediately so
    /// readers observe progress.
    pub fn set_started_at(&self, process: &str, at: DateTime<Utc>) {
        if let Err(e) = self.data.set_started_at(process, at) {
            error!(process, error = %e, "cannot set started_at");
        }
        self.reload();
    }

    pub fn set_finished_at(&self, process: &str, at: DateTime<Utc>) {
        if let Err(e) = self.data.set_finished_at(process, at) {
            error!(process, error = %e, "cannot set finished_at");
        }
        self.reload();
    }

    /// Refresh the server counters only.
    pub fn collect_servers(&self, reload: bool) {
        let mut online: u64 = 0;
        let mut indexable: u64 = 0;
        self.data.filter_servers(&mut |server| {
            if server.online {
                online += 1;
            }
            if server.indexable {
                indexable += 1;
            }
            false
        });

        if let Err(e) = self.data.set_index_online_servers(online) {
            error!(error = %e, "cannot set online servers count");
        }
        if let Err(e) = self.data.set_index_indexable_servers(indexable) {
            error!(error = %e, "cannot set indexable servers count");
        }
        if let Err(e) = self
            .data
            .set_index_blocked_servers(self.block.len() as u64)
        {
            error!(error = %e, "cannot set blocked servers count");
        }

        if reload {
            self.reload();
        }
    }

    /// Full collection pass: counters, a timeline snapshot, and the
    /// webhook. Concurrent callers are coalesced.
    pub async fn collect(&self) {
        let Some(_guard) = self.collecting.acquire() else {
            info!("stats collection already in progress, ignoring request");
            return;
        };

        self.collect_servers(false);

        let mut rooms: u64 = 0;
        if let Err(e) = self.data.each_room(&mut |_id, _room| rooms += 1) {
            error!(error = %e, "cannot count rooms");
        }
        if let Err(e) = self.data.set_index_parsed_rooms(rooms) {
            error!(error = %e, "cannot set parsed rooms count");
        }
        if let Err(e) = self.data.set_index_indexed_rooms(self.index.len() as u64) {
            error!(error = %e, "cannot set indexed rooms count");
        }
        match self.data.get_banned_rooms() {
            Ok(banned) => {
                if let Err(e) = self.data.set_index_banned_rooms(banned.len() as u64) {
                    error!(error = %e, "cannot set banned rooms count");
                }
            }
            Err(e) => error!(error = %e, "cannot get banned rooms count"),
        }
        match self.data.get_reported_rooms() {
            Ok(reported) => {
                if let Err(e) = self.data.set_index_reported_rooms(reported.len() as u64) {
                    error!(error = %e, "cannot set reported rooms count");
                }
            }
            Err(e) => error!(error = %e, "cannot get reported rooms count"),
        }

        self.reload();
        let snapshot = self.get();
        if let Err(e) = self.data.set_index_stats_tl(Utc::now(), &snapshot) {
            error!(error = %e, "cannot set stats timeline");
        }
        self.send_webhook(&snapshot).await;
    }

    async fn send_webhook(&self, stats: &IndexStats) {
        if self.webhook_url.is_empty() {
            return;
        }
        let username = url::Url::parse(&self.public_ui)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let payload = WebhookPayload {
            username,
            markdown: webhook_text(stats),
        };
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await;
        match resp {
            Ok(resp) if resp.status() == 200 || resp.status() == 202 => {}
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                error!(status_code = status, body = body.as_str(), "webhook sending failed");
            }
            Err(e) => error!(error = %e, "webhook sending failed"),
        }
    }
}

fn fmt_duration(duration: Option<chrono::Duration>) -> String {
    match duration {
        Some(d) => format!("{}s", d.num_seconds()),
        None => "n/a".to_string(),
    }
}

fn webhook_text(stats: &IndexStats) -> String {
    let discovery = stats.discovery.duration();
    let parsing = stats.parsing.duration();
    let indexing = stats.indexing.duration();
    let total = match (discovery, parsing, indexing) {
        (Some(d), Some(p), Some(i)) => Some(d + p + i),
        _ => None,
    };

    let mut text = String::from("**stats have been collected**\n\n");
    text.push_str(&format!(
        "* `{}` servers online (`{}` blocked)\n",
        stats.servers.online, stats.servers.blocked
    ));
    text.push_str(&format!(
        "* `{}` rooms (`{}` blocked, `{}` reported)\n",
        stats.rooms.indexed, stats.rooms.banned, stats.rooms.reported
    ));
    text.push_str("\n---\n\n");
    text.push_str(&format!("* `{}` took discovery process\n", fmt_duration(discovery)));
    text.push_str(&format!("* `{}` took parsing process\n", fmt_duration(parsing)));
    text.push_str(&format!("* `{}` took indexing process\n", fmt_duration(indexing)));
    text.push_str(&format!("* `{}` total\n", fmt_duration(total)));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::Blocklist;
    use crate::model::{MatrixRoom, MatrixServer};
    use crate::storage::{Data, RoomRepository, ServerRepository};
    use tempfile::TempDir;

    struct FixedLen(usize);

    impl Lenable for FixedLen {
        fn len(&self) -> usize {
            self.0
        }
    }

    fn stats_service(indexed: usize) -> (TempDir, Arc<Data>, Stats) {
        let tmp = TempDir::new().unwrap();
        let data = Arc::new(Data::open(tmp.path().join("test.db"), 100).unwrap());
        let block = Arc::new(Blocklist::new(vec!["bad.example".to_string()], vec![]));
        let stats = Stats::new(
            data.clone(),
            Arc::new(FixedLen(indexed)),
            block,
            String::new(),
            String::new(),
        );
        (tmp, data, stats)
    }

    #[tokio::test]
    async fn test_collect_counts_everything() {
        let (_tmp, data, stats) = stats_service(2);

        data.add_server(&MatrixServer {
            name: "up.example".to_string(),
            url: "https://up.example:8448".to_string(),
            online: true,
            indexable: true,
            updated_at: Utc::now(),
            ..Default::default()
        })
        .unwrap();
        data.add_server(&MatrixServer {
            name: "down.example".to_string(),
            updated_at: Utc::now(),
            ..Default::default()
        })
        .unwrap();

        for i in 0..3 {
            data.add_room_batch(MatrixRoom {
                id: format!("!r{}:up.example", i),
                ..Default::default()
            });
        }
        data.flush_room_batch();

        stats.collect().await;

        let snapshot = stats.get();
        assert_eq!(snapshot.servers.online, 1);
        assert_eq!(snapshot.servers.indexable, 1);
        assert_eq!(snapshot.servers.blocked, 1);
        assert_eq!(snapshot.rooms.parsed, 3);
        assert_eq!(snapshot.rooms.indexed, 2);
        assert!(snapshot.rooms.parsed >= snapshot.rooms.indexed);

        // collection persisted a timeline snapshot
        assert_eq!(stats.get_tl().len(), 1);
    }

    #[tokio::test]
    async fn test_phase_timestamps_are_ordered() {
        let (_tmp, _data, stats) = stats_service(0);
        let start = Utc::now();
        stats.set_started_at("discovery", start);
        let end = Utc::now();
        stats.set_finished_at("discovery", end);

        let snapshot = stats.get();
        assert_eq!(snapshot.discovery.started_at, Some(start));
        assert_eq!(snapshot.discovery.finished_at, Some(end));
        assert!(snapshot.discovery.finished_at >= snapshot.discovery.started_at);
    }

    #[test]
    fn test_webhook_text_shape() {
        let mut stats = IndexStats::default();
        stats.servers.online = 12;
        stats.servers.blocked = 2;
        stats.rooms.indexed = 100;
        stats.discovery.started_at = Some("2024-01-01T00:00:00Z".parse().unwrap());
        stats.discovery.finished_at = Some("2024-01-01T00:01:00Z".parse().unwrap());

        let text = webhook_text(&stats);
        assert!(text.contains("**stats have been collected**"));
        assert!(text.contains("`12` servers online (`2` blocked)"));
        assert!(text.contains("`60s` took discovery process"));
        assert!(text.contains("`n/a` took parsing process"));
    }
}
