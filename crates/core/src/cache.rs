//! HTTP cache policy and BunnyCDN purge.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info};

use crate::model::IndexStats;

const BUNNY_IPV4_LIST: &str = "https://bunnycdn.com/api/system/edgeserverlist";
const BUNNY_IPV6_LIST: &str = "https://bunnycdn.com/api/system/edgeserverlist/IPv6";

/// Paths that must never be served from the CDN cache.
pub const NONCACHEABLE_PATHS: &[&str] = &["/search", "/_matrix/federation/v1/publicRooms"];

/// The stats the cache layer needs: the indexing finish time drives
/// `Last-Modified`.
pub trait CacheStats: Send + Sync {
    fn get(&self) -> IndexStats;
}

impl CacheStats for crate::stats::Stats {
    fn get(&self) -> IndexStats {
        Self::get(self)
    }
}

/// Cache service
pub struct Cache {
    max_age: u32,
    bunny_url: String,
    bunny_key: String,
    bunny_ips: HashSet<String>,
    stats: Arc<dyn CacheStats>,
    http: reqwest::Client,
}

impl Cache {
    /// Build the service, pulling the Bunny edge IP lists when a purge key
    /// is configured.
    pub async fn new(config: &crate::config::CacheConfig, stats: Arc<dyn CacheStats>) -> Self {
        let http = reqwest::Client::new();
        let mut bunny_ips = HashSet::new();
        if !config.bunny.key.is_empty() {
            for uri in [BUNNY_IPV4_LIST, BUNNY_IPV6_LIST] {
                bunny_ips.extend(pull_bunny_ips(&http, uri).await);
            }
            info!(count = bunny_ips.len(), "bunny ips loaded");
        }
        Self {
            max_age: config.max_age,
            bunny_url: config.bunny.url.clone(),
            bunny_key: config.bunny.key.clone(),
            bunny_ips,
            stats,
            http,
        }
    }

    pub fn max_age(&self) -> u32 {
        self.max_age
    }

    pub fn is_noncacheable(path: &str) -> bool {
        NONCACHEABLE_PATHS.contains(&path)
    }

    /// RFC1123 form of the last indexing finish time.
    pub fn last_modified(&self) -> Option<String> {
        self.stats
            .get()
            .indexing
            .finished_at
            .map(|at| at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }

    /// True if the IP belongs to the BunnyCDN edge fleet.
    pub fn is_bunny(&self, ip: &str) -> bool {
        self.bunny_ips.contains(ip)
    }

    /// Purge the mutable cache tag. BunnyCDN only for now.
    pub async fn purge(&self) {
        self.purge_bunny().await;
    }

    async fn purge_bunny(&self) {
        if self.bunny_key.is_empty() || self.bunny_url.is_empty() {
            return;
        }
        let resp = self
            .http
            .post(&self.bunny_url)
            .header("AccessKey", &self.bunny_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(r#"{"CacheTag":"mutable"}"#)
            .send()
            .await;
        match resp {
            Ok(resp) if resp.status() == reqwest::StatusCode::NO_CONTENT => {}
            Ok(resp) => {
                error!(status_code = resp.status().as_u16(), "cannot purge bunny cache")
            }
            Err(e) => error!(error = %e, "cannot purge bunny cache"),
        }
    }
}

async fn pull_bunny_ips(http: &reqwest::Client, uri: &str) -> Vec<String> {
    let resp = match http.get(uri).send().await {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, "cannot get bunny ips");
            return Vec::new();
        }
    };
    if resp.status() != reqwest::StatusCode::OK {
        error!(status_code = resp.status().as_u16(), "cannot get bunny ips");
        return Vec::new();
    }
    match resp.json::<Vec<String>>().await {
        Ok(ips) => ips,
        Err(e) => {
            error!(error = %e, "cannot unmarshal bunny ips");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessStats;
    use std::sync::Mutex;

    struct FixedStats(Mutex<IndexStats>);

    impl CacheStats for FixedStats {
        fn get(&self) -> IndexStats {
            self.0.lock().unwrap().clone()
        }
    }

    async fn cache_with(finished_at: Option<&str>) -> Cache {
        let mut stats = IndexStats::default();
        stats.indexing = ProcessStats {
            started_at: None,
            finished_at: finished_at.map(|s| s.parse().unwrap()),
        };
        Cache::new(
            &crate::config::CacheConfig::default(),
            Arc::new(FixedStats(Mutex::new(stats))),
        )
        .await
    }

    #[test]
    fn test_noncacheable_paths() {
        assert!(Cache::is_noncacheable("/search"));
        assert!(Cache::is_noncacheable("/_matrix/federation/v1/publicRooms"));
        assert!(!Cache::is_noncacheable("/stats"));
        assert!(!Cache::is_noncacheable("/_health"));
    }

    #[tokio::test]
    async fn test_last_modified_rfc1123() {
        let cache = cache_with(Some("2024-03-01T12:30:45Z")).await;
        assert_eq!(
            cache.last_modified().as_deref(),
            Some("Fri, 01 Mar 2024 12:30:45 GMT")
        );
    }

    #[tokio::test]
    async fn test_last_modified_before_first_indexing() {
        let cache = cache_with(None).await;
        assert!(cache.last_modified().is_none());
    }

    #[tokio::test]
    async fn test_is_bunny_empty_without_key() {
        let cache = cache_with(None).await;
        assert!(!cache.is_bunny("203.0.113.7"));
    }
}
