//! Common test utilities: an in-process server over temp storage and a
//! temp index, no external infrastructure.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use roomsearch_core::storage::StatsRepository;
use roomsearch_core::{
    load_config_from_str, Blocklist, Cache, Client, Crawler, Data, DataFacade, Entry, Indexer,
    LanguageDetector, Search, SearchIndex, Stats,
};
use roomsearch_server::api::create_router;
use roomsearch_server::state::AppState;

pub const ADMIN_LOGIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "secret";

pub struct TestFixture {
    pub router: Router,
    pub data: Arc<Data>,
    pub indexer: Arc<Indexer>,
    pub stats: Arc<Stats>,
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_admin_ips(&[]).await
    }

    /// Fixture with an admin IP allowlist.
    pub async fn with_admin_ips(ips: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let ips_toml = ips
            .iter()
            .map(|ip| format!("\"{}\"", ip))
            .collect::<Vec<_>>()
            .join(", ");
        let config = load_config_from_str(&format!(
            r#"
servers = []

[public]
api = "https://api.rooms.test"

[admin]
login = "{}"
password = "{}"
ips = [{}]
"#,
            ADMIN_LOGIN, ADMIN_PASSWORD, ips_toml
        ))
        .expect("Failed to build test config");

        let data =
            Arc::new(Data::open(temp_dir.path().join("test.db"), config.batch.rooms).unwrap());
        let block = Arc::new(Blocklist::new(
            config.blocklist.servers.clone(),
            config.blocklist.ids.clone(),
        ));
        let index = Arc::new(SearchIndex::open(temp_dir.path().join("index")).unwrap());
        let indexer = Arc::new(Indexer::new(index.clone(), config.batch.rooms));
        let search = Search::new(index.clone());
        let client = Arc::new(Client::new(&config.matrix).unwrap());
        let crawler = Arc::new(Crawler::new(
            config.servers.clone(),
            config.public.api.clone(),
            client,
            block.clone(),
            data.clone(),
            Arc::new(LanguageDetector::new()),
        ));
        let stats = Arc::new(Stats::new(
            data.clone(),
            indexer.clone(),
            block,
            String::new(),
            String::new(),
        ));
        let cache = Arc::new(Cache::new(&config.cache, stats.clone()).await);
        let facade = Arc::new(DataFacade::new(
            crawler.clone(),
            indexer.clone(),
            stats.clone(),
            cache.clone(),
            data.clone(),
        ));

        let state = Arc::new(AppState::new(
            config, search, stats.clone(), crawler, facade, cache,
        ));

        Self {
            router: create_router(state),
            data,
            indexer,
            stats,
            temp_dir,
        }
    }

    /// Put entries straight into the index and refresh the stats snapshot.
    pub fn seed_index(&self, entries: Vec<Entry>) {
        for entry in entries {
            self.indexer.rooms_batch(entry.id.clone(), entry).unwrap();
        }
        self.indexer.index_batch().unwrap();
        self.data
            .set_index_indexed_rooms(self.indexer.len() as u64)
            .unwrap();
        self.stats.reload();
    }

    /// Record counters and the indexing finish time, then reload.
    pub fn seed_stats(&self, online_servers: u64, indexed_rooms: u64, finished_at: DateTime<Utc>) {
        self.data.set_index_online_servers(online_servers).unwrap();
        self.data.set_index_indexed_rooms(indexed_rooms).unwrap();
        self.data.set_started_at("indexing", finished_at).unwrap();
        self.data.set_finished_at("indexing", finished_at).unwrap();
        self.stats.reload();
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, &[]).await
    }

    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request("GET", path, headers).await
    }

    /// POST with admin basic auth credentials.
    pub async fn post_admin(&self, path: &str, login: &str, password: &str) -> TestResponse {
        let auth = format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", login, password))
        );
        self.request("POST", path, &[("authorization", auth.as_str())])
            .await
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub fn entry(id: &str, name: &str, topic: &str, language: &str, members: u64) -> Entry {
    Entry {
        id: id.to_string(),
        kind: "room".to_string(),
        alias: format!("#{}:rooms.test", name.replace(' ', "-")),
        name: name.to_string(),
        topic: topic.to_string(),
        avatar: String::new(),
        avatar_url: String::new(),
        server: "rooms.test".to_string(),
        members,
        language: language.to_string(),
    }
}

/// Header value as &str, empty when missing.
pub fn header_str<'a>(response: &'a TestResponse, name: &str) -> &'a str {
    response
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

#[allow(dead_code)]
pub fn auth_header(login: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", login, password))
    )
}
