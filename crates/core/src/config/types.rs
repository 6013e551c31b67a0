use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Seed list of homeserver names used to bootstrap discovery.
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub public: PublicConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default = "default_true")]
    pub cors: bool,
}

/// HTTP bind address
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Key-value store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("roomsearch.db")
}

/// Full-text index location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("roomsearch-index")
}

/// Outbound Matrix API settings.
///
/// When `proxy_url` is set, public rooms requests go through it instead of
/// the per-server resolved federation URL.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub proxy_url: String,
    #[serde(default)]
    pub proxy_token: String,
}

/// Public-facing URLs of this deployment
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PublicConfig {
    /// UI base URL, used as the webhook username host.
    #[serde(default)]
    pub ui: String,
    /// API base URL, used to build HTTPS avatar URLs.
    #[serde(default)]
    pub api: String,
}

/// HTTP cache headers and BunnyCDN purge settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_age")]
    pub max_age: u32,
    #[serde(default)]
    pub bunny: BunnyConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
            bunny: BunnyConfig::default(),
        }
    }
}

fn default_max_age() -> u32 {
    86400
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BunnyConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhooksConfig {
    /// Webhook receiving the markdown stats summary after each collection.
    #[serde(default)]
    pub stats: String,
}

/// Worker pool sizes for the crawl phases
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkersConfig {
    #[serde(default = "default_discovery_workers")]
    pub discovery: usize,
    #[serde(default = "default_parsing_workers")]
    pub parsing: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            discovery: default_discovery_workers(),
            parsing: default_parsing_workers(),
        }
    }
}

fn default_discovery_workers() -> usize {
    10
}

fn default_parsing_workers() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Maximum rooms accumulated before a store/index batch is flushed.
    #[serde(default = "default_rooms_batch")]
    pub rooms: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rooms: default_rooms_batch(),
        }
    }
}

fn default_rooms_batch() -> usize {
    10000
}

/// Admin API credentials (basic auth) and optional IP allowlist
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub ips: Vec<String>,
}

/// Static blocklist entries loaded at startup
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BlocklistConfig {
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Pipeline trigger intervals, in seconds. Zero disables a trigger.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub discovery_interval_secs: u64,
    #[serde(default)]
    pub parsing_interval_secs: u64,
    #[serde(default)]
    pub full_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub servers: Vec<String>,
    pub server: ServerConfig,
    pub public: PublicConfig,
    pub cache_max_age: u32,
    pub bunny_configured: bool,
    pub proxy_configured: bool,
    pub webhook_configured: bool,
    pub workers: WorkersConfig,
    pub batch: BatchConfig,
    pub scheduler: SchedulerConfig,
    pub cors: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            servers: config.servers.clone(),
            server: config.server.clone(),
            public: config.public.clone(),
            cache_max_age: config.cache.max_age,
            bunny_configured: !config.cache.bunny.key.is_empty(),
            proxy_configured: !config.matrix.proxy_url.is_empty(),
            webhook_configured: !config.webhooks.stats.is_empty(),
            workers: config.workers.clone(),
            batch: config.batch.clone(),
            scheduler: config.scheduler.clone(),
            cors: config.cors,
        }
    }
}
