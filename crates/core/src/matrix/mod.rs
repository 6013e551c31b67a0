//! Outbound Matrix federation and client-server API plumbing.
//!
//! Covers endpoint resolution (well-known + SRV with caching), the public
//! rooms directory, server keys, media download, and MSC1929 contacts.

mod error;
mod keys;
mod media;
mod msc1929;
mod resolve;
mod rooms;
mod types;

pub use error::{ClientError, MatrixError};
pub use rooms::ROOMS_PAGE_LIMIT;
pub use types::*;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use tokio::sync::mpsc;

use crate::config::MatrixConfig;

pub const USER_AGENT: &str = concat!("roomsearch/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const URL_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Media servers tried alongside the origin for every avatar download.
pub(crate) const MEDIA_FALLBACKS: &[&str] = &["https://matrix-client.matrix.org"];

pub(crate) struct CachedUrl {
    pub url: String,
    pub resolved_at: Instant,
}

/// Matrix HTTP client with idempotent concurrent caches for resolved
/// federation URLs and server keys.
pub struct Client {
    http: reqwest::Client,
    resolver: TokioAsyncResolver,
    proxy_url: String,
    proxy_token: String,
    pub(crate) url_cache: RwLock<HashMap<String, CachedUrl>>,
    pub(crate) keys_cache: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
    discover_tx: RwLock<Option<mpsc::UnboundedSender<String>>>,
}

impl Client {
    pub fn new(config: &MatrixConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });

        Ok(Self {
            http,
            resolver,
            proxy_url: config.proxy_url.trim_end_matches('/').to_string(),
            proxy_token: config.proxy_token.clone(),
            url_cache: RwLock::new(HashMap::new()),
            keys_cache: RwLock::new(HashMap::new()),
            discover_tx: RwLock::new(None),
        })
    }

    /// Install the background discovery hook. Newly resolved server names
    /// are enqueued fire-and-forget when resolution asks for it.
    pub fn set_discover_hook(&self, tx: mpsc::UnboundedSender<String>) {
        *self.discover_tx.write().unwrap() = Some(tx);
    }

    pub(crate) fn enqueue_discovery(&self, server_name: &str) {
        if let Some(tx) = self.discover_tx.read().unwrap().as_ref() {
            let _ = tx.send(server_name.to_string());
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn resolver(&self) -> &TokioAsyncResolver {
        &self.resolver
    }

    pub(crate) fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    pub(crate) fn url_cache_ttl() -> Duration {
        URL_CACHE_TTL
    }

    /// GET with the JSON accept header, optionally carrying the proxy
    /// bearer token.
    pub(crate) async fn call(
        &self,
        endpoint: &str,
        with_auth: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .http
            .get(endpoint)
            .header(reqwest::header::ACCEPT, "application/json");
        if with_auth && !self.proxy_token.is_empty() {
            request = request.bearer_auth(&self.proxy_token);
        }
        Ok(request.send().await?)
    }
}
