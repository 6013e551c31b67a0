//! Federation endpoint resolution: well-known, SRV, and fallbacks.

use std::time::Instant;

use tracing::debug;

use super::error::ClientError;
use super::types::{WellKnownClient, WellKnownServer};
use super::{CachedUrl, Client};

impl Client {
    /// Resolve the federation base URL of a server, cache-through with a
    /// 24 h TTL. Resolution order: well-known, `_matrix-fed._tcp` SRV,
    /// `_matrix._tcp` SRV, then `https://<name>:8448`. With `discover`
    /// set, a freshly resolved name is also handed to the discovery hook.
    pub async fn get_url(&self, server_name: &str, discover: bool) -> String {
        if let Some(cached) = self.cached_url(server_name) {
            return cached;
        }

        let url = match self.parse_server_well_known(server_name).await {
            Ok(host_port) => format!("https://{}", host_port),
            Err(_) => match self.parse_srv("matrix-fed", server_name).await {
                Ok(host_port) => format!("https://{}", host_port),
                Err(_) => match self.parse_srv("matrix", server_name).await {
                    Ok(host_port) => format!("https://{}", host_port),
                    Err(_) => format!("https://{}:8448", server_name),
                },
            },
        };

        debug!(server = server_name, url = %url, "resolved federation URL");
        self.cache_url(server_name, &url);
        if discover {
            self.enqueue_discovery(server_name);
        }
        url
    }

    fn cached_url(&self, server_name: &str) -> Option<String> {
        let cache = self.url_cache.read().unwrap();
        let entry = cache.get(server_name)?;
        if entry.resolved_at.elapsed() < Self::url_cache_ttl() {
            Some(entry.url.clone())
        } else {
            None
        }
    }

    fn cache_url(&self, server_name: &str, url: &str) {
        self.url_cache.write().unwrap().insert(
            server_name.to_string(),
            CachedUrl {
                url: url.to_string(),
                resolved_at: Instant::now(),
            },
        );
    }

    /// `/.well-known/matrix/server` → `host:port` (port defaults to 8448).
    pub(crate) async fn parse_server_well_known(
        &self,
        server_name: &str,
    ) -> Result<String, ClientError> {
        let endpoint = format!("https://{}/.well-known/matrix/server", server_name);
        let resp = self.call(&endpoint, false).await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(ClientError::Status(resp.status().as_u16()));
        }
        let wellknown: WellKnownServer = resp.json().await?;
        if wellknown.server.is_empty() {
            return Err(ClientError::Invalid(
                "/.well-known/matrix/server is empty".to_string(),
            ));
        }
        Ok(split_host_port(&wellknown.server))
    }

    /// `/.well-known/matrix/client` → client-server API base URL.
    pub async fn parse_client_well_known(&self, server_name: &str) -> Result<String, ClientError> {
        let endpoint = format!("https://{}/.well-known/matrix/client", server_name);
        let resp = self.call(&endpoint, false).await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(ClientError::Status(resp.status().as_u16()));
        }
        let wellknown: WellKnownClient = resp.json().await?;
        if wellknown.homeserver.base_url.is_empty() {
            return Err(ClientError::Invalid(
                "/.well-known/matrix/client is empty".to_string(),
            ));
        }
        Ok(wellknown.homeserver.base_url)
    }

    /// First SRV record of `_<service>._tcp.<name>` as `host:port`.
    pub(crate) async fn parse_srv(
        &self,
        service: &str,
        server_name: &str,
    ) -> Result<String, ClientError> {
        let lookup = self
            .resolver()
            .srv_lookup(format!("_{}._tcp.{}.", service, server_name))
            .await?;
        let record = lookup.iter().next().ok_or_else(|| {
            ClientError::Invalid(format!("no _{}._tcp SRV records", service))
        })?;
        let target = record.target().to_utf8();
        Ok(format!(
            "{}:{}",
            target.trim_end_matches('.'),
            record.port()
        ))
    }
}

fn split_host_port(host: &str) -> String {
    match host.split_once(':') {
        Some((host, port)) => format!("{}:{}", host, port),
        None => format!("{}:8448", host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatrixConfig;

    #[test]
    fn test_split_host_port_with_port() {
        assert_eq!(split_host_port("matrix.example.com:443"), "matrix.example.com:443");
    }

    #[test]
    fn test_split_host_port_default() {
        assert_eq!(split_host_port("matrix.example.com"), "matrix.example.com:8448");
    }

    #[tokio::test]
    async fn test_get_url_prefers_cached_resolution() {
        let client = Client::new(&MatrixConfig::default()).unwrap();
        client.cache_url("cached.test", "https://fed.cached.test:443");

        // repeated lookups return the cached URL without resolving again
        assert_eq!(
            client.get_url("cached.test", false).await,
            "https://fed.cached.test:443"
        );
        assert_eq!(
            client.get_url("cached.test", false).await,
            "https://fed.cached.test:443"
        );
    }
}
