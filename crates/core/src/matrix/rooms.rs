//! Public rooms directory access.

use super::error::{parse_error_resp, ClientError};
use super::types::PublicRoomsResponse;
use super::Client;

/// Page size requested from the rooms directory.
pub const ROOMS_PAGE_LIMIT: &str = "10000";

impl Client {
    /// One page of `GET /_matrix/client/v3/publicRooms?server=<name>`.
    /// Requests go through the proxy when one is configured, otherwise
    /// against the resolved federation URL of the server itself.
    pub async fn public_rooms_page(
        &self,
        server_name: &str,
        limit: &str,
        since: &str,
    ) -> Result<PublicRoomsResponse, ClientError> {
        let base = if self.proxy_url().is_empty() {
            self.get_url(server_name, false).await
        } else {
            self.proxy_url().to_string()
        };

        let mut endpoint = format!(
            "{}/_matrix/client/v3/publicRooms?server={}&limit={}",
            base,
            urlencoding::encode(server_name),
            limit
        );
        if !since.is_empty() {
            endpoint.push_str(&format!("&since={}", urlencoding::encode(since)));
        }

        let resp = self.call(&endpoint, true).await?;
        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.bytes().await.unwrap_or_default();
            if let Some(merr) = parse_error_resp(status, &body) {
                return Err(ClientError::Matrix(merr));
            }
            return Err(ClientError::Status(status));
        }

        Ok(resp.json().await?)
    }

    /// Probe used during discovery: a limit-1 directory call proves the
    /// server actually serves public rooms.
    pub async fn validate_discovered_server(&self, server_name: &str) -> bool {
        self.public_rooms_page(server_name, "1", "").await.is_ok()
    }
}
