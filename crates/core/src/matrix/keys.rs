//! Server signing keys lookup (`/_matrix/key/v2/server`).

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::Utc;
use tracing::warn;

use super::error::{parse_error_resp, ClientError};
use super::types::ServerKeysResponse;
use super::Client;

impl Client {
    async fn lookup_keys(&self, server_name: &str) -> Result<ServerKeysResponse, ClientError> {
        let base = self.get_url(server_name, true).await;
        let resp = self.call(&format!("{}/_matrix/key/v2/server", base), false).await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        if let Some(merr) = parse_error_resp(status, &body) {
            return Err(ClientError::Matrix(merr));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Cached signing keys of a server, keyed by key id. Keys that fail
    /// base64 decoding are skipped; an expired `valid_until_ts` only warns.
    /// Signature verification of the response is a planned extension.
    pub async fn query_keys(&self, server_name: &str) -> Option<HashMap<String, Vec<u8>>> {
        if let Some(cached) = self.keys_cache.read().unwrap().get(server_name) {
            return Some(cached.clone());
        }

        let resp = match self.lookup_keys(server_name).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(server = server_name, error = %e, "keys query failed");
                return None;
            }
        };
        if resp.server_name != server_name {
            warn!(server = server_name, "server name doesn't match");
            return None;
        }
        if resp.valid_until_ts <= Utc::now().timestamp_millis() {
            warn!(server = server_name, "server keys are expired");
        }

        let mut keys = HashMap::new();
        for (id, data) in resp.verify_keys {
            match STANDARD_NO_PAD.decode(&data.key) {
                Ok(key) => {
                    keys.insert(id, key);
                }
                Err(e) => warn!(server = server_name, key = id.as_str(), error = %e,
                    "failed to decode server key"),
            }
        }

        self.keys_cache
            .write()
            .unwrap()
            .insert(server_name.to_string(), keys.clone());
        Some(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_std_base64_roundtrip() {
        // ed25519 public keys on the wire use the unpadded standard alphabet
        let key = [7u8; 32];
        let encoded = STANDARD_NO_PAD.encode(key);
        assert!(!encoded.ends_with('='));
        assert_eq!(STANDARD_NO_PAD.decode(&encoded).unwrap(), key);
    }

    #[test]
    fn test_padded_key_is_rejected() {
        let padded = base64::engine::general_purpose::STANDARD.encode([1u8; 31]);
        assert!(padded.ends_with('='));
        assert!(STANDARD_NO_PAD.decode(&padded).is_err());
    }
}
