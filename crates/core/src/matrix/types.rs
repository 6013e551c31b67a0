use std::collections::HashMap;

use serde::Deserialize;

use crate::model::MatrixRoom;

/// One page of the public rooms directory.
#[derive(Debug, Default, Deserialize)]
pub struct PublicRoomsResponse {
    #[serde(default)]
    pub chunk: Vec<MatrixRoom>,
    #[serde(default)]
    pub next_batch: String,
    #[serde(default, rename = "total_room_count_estimate")]
    pub total: u64,
}

/// `/.well-known/matrix/server` document.
#[derive(Debug, Deserialize)]
pub struct WellKnownServer {
    #[serde(rename = "m.server", default)]
    pub server: String,
}

/// `/.well-known/matrix/client` document.
#[derive(Debug, Deserialize)]
pub struct WellKnownClient {
    #[serde(rename = "m.homeserver", default)]
    pub homeserver: WellKnownHomeserver,
}

#[derive(Debug, Default, Deserialize)]
pub struct WellKnownHomeserver {
    #[serde(rename = "base_url", default)]
    pub base_url: String,
}

/// `/_matrix/key/v2/server` response.
#[derive(Debug, Deserialize)]
pub struct ServerKeysResponse {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub valid_until_ts: i64,
    #[serde(default)]
    pub verify_keys: HashMap<String, VerifyKey>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyKey {
    #[serde(default)]
    pub key: String,
}

/// MSC1929 `/.well-known/matrix/support` document.
#[derive(Debug, Default, Deserialize)]
pub struct SupportResponse {
    #[serde(default)]
    pub contacts: Vec<SupportContact>,
    #[serde(default)]
    pub support_page: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SupportContact {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub matrix_id: String,
    #[serde(default)]
    pub role: String,
}

impl SupportResponse {
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.support_page.is_empty()
    }
}
