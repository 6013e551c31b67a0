//! MSC1929 server contacts (`/.well-known/matrix/support`).

use tracing::debug;

use super::types::SupportResponse;
use super::Client;
use crate::model::MatrixServerContacts;

impl Client {
    /// Best-effort contact lookup; any failure yields `None`.
    pub async fn server_contacts(&self, server_name: &str) -> Option<MatrixServerContacts> {
        let endpoint = format!("https://{}/.well-known/matrix/support", server_name);
        let resp = match self.call(&endpoint, false).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(server = server_name, error = %e, "cannot get server contacts");
                return None;
            }
        };
        if resp.status() != reqwest::StatusCode::OK {
            return None;
        }
        let support: SupportResponse = resp.json().await.ok()?;
        if support.is_empty() {
            return None;
        }

        let emails = uniq(support
            .contacts
            .iter()
            .map(|c| c.email_address.clone())
            .filter(|e| !e.is_empty()));
        let mxids = uniq(support
            .contacts
            .iter()
            .map(|c| c.matrix_id.clone())
            .filter(|m| !m.is_empty()));

        Some(MatrixServerContacts {
            emails,
            mxids,
            url: support.support_page,
        })
    }
}

fn uniq<I: Iterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}
