//! Avatar media download, racing the origin against fallback servers.

use tokio::sync::mpsc;
use tracing::debug;

use super::{Client, MEDIA_FALLBACKS};

impl Client {
    /// All candidate URLs for a media id: the fallback media servers plus
    /// the origin's resolved base.
    async fn media_urls(&self, server_name: &str, media_id: &str) -> Vec<String> {
        let mut urls: Vec<String> = MEDIA_FALLBACKS
            .iter()
            .map(|base| media_url(base, server_name, media_id))
            .collect();
        let origin = self.get_url(server_name, false).await;
        urls.push(media_url(&origin, server_name, media_id));
        urls
    }

    /// Fetch a media item; the first HTTP 200 wins. Losers short-circuit on
    /// a failed non-blocking send into the capacity-1 channel and drop
    /// their response bodies. Returns the body and its content type.
    pub async fn download_media(
        &self,
        server_name: &str,
        media_id: &str,
    ) -> Option<(Vec<u8>, String)> {
        let (tx, mut rx) = mpsc::channel::<(Vec<u8>, String)>(1);

        for url in self.media_urls(server_name, media_id).await {
            let tx = tx.clone();
            let http = self.http().clone();
            tokio::spawn(async move {
                if tx.is_closed() {
                    return;
                }
                let resp = match http.get(&url).send().await {
                    Ok(resp) => resp,
                    Err(_) => return,
                };
                if resp.status() != reqwest::StatusCode::OK {
                    return;
                }
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let Ok(body) = resp.bytes().await else {
                    return;
                };
                // capacity-1 queue: whoever wins the race fills it, the
                // rest fail the send and exit
                let _ = tx.try_send((body.to_vec(), content_type));
            });
        }
        drop(tx);

        let result = rx.recv().await;
        if result.is_none() {
            debug!(server = server_name, media = media_id, "no media source responded");
        }
        result
    }
}

fn media_url(base: &str, server_name: &str, media_id: &str) -> String {
    format!(
        "{}/_matrix/media/v3/download/{}/{}",
        base.trim_end_matches('/'),
        server_name,
        media_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_url() {
        assert_eq!(
            media_url("https://matrix-client.matrix.org/", "example.com", "abc123"),
            "https://matrix-client.matrix.org/_matrix/media/v3/download/example.com/abc123"
        );
    }
}
