use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard Matrix error envelope.
#[derive(Debug, Clone, Default, Error, Serialize, Deserialize)]
#[error("{code}: {message} (HTTP {http_status})")]
pub struct MatrixError {
    #[serde(rename = "errcode", default)]
    pub code: String,
    #[serde(rename = "error", default)]
    pub message: String,
    #[serde(skip)]
    pub http_status: u16,
}

/// Parse a response body into a Matrix error. Returns `None` when the body
/// is empty or carries no `errcode`.
pub(crate) fn parse_error_resp(http_status: u16, body: &[u8]) -> Option<MatrixError> {
    if body.is_empty() {
        return None;
    }
    let mut err: MatrixError = serde_json::from_slice(body).ok()?;
    if err.code.is_empty() {
        return None;
    }
    err.http_status = http_status;
    Some(err)
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("dns error: {0}")]
    Dns(#[from] hickory_resolver::error::ResolveError),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_resp() {
        let body = br#"{"errcode":"M_FORBIDDEN","error":"denied"}"#;
        let err = parse_error_resp(403, body).unwrap();
        assert_eq!(err.code, "M_FORBIDDEN");
        assert_eq!(err.message, "denied");
        assert_eq!(err.http_status, 403);
    }

    #[test]
    fn test_parse_error_resp_empty_body() {
        assert!(parse_error_resp(500, b"").is_none());
    }

    #[test]
    fn test_parse_error_resp_no_errcode() {
        let body = br#"{"chunk":[]}"#;
        assert!(parse_error_resp(200, body).is_none());
    }

    #[test]
    fn test_parse_error_resp_invalid_json() {
        assert!(parse_error_resp(502, b"<html>bad gateway</html>").is_none());
    }
}
