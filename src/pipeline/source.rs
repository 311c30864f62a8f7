//! Remote media source: metadata probe and body download

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;

use super::{EXPECTED_MIME, Failure, MAX_SOURCE_BYTES};
use crate::{Error, Result};

/// What the probe learned about a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Declared content type
    pub content_type: String,
    /// Declared length; `None` when absent or unparsable
    pub content_length: Option<u64>,
}

/// Where media comes from
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Check that `url` is fetchable WebM under the size ceiling, without
    /// transferring the body
    async fn probe(&self, url: &str) -> std::result::Result<ResourceInfo, Failure>;

    /// Stream the body of `url` into `dest`, replacing its contents
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<u64, Failure>;
}

/// Judge a probe response
///
/// Status must be 2xx, the content type's essence must be `video/webm`, and
/// a declared length must not exceed `max_bytes`. A missing or unparsable
/// length counts as unknown and passes; the download enforces the ceiling.
///
/// # Errors
///
/// Returns `BadStatus`, `WrongType` or `TooLarge`
pub fn check_probe(
    status: StatusCode,
    headers: &HeaderMap,
    max_bytes: u64,
) -> std::result::Result<ResourceInfo, Failure> {
    if !status.is_success() {
        return Err(Failure::BadStatus(status.as_u16()));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case(EXPECTED_MIME) {
        return Err(Failure::WrongType(content_type));
    }

    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(len) = content_length
        && len > max_bytes
    {
        return Err(Failure::TooLarge(len));
    }

    Ok(ResourceInfo {
        content_type,
        content_length,
    })
}

/// HTTP(S) media source
#[derive(Debug, Clone)]
pub struct HttpSource {
    probe_client: Client,
    fetch_client: Client,
    max_bytes: u64,
}

impl HttpSource {
    /// Create a source whose probe gives up after `probe_timeout`
    ///
    /// Downloads have no overall timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP clients cannot be built
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        let probe_client = Client::builder()
            .timeout(probe_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("webm-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;

        let fetch_client = Client::builder()
            .connect_timeout(probe_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("webm-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            probe_client,
            fetch_client,
            max_bytes: MAX_SOURCE_BYTES,
        })
    }

    /// Override the size ceiling
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn probe(&self, url: &str) -> std::result::Result<ResourceInfo, Failure> {
        let response = self
            .probe_client
            .head(url)
            .send()
            .await
            .map_err(|e| Failure::Unreachable(e.to_string()))?;

        check_probe(response.status(), response.headers(), self.max_bytes)
    }

    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<u64, Failure> {
        let response = self
            .fetch_client
            .get(url)
            .send()
            .await
            .map_err(|e| Failure::DownloadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::DownloadFailed(format!("status {status}")));
        }

        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(Failure::TooLarge(len));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Failure::DownloadFailed(format!("create {}: {e}", dest.display())))?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Failure::DownloadFailed(e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(Failure::TooLarge(written));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| Failure::DownloadFailed(format!("write: {e}")))?;
        }

        file.flush()
            .await
            .map_err(|e| Failure::DownloadFailed(format!("flush: {e}")))?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(content_type: Option<&str>, length: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(ct) = content_type {
            map.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        if let Some(len) = length {
            map.insert(CONTENT_LENGTH, HeaderValue::from_str(len).unwrap());
        }
        map
    }

    #[test]
    fn accepts_webm_under_ceiling() {
        let info = check_probe(
            StatusCode::OK,
            &headers(Some("video/webm"), Some("1000")),
            MAX_SOURCE_BYTES,
        )
        .unwrap();
        assert_eq!(info.content_length, Some(1000));
    }

    #[test]
    fn non_success_status() {
        let err = check_probe(
            StatusCode::NOT_FOUND,
            &headers(Some("video/webm"), None),
            MAX_SOURCE_BYTES,
        )
        .unwrap_err();
        assert_eq!(err, Failure::BadStatus(404));
    }

    #[test]
    fn wrong_or_missing_type() {
        let err = check_probe(StatusCode::OK, &headers(Some("text/html"), None), MAX_SOURCE_BYTES)
            .unwrap_err();
        assert_eq!(err, Failure::WrongType("text/html".to_string()));

        let err = check_probe(StatusCode::OK, &headers(None, None), MAX_SOURCE_BYTES).unwrap_err();
        assert!(matches!(err, Failure::WrongType(_)));
    }

    #[test]
    fn type_parameters_are_ignored() {
        let info = check_probe(
            StatusCode::OK,
            &headers(Some("Video/WebM; codecs=\"vp9\""), None),
            MAX_SOURCE_BYTES,
        )
        .unwrap();
        assert!(info.content_length.is_none());
    }

    #[test]
    fn too_large_declared_length() {
        let over = (MAX_SOURCE_BYTES + 1).to_string();
        let err = check_probe(
            StatusCode::OK,
            &headers(Some("video/webm"), Some(&over)),
            MAX_SOURCE_BYTES,
        )
        .unwrap_err();
        assert_eq!(err, Failure::TooLarge(MAX_SOURCE_BYTES + 1));

        let exact = MAX_SOURCE_BYTES.to_string();
        assert!(
            check_probe(StatusCode::OK, &headers(Some("video/webm"), Some(&exact)), MAX_SOURCE_BYTES)
                .is_ok()
        );
    }

    #[test]
    fn unparsable_length_is_unknown() {
        let info = check_probe(
            StatusCode::OK,
            &headers(Some("video/webm"), Some("lots")),
            MAX_SOURCE_BYTES,
        )
        .unwrap();
        assert_eq!(info.content_length, None);
    }
}
