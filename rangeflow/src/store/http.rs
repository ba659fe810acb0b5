//! HTTP object store client.
//!
//! Talks to an S3-style endpoint where each object lives at
//! `{endpoint}/{key}`:
//! - `HEAD` for the object size (`content-length`)
//! - `GET` with a `Range: bytes=a-b` header for partial reads
//! - `PUT` to store, `DELETE` to remove
//!
//! Responses are classified for the retry logic: timeouts, connection
//! failures, `429` and `5xx` are transient; `404` is not-found; any other
//! non-success status is terminal. A ranged `GET` answered with anything
//! but `206` is terminal unless the body is exactly the requested span.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, Response, StatusCode};

use super::{BoxFuture, RangeStore};
use crate::error::{StoreError, StoreResult};

/// Default timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Object store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    endpoint: String,
}

impl HttpStore {
    /// Create a store with the default request timeout.
    pub fn new(endpoint: impl Into<String>) -> StoreResult<Self> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a store with a custom request timeout.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Terminal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL objects are resolved against.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn object_url(&self, key: &str) -> StoreResult<String> {
        if key.is_empty() || key.split('/').any(|part| part == "..") {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(format!("{}/{}", self.endpoint, key.trim_start_matches('/')))
    }

    /// Fail non-success responses with the matching error class.
    fn check_status(key: &str, response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(status_error(key, status))
    }
}

fn status_error(key: &str, status: StatusCode) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound {
            key: key.to_string(),
        }
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Transient(format!("HTTP {} for {}", status, key))
    } else {
        StoreError::Terminal(format!("HTTP {} for {}", status, key))
    }
}

/// Accept a ranged GET only if the body is exactly the requested span.
///
/// A server that ignores `Range` answers `200` with the whole object. That
/// is only usable when the range covers the whole object; otherwise the
/// body is refused before it is read.
fn check_range_response(
    key: &str,
    status: StatusCode,
    content_length: Option<u64>,
    start: u64,
    end: u64,
) -> StoreResult<()> {
    if status == StatusCode::PARTIAL_CONTENT {
        return Ok(());
    }
    let expected = end.saturating_sub(start) + 1;
    if start == 0 && content_length == Some(expected) {
        return Ok(());
    }
    Err(StoreError::Terminal(format!(
        "HTTP {} for range {}-{} of {}: server ignored Range",
        status, start, end, key
    )))
}

fn request_error(key: &str, err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        StoreError::Transient(format!("request for {} failed: {}", key, err))
    } else {
        StoreError::Terminal(format!("request for {} failed: {}", key, err))
    }
}

impl RangeStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    fn object_size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<u64>> {
        Box::pin(async move {
            let url = self.object_url(key)?;
            let response = self
                .client
                .head(&url)
                .send()
                .await
                .map_err(|e| request_error(key, e))?;
            let response = Self::check_status(key, response)?;

            response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| StoreError::Terminal(format!("no content-length for {}", key)))
        })
    }

    fn get_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Bytes>> {
        Box::pin(async move {
            let url = self.object_url(key)?;
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| request_error(key, e))?;
            let response = Self::check_status(key, response)?;
            response.bytes().await.map_err(|e| request_error(key, e))
        })
    }

    fn get_range<'a>(
        &'a self,
        key: &'a str,
        start: u64,
        end: u64,
    ) -> BoxFuture<'a, StoreResult<Bytes>> {
        Box::pin(async move {
            let url = self.object_url(key)?;
            let response = self
                .client
                .get(&url)
                .header(RANGE, format!("bytes={}-{}", start, end))
                .send()
                .await
                .map_err(|e| request_error(key, e))?;
            let response = Self::check_status(key, response)?;
            check_range_response(
                key,
                response.status(),
                response.content_length(),
                start,
                end,
            )?;
            response.bytes().await.map_err(|e| request_error(key, e))
        })
    }

    fn put_object<'a>(&'a self, key: &'a str, data: Bytes) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let url = self.object_url(key)?;
            let response = self
                .client
                .put(&url)
                .body(data)
                .send()
                .await
                .map_err(|e| request_error(key, e))?;
            Self::check_status(key, response)?;
            Ok(())
        })
    }

    fn delete_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let url = self.object_url(key)?;
            let response = self
                .client
                .delete(&url)
                .send()
                .await
                .map_err(|e| request_error(key, e))?;

            match Self::check_status(key, response) {
                Ok(_) | Err(StoreError::NotFound { .. }) => Ok(()),
                Err(e) => Err(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_joins_endpoint() {
        let store = HttpStore::new("http://localhost:9000/bucket/").unwrap();
        assert_eq!(store.endpoint(), "http://localhost:9000/bucket");
        assert_eq!(
            store.object_url("users/1/file").unwrap(),
            "http://localhost:9000/bucket/users/1/file"
        );
    }

    #[test]
    fn test_object_url_rejects_traversal() {
        let store = HttpStore::new("http://localhost").unwrap();
        assert!(matches!(
            store.object_url("a/../b"),
            Err(StoreError::InvalidKey { .. })
        ));
        assert!(store.object_url("").is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error("k", StatusCode::NOT_FOUND),
            StoreError::NotFound { .. }
        ));
        assert!(status_error("k", StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(status_error("k", StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!status_error("k", StatusCode::FORBIDDEN).is_transient());
    }

    #[test]
    fn test_partial_content_accepted() {
        assert!(check_range_response("k", StatusCode::PARTIAL_CONTENT, Some(10), 50, 59).is_ok());
    }

    #[test]
    fn test_full_body_for_sub_range_rejected() {
        let err = check_range_response("k", StatusCode::OK, Some(1000), 100, 199).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("ignored Range"));
        // Unknown length is refused too.
        assert!(check_range_response("k", StatusCode::OK, None, 0, 99).is_err());
    }

    #[test]
    fn test_full_body_matching_whole_range_accepted() {
        assert!(check_range_response("k", StatusCode::OK, Some(100), 0, 99).is_ok());
    }

    /// Serve one connection with a `200` and a full body, ignoring `Range`.
    async fn serve_ignoring_range(body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_range_refuses_server_ignoring_range() {
        let endpoint = serve_ignoring_range(vec![7u8; 1000]).await;
        let store = HttpStore::new(endpoint).unwrap();

        let err = store.get_range("obj", 100, 199).await.unwrap_err();
        assert!(matches!(err, StoreError::Terminal(_)), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // Port 9 (discard) on loopback is closed on test machines.
        let store =
            HttpStore::with_timeout("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = store.get_range("obj", 0, 10).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
