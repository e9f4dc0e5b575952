//! HTTP transport abstraction for testability.
//!
//! All remote access (index refresh, tile downloads, geocoding requests)
//! goes through the [`Transport`] trait so tests can inject mock transports
//! and count calls instead of hitting the network.

use std::time::Duration;

use thiserror::Error;

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Errors from HTTP transfers.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Request could not be sent or the response body not read.
    #[error("HTTP request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// Metadata reported by a HEAD request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteInfo {
    /// `Content-Length` when reported.
    pub content_length: Option<u64>,

    /// Transport-level content fingerprint: `Content-MD5` when present,
    /// otherwise the `ETag`. Compared verbatim, never interpreted.
    pub digest: Option<String>,
}

/// Trait for the HTTP operations the pipeline needs.
pub trait Transport: Send + Sync {
    /// Performs a HEAD request and returns the reported metadata.
    fn head(&self, url: &str) -> Result<RemoteInfo, TransportError>;

    /// Performs a GET request and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;

    /// Performs a POST with a JSON body and returns the response body.
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Vec<u8>, TransportError>;
}

/// Real transport implementation using blocking reqwest.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn check_status(url: &str, response: &reqwest::blocking::Response) -> Result<(), TransportError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

impl Transport for ReqwestTransport {
    fn head(&self, url: &str) -> Result<RemoteInfo, TransportError> {
        let response = self
            .client
            .head(url)
            .send()
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Self::check_status(url, &response)?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        Ok(RemoteInfo {
            content_length: header("content-length").and_then(|s| s.parse().ok()),
            digest: header("content-md5").or_else(|| header("etag")),
        })
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Self::check_status(url, &response)?;

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })
    }

    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Self::check_status(url, &response)?;

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                reason: format!("failed to read response: {}", e),
            })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Mock transport for tests: canned responses plus call counters.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::{RemoteInfo, Transport, TransportError};

    #[derive(Default)]
    pub struct MockTransport {
        bodies: Mutex<HashMap<String, Vec<u8>>>,
        infos: Mutex<HashMap<String, RemoteInfo>>,
        pub head_calls: AtomicUsize,
        pub get_calls: AtomicUsize,
        pub post_calls: AtomicUsize,
        pub post_response: Mutex<Option<Vec<u8>>>,
        pub post_status: Mutex<Option<u16>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a GET body for a URL.
        pub fn serve(&self, url: &str, body: Vec<u8>) {
            self.bodies.lock().insert(url.to_string(), body);
        }

        /// Registers HEAD metadata for a URL.
        pub fn describe(&self, url: &str, info: RemoteInfo) {
            self.infos.lock().insert(url.to_string(), info);
        }

        pub fn get_count(&self) -> usize {
            self.get_calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for MockTransport {
        fn head(&self, url: &str) -> Result<RemoteInfo, TransportError> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            self.infos
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }

        fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.bodies
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }

        fn post_json(
            &self,
            url: &str,
            _body: &serde_json::Value,
        ) -> Result<Vec<u8>, TransportError> {
            self.post_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = *self.post_status.lock() {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status,
                });
            }
            self.post_response
                .lock()
                .clone()
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    #[test]
    fn test_mock_counts_calls() {
        let mock = MockTransport::new();
        mock.serve("http://example.com/a", vec![1, 2, 3]);

        assert_eq!(mock.get("http://example.com/a").unwrap(), vec![1, 2, 3]);
        assert_eq!(mock.get_count(), 1);
        assert!(mock.get("http://example.com/missing").is_err());
        assert_eq!(mock.get_count(), 2);
    }

    #[test]
    fn test_mock_head_info() {
        let mock = MockTransport::new();
        mock.describe(
            "http://example.com/a",
            RemoteInfo {
                content_length: Some(3),
                digest: Some("abc".into()),
            },
        );

        let info = mock.head("http://example.com/a").unwrap();
        assert_eq!(info.content_length, Some(3));
        assert_eq!(info.digest.as_deref(), Some("abc"));
    }
}
