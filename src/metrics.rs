//! Per-call request metrics handed to the client's metrics callback.

use std::sync::Arc;
use std::time::Duration;

use http::Method;

use crate::error::ErrorKind;

/// What happened during one client call (the whole redirect chain).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMetrics {
    pub method: Method,
    pub host: String,
    pub port: u16,
    /// Target of the original request, before any redirect.
    pub target: String,
    /// Final status, if a final response was read.
    pub status: Option<u16>,
    /// Redirect hops followed.
    pub redirects: u32,
    /// Whether the last hop ran on a pooled connection.
    pub reused_connection: bool,
    /// Body bytes read from the wire across all hops, before content decoding.
    pub bytes_received: u64,
    pub elapsed: Duration,
    /// 1-based attempt number when driven by the retry wrapper, else 1.
    pub attempt: u32,
    pub error: Option<ErrorKind>,
}

impl RequestMetrics {
    pub(crate) fn new(method: Method, host: &str, port: u16, target: &str) -> Self {
        Self {
            method,
            host: host.to_string(),
            port,
            target: target.to_string(),
            status: None,
            redirects: 0,
            reused_connection: false,
            bytes_received: 0,
            elapsed: Duration::ZERO,
            attempt: 1,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Callback invoked once per call with its metrics.
pub type MetricsCallback = Arc<dyn Fn(&RequestMetrics) + Send + Sync>;
