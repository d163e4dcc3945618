//! # Outbound
//!
//! Async HTTPS client engine for talking to JSON APIs.
//!
//! HTTP/1.1 over BoringSSL with a per-host connection pool, a resumable
//! chunked decoder, an RFC 6265 style cookie jar, a configurable redirect
//! policy, GET retry with exponential backoff, and per-call metrics.
//!
//! ```rust,ignore
//! use outbound::{Client, RetryOptions};
//!
//! let client = Client::new()?;
//! let resp = client.get("api.example.com", 443, "/v1/items?page=2", &[]).await?;
//! let items: serde_json::Value = resp.json()?;
//!
//! let resp = client
//!     .get_with_retry("api.example.com", 443, "/health", &[], &RetryOptions::default(), None)
//!     .await?;
//! ```

pub mod chunked;
pub mod client;
pub mod cookie;
pub mod decode;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod options;
pub mod redirect;
pub mod response;
pub mod url;

// Transport layer
pub mod transport;

// Connection pooling
pub mod pool;

// Re-exports
pub use client::{Client, ClientBuilder};
pub use cookie::{Cookie, CookieJar, SameSite};
pub use error::{Error, ErrorKind, Result};
pub use metrics::{MetricsCallback, RequestMetrics};
pub use options::{RequestOptions, RetryOptions};
pub use redirect::{RedirectMode, RedirectPolicy};
pub use response::Response;
pub use url::Url;
