//! Per-request and retry configuration.
//!
//! # Timeout Types
//!
//! - **tcp_connect**: DNS resolution and TCP connect (each bounded separately)
//! - **tls_handshake**: TLS handshake after the socket is up
//! - **write**: writing the request head and body
//! - **read**: each read while waiting for the response head or body bytes
//!
//! Timeouts apply per operation and do not reset a shared deadline; a slow
//! but steadily progressing body never trips `read`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use outbound::{RequestOptions, RetryOptions};
//! use std::time::Duration;
//!
//! let opts = RequestOptions::default()
//!     .read_timeout(Duration::from_secs(5))
//!     .accept("application/vnd.twitchtv.v5+json");
//!
//! let retry = RetryOptions::default().max_attempts(5);
//! ```

use std::time::Duration;

use crate::decode::SUPPORTED_ENCODINGS;

/// Per-request options.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOptions {
    /// DNS + TCP connect timeout.
    ///
    /// Default: 10s
    pub tcp_connect_timeout: Duration,

    /// TLS handshake timeout.
    ///
    /// Default: 10s
    pub tls_handshake_timeout: Duration,

    /// Timeout for writing the request.
    ///
    /// Default: 30s
    pub write_timeout: Duration,

    /// Timeout for each read of the response.
    ///
    /// Default: 30s
    pub read_timeout: Duration,

    /// `Accept` header value.
    ///
    /// Default: `application/json`
    pub accept: String,

    /// `Accept-Encoding` header value. Empty omits the header.
    ///
    /// Default: the codings the client can decode (`gzip, br`)
    pub accept_encoding: String,

    /// Return bodies exactly as received, ignoring `Content-Encoding`.
    pub disable_auto_decode: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::api_defaults()
    }
}

impl RequestOptions {
    /// Defaults for JSON API calls.
    ///
    /// - tcp_connect: 10s
    /// - tls_handshake: 10s
    /// - write: 30s
    /// - read: 30s
    pub fn api_defaults() -> Self {
        Self {
            tcp_connect_timeout: Duration::from_secs(10),
            tls_handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            accept: "application/json".to_string(),
            accept_encoding: SUPPORTED_ENCODINGS.to_string(),
            disable_auto_decode: false,
        }
    }

    /// Defaults for long-lived streamed responses: same as
    /// [`api_defaults`](Self::api_defaults) with a 120s read timeout.
    pub fn streaming_defaults() -> Self {
        Self {
            read_timeout: Duration::from_secs(120),
            ..Self::api_defaults()
        }
    }

    /// Set TCP connect timeout.
    pub fn tcp_connect_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_connect_timeout = timeout;
        self
    }

    /// Set TLS handshake timeout.
    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.tls_handshake_timeout = timeout;
        self
    }

    /// Set write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn accept_encoding(mut self, accept_encoding: impl Into<String>) -> Self {
        self.accept_encoding = accept_encoding.into();
        self
    }

    pub fn disable_auto_decode(mut self, disable: bool) -> Self {
        self.disable_auto_decode = disable;
        self
    }
}

/// Retry-with-backoff configuration for [`Client::get_with_retry`](crate::Client::get_with_retry).
#[derive(Clone, Debug, PartialEq)]
pub struct RetryOptions {
    /// Total attempts including the first. Zero behaves like one.
    pub max_attempts: u32,
    /// Retry DNS/connect/TLS/read/write failures.
    pub retry_on_network_error: bool,
    /// Retry a final 5xx status.
    pub retry_on_5xx: bool,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_on_network_error: true,
            retry_on_5xx: true,
            initial_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryOptions {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn retry_on_network_error(mut self, retry: bool) -> Self {
        self.retry_on_network_error = retry;
        self
    }

    pub fn retry_on_5xx(mut self, retry: bool) -> Self {
        self.retry_on_5xx = retry;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `retry` (1-based):
    /// `min(initial_delay * backoff_factor^(retry - 1), max_delay)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}
