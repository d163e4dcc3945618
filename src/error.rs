//! Error types for the outbound crate.

use std::io;
use std::time::Duration;

use bytes::Bytes;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure bucket a caller can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// DNS, TCP connect, TLS handshake, write or read failure (timeouts included).
    Transport,
    /// The peer violated HTTP/1.1 framing or redirect rules.
    Protocol,
    /// A redirect was refused by the client's policy.
    Policy,
    /// The final response status was outside 200-299.
    HttpStatus,
    /// The body could not be content-decoded.
    Decode,
    /// The body was not valid JSON for a JSON-returning call.
    Serialization,
}

/// Errors that can occur during HTTP operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// DNS resolution failed or returned no addresses.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// TCP connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TCP connect (including DNS) did not finish in time.
    #[error("Connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// TLS handshake did not finish in time.
    #[error("TLS handshake timeout after {0:?}")]
    HandshakeTimeout(Duration),

    /// Request bytes could not be written in time.
    #[error("Write timeout after {0:?}")]
    WriteTimeout(Duration),

    /// No response bytes arrived in time.
    #[error("Read timeout after {0:?}")]
    ReadTimeout(Duration),

    /// HTTP protocol error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// The chunked transfer coding was malformed.
    #[error("Malformed chunked body")]
    MalformedChunk,

    /// A redirect response carried no Location header.
    #[error("HTTP {status} redirect without Location header")]
    MissingLocation { status: u16 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Caller supplied a header that cannot be sent.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The redirect policy refused the hop.
    #[error("Redirect from {from} to {to} denied by policy")]
    RedirectDenied { from: String, to: String },

    /// Redirect target is not HTTPS.
    #[error("Refusing redirect to non-HTTPS URL: {0}")]
    InsecureRedirect(String),

    /// Redirect limit exceeded.
    #[error("Too many redirects ({count} followed)")]
    RedirectLimit { count: u32 },

    /// Final response status outside 2xx.
    #[error("HTTP {status}")]
    HttpStatus { status: u16, body: Bytes },

    /// Content-Encoding we do not implement.
    #[error("Unsupported Content-Encoding: {0}")]
    UnsupportedEncoding(String),

    /// Decompression error.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Body is not valid UTF-8 for a text-returning call.
    #[error("Body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Which failure bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Dns(_)
            | Self::Connection(_)
            | Self::Tls(_)
            | Self::Io(_)
            | Self::ConnectTimeout(_)
            | Self::HandshakeTimeout(_)
            | Self::WriteTimeout(_)
            | Self::ReadTimeout(_) => ErrorKind::Transport,
            Self::HttpProtocol(_)
            | Self::MalformedChunk
            | Self::MissingLocation { .. }
            | Self::InvalidUrl(_)
            | Self::InvalidHeader(_) => ErrorKind::Protocol,
            Self::RedirectDenied { .. } | Self::InsecureRedirect(_) | Self::RedirectLimit { .. } => {
                ErrorKind::Policy
            }
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::UnsupportedEncoding(_) | Self::Decompression(_) => ErrorKind::Decode,
            Self::Json(_) | Self::Utf8(_) => ErrorKind::Serialization,
        }
    }

    /// True for DNS/connect/TLS/read/write failures, including timeouts.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Final HTTP status carried by an `HttpStatus` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Create an HTTP status error.
    pub fn http_status(status: u16, body: Bytes) -> Self {
        Self::HttpStatus { status, body }
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }
}
